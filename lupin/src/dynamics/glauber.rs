use crate::dynamics::{check_parameter, Dynamics};
use crate::error::Result;

/// Heat-bath Ising dynamics on spins `0 ↦ -1`, `1 ↦ +1`.
///
/// A vertex takes spin `+1` with probability `σ(2J(n₊ - n₋))`, independent
/// of its previous spin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlauberDynamics {
    coupling: f64,
}

impl GlauberDynamics {
    /// Fails on a non-finite coupling.
    pub fn new(coupling: f64) -> Result<Self> {
        let out = GlauberDynamics { coupling: 0.0 };
        check_parameter(&out, 0, coupling)?;
        Ok(GlauberDynamics { coupling })
    }

    /// Coupling strength `J`.
    pub fn coupling(&self) -> f64 {
        self.coupling
    }
}

impl Dynamics for GlauberDynamics {
    fn transition_prob(&self, _prev: usize, next: usize, neighbor_counts: &[usize]) -> f64 {
        let field = neighbor_counts[1] as f64 - neighbor_counts[0] as f64;
        let p_up = 1.0 / (1.0 + (-2.0 * self.coupling * field).exp());
        if next == 1 {
            p_up
        } else {
            1.0 - p_up
        }
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        &["coupling"]
    }

    fn parameters(&self) -> Vec<f64> {
        vec![self.coupling]
    }

    fn in_support(&self, index: usize, value: f64) -> bool {
        index == 0 && value.is_finite()
    }

    fn set_parameter(&mut self, index: usize, value: f64) -> Result<()> {
        check_parameter(self, index, value)?;
        self.coupling = value;
        Ok(())
    }
}
