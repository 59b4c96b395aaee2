use crate::dynamics::{check_parameter, Dynamics};
use crate::error::Result;

/// Susceptible (`0`) / infected (`1`) contagion.
///
/// A susceptible vertex escapes infection from each infected neighbor
/// independently with probability `1 - λ` and from outside with `1 - ε`;
/// an infected vertex recovers with probability `μ`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SisDynamics {
    infection: f64,
    recovery: f64,
    auto_infection: f64,
}

const NAMES: [&str; 3] = ["infection", "recovery", "auto_infection"];

impl SisDynamics {
    /// Fails unless every rate is a probability.
    pub fn new(infection: f64, recovery: f64, auto_infection: f64) -> Result<Self> {
        let mut out = SisDynamics {
            infection: 0.0,
            recovery: 0.0,
            auto_infection: 0.0,
        };
        out.set_parameter(0, infection)?;
        out.set_parameter(1, recovery)?;
        out.set_parameter(2, auto_infection)?;
        Ok(out)
    }

    /// Per-neighbor infection probability.
    pub fn infection(&self) -> f64 {
        self.infection
    }

    /// Recovery probability.
    pub fn recovery(&self) -> f64 {
        self.recovery
    }

    /// Spontaneous infection probability.
    pub fn auto_infection(&self) -> f64 {
        self.auto_infection
    }
}

impl Dynamics for SisDynamics {
    fn transition_prob(&self, prev: usize, next: usize, neighbor_counts: &[usize]) -> f64 {
        let p_change = if prev == 0 {
            let infected = neighbor_counts[1] as i32;
            1.0 - (1.0 - self.auto_infection) * (1.0 - self.infection).powi(infected)
        } else {
            self.recovery
        };
        if next == prev {
            1.0 - p_change
        } else {
            p_change
        }
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        &NAMES
    }

    fn parameters(&self) -> Vec<f64> {
        vec![self.infection, self.recovery, self.auto_infection]
    }

    fn in_support(&self, index: usize, value: f64) -> bool {
        index < NAMES.len() && (0.0..=1.0).contains(&value)
    }

    fn set_parameter(&mut self, index: usize, value: f64) -> Result<()> {
        check_parameter(self, index, value)?;
        match index {
            0 => self.infection = value,
            1 => self.recovery = value,
            _ => self.auto_infection = value,
        }
        Ok(())
    }
}
