//! Concrete Metropolis-Hastings targets over random graphs and dynamics.

/// Sweep callbacks
pub mod callbacks;
/// Joint inference of a graph and dynamics parameters
pub mod dynamics_mcmc;
/// Inference of a graph and its partition
pub mod graph_mcmc;

pub use callbacks::{ConsistencyCheck, SweepLogger};
pub use dynamics_mcmc::{DynamicsMcmc, DynamicsMcmcOptions};
pub use graph_mcmc::{GraphMcmc, GraphMcmcOptions};

use crate::error::{LupinError, Result};
use crate::moves::McmcMove;
use crate::proposer::{
    DoubleEdgeSwapProposer, GraphMoveProposer, HingeFlipDegreeProposer, HingeFlipUniformProposer,
    SingleEdgeDegreeProposer, SingleEdgeUniformProposer,
};
use mcmc_util::MetropolisHastingsTarget;
use serde::{Deserialize, Serialize};

/// A target the built-in callbacks can inspect.
pub trait InferenceTarget: MetropolisHastingsTarget<Move = McmcMove, Error = LupinError> {
    /// Log-joint of the current state.
    fn log_joint(&self) -> f64;

    /// Current block labels.
    fn labels(&self) -> Vec<usize>;

    /// Verify the cached statistics against the state.
    fn check_self_consistency(&self) -> Result<()>;

    /// Verify every parameter lies in its domain.
    fn check_safety(&self) -> Result<()>;
}

/// Which graph proposer a chain uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GraphProposerKind {
    /// Add or remove one edge, uniform endpoints
    SingleEdgeUniform,
    /// Add or remove one edge, degree-biased endpoints
    SingleEdgeDegree,
    /// Move one endpoint to a uniform vertex
    HingeFlipUniform,
    /// Move one endpoint to a degree-biased vertex
    HingeFlipDegree,
    /// Swap the endpoints of two edges
    DoubleEdgeSwap,
}

/// Box the requested graph proposer.
pub fn build_graph_proposer(
    kind: GraphProposerKind,
    degree_shift: f64,
    allow_self_loops: bool,
    allow_multiedges: bool,
) -> Result<Box<dyn GraphMoveProposer>> {
    let (loops, multi) = (allow_self_loops, allow_multiedges);
    Ok(match kind {
        GraphProposerKind::SingleEdgeUniform => {
            Box::new(SingleEdgeUniformProposer::uniform(loops, multi))
        }
        GraphProposerKind::SingleEdgeDegree => {
            Box::new(SingleEdgeDegreeProposer::degree(degree_shift, loops, multi)?)
        }
        GraphProposerKind::HingeFlipUniform => {
            Box::new(HingeFlipUniformProposer::uniform(loops, multi))
        }
        GraphProposerKind::HingeFlipDegree => {
            Box::new(HingeFlipDegreeProposer::degree(degree_shift, loops, multi)?)
        }
        GraphProposerKind::DoubleEdgeSwap => Box::new(DoubleEdgeSwapProposer::new(loops, multi)),
    })
}

pub(crate) fn check_probability(name: &str, p: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&p) {
        return Err(LupinError::InvalidParameter(format!(
            "{} must lie in [0, 1], got {}",
            name, p
        )));
    }
    Ok(())
}
