//! Move proposers and their Hastings corrections.
//!
//! `log_proposal_prob_ratio` is always evaluated against the state the
//! move was proposed from, before it is applied, and returns
//! `log q(old | new) - log q(new | old)`.

/// Degree-preserving double edge swaps
pub mod double_swap;
/// Hinge flips of one edge endpoint
pub mod hinge_flip;
/// Vertex relabeling with block birth and death
pub mod label;
/// Single edge additions and removals
pub mod single_edge;

pub use double_swap::DoubleEdgeSwapProposer;
pub use hinge_flip::{HingeFlipDegreeProposer, HingeFlipProposer, HingeFlipUniformProposer};
pub use label::{LabelMoveProposer, UniformLabelProposer};
pub use single_edge::{SingleEdgeDegreeProposer, SingleEdgeProposer, SingleEdgeUniformProposer};

use crate::error::Result;
use crate::graph::MultiGraph;
use crate::moves::GraphMove;
use rand::RngCore;

/// Bound on redraws of an unusable raw candidate.
pub const MAX_ITERATIONS: usize = 1000;

/// Proposes edits of a graph and scores their reverse.
pub trait GraphMoveProposer {
    /// Rebuild the internal samplers from a graph snapshot.
    fn set_up(&mut self, graph: &MultiGraph);

    /// Draw a move from the current graph.
    fn propose_move(&self, graph: &MultiGraph, rng: &mut dyn RngCore) -> Result<GraphMove>;

    /// `log q(old | new) - log q(new | old)` for `mv` proposed from `graph`.
    fn log_proposal_prob_ratio(&self, mv: &GraphMove, graph: &MultiGraph) -> f64;

    /// Keep the samplers in step with an accepted move.
    fn apply_graph_move(&mut self, mv: &GraphMove) -> Result<()>;
}

/// Whether an edit of `graph` stays within the allowed structures.
pub(crate) fn respects_constraints(
    mv: &GraphMove,
    graph: &MultiGraph,
    allow_self_loops: bool,
    allow_multiedges: bool,
) -> bool {
    mv.edge_diff().iter().all(|(&(u, v), &d)| {
        if d <= 0 {
            return true;
        }
        let next = graph.edge_multiplicity(u, v) + d as usize;
        (allow_self_loops || u != v) && (allow_multiedges || next <= 1)
    })
}
