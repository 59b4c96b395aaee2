//! Composable prior nodes with move-based incremental updates.
//!
//! Each node owns a piece of latent state and knows how a graph or label
//! move changes its own log-likelihood. Dependencies are shared handles;
//! every recursive call threads an [`EvalContext`] so a node reached
//! through several parents contributes once.

/// Partition of the vertices
pub mod block;
/// Edge and block counts
pub mod count;
/// Degree sequence
pub mod degree;
/// Edge counts between blocks
pub mod edge_matrix;

pub use block::{BlockPrior, BlockPriorKind};
pub use count::{
    BlockCountPrior, CountDistribution, DeltaCount, EdgeCountPrior, GeometricCount, PoissonCount,
    UniformCount, ZeroTruncatedPoissonCount,
};
pub use degree::{DegreePrior, DegreePriorKind};
pub use edge_matrix::{EdgeMatrixPrior, EdgeMatrixPriorKind};

use crate::error::Result;
use crate::graph::MultiGraph;
use crate::moves::{GraphMove, LabelMove};
use crate::nested::{EvalContext, NestedRandomVariable};
use rand::RngCore;

/// A node of the prior hierarchy.
///
/// Implementors provide their own likelihood term and move deltas, and
/// forward to their dependencies in the `*_with` methods. The provided
/// methods wrap both in the memoized traversal; the `*_with` variants are
/// for recursion, the others open a fresh context.
///
/// Ratios never mutate anything. For every valid move,
/// `log_joint_ratio_from_*_move` equals `log_joint()` after minus before
/// applying it.
pub trait Prior: NestedRandomVariable {
    /// Draw this node's state conditioned on its dependencies.
    fn sample_state(&mut self, rng: &mut dyn RngCore) -> Result<()>;

    /// Draw the dependencies.
    fn sample_priors_with(&mut self, rng: &mut dyn RngCore, ctx: &mut EvalContext) -> Result<()>;

    /// Log-probability of this node's state given its dependencies.
    fn log_likelihood(&self) -> f64;

    /// Sum of the dependencies' log-joints.
    fn log_prior_with(&self, ctx: &mut EvalContext) -> f64;

    /// Change of [`Prior::log_likelihood`] under a graph move.
    fn log_likelihood_ratio_from_graph_move(&self, mv: &GraphMove) -> Result<f64>;

    /// Change of the dependencies' log-joint under a graph move.
    fn log_prior_ratio_from_graph_move_with(
        &self,
        mv: &GraphMove,
        ctx: &mut EvalContext,
    ) -> Result<f64>;

    /// Change of [`Prior::log_likelihood`] under a label move.
    fn log_likelihood_ratio_from_label_move(
        &self,
        mv: &LabelMove,
        graph: &MultiGraph,
    ) -> Result<f64>;

    /// Change of the dependencies' log-joint under a label move.
    fn log_prior_ratio_from_label_move_with(
        &self,
        mv: &LabelMove,
        graph: &MultiGraph,
        ctx: &mut EvalContext,
    ) -> Result<f64>;

    /// Update own state for a graph move.
    fn apply_graph_move_to_state(&mut self, mv: &GraphMove) -> Result<()>;

    /// Forward a graph move to the dependencies.
    fn apply_graph_move_to_priors_with(&mut self, mv: &GraphMove, ctx: &mut EvalContext)
        -> Result<()>;

    /// Update own state; runs before the dependencies are updated, so any
    /// dependency state read here is still the pre-move one.
    fn apply_label_move_to_state(
        &mut self,
        mv: &LabelMove,
        graph: &MultiGraph,
        ctx: &EvalContext,
    ) -> Result<()>;

    /// Forward a label move to the dependencies.
    fn apply_label_move_to_priors_with(
        &mut self,
        mv: &LabelMove,
        graph: &MultiGraph,
        ctx: &mut EvalContext,
    ) -> Result<()>;

    /// Verify that the state agrees with the dependencies it summarizes.
    fn check_self_consistency(&self) -> Result<()>;

    /// Verify that every parameter lies in its domain.
    fn check_safety(&self) -> Result<()>;

    /// [`Prior::sample`] within an open traversal.
    fn sample_with(&mut self, rng: &mut dyn RngCore, ctx: &mut EvalContext) -> Result<()> {
        let id = self.node_id();
        ctx.once(id, |ctx| {
            self.sample_priors_with(rng, ctx)?;
            self.sample_state(rng)
        })
        .unwrap_or(Ok(()))
    }

    /// Draw the whole sub-hierarchy, dependencies first.
    fn sample(&mut self, rng: &mut dyn RngCore) -> Result<()> {
        self.sample_with(rng, &mut EvalContext::new())
    }

    /// [`Prior::log_joint`] within an open traversal.
    fn log_joint_with(&self, ctx: &mut EvalContext) -> f64 {
        ctx.once(self.node_id(), |ctx| {
            self.log_likelihood() + self.log_prior_with(ctx)
        })
        .unwrap_or(0.0)
    }

    /// Log-probability of the whole sub-hierarchy.
    fn log_joint(&self) -> f64 {
        self.log_joint_with(&mut EvalContext::new())
    }

    /// Log-joint of the dependencies.
    fn log_prior(&self) -> f64 {
        self.log_prior_with(&mut EvalContext::new())
    }

    /// [`Prior::log_joint_ratio_from_graph_move`] within an open traversal.
    fn log_joint_ratio_from_graph_move_with(
        &self,
        mv: &GraphMove,
        ctx: &mut EvalContext,
    ) -> Result<f64> {
        ctx.once(self.node_id(), |ctx| {
            Ok(self.log_likelihood_ratio_from_graph_move(mv)?
                + self.log_prior_ratio_from_graph_move_with(mv, ctx)?)
        })
        .unwrap_or(Ok(0.0))
    }

    /// Change of [`Prior::log_joint`] if `mv` were applied.
    fn log_joint_ratio_from_graph_move(&self, mv: &GraphMove) -> Result<f64> {
        self.log_joint_ratio_from_graph_move_with(mv, &mut EvalContext::new())
    }

    /// [`Prior::log_joint_ratio_from_label_move`] within an open traversal.
    fn log_joint_ratio_from_label_move_with(
        &self,
        mv: &LabelMove,
        graph: &MultiGraph,
        ctx: &mut EvalContext,
    ) -> Result<f64> {
        if mv.is_trivial() {
            return Ok(0.0);
        }
        ctx.once(self.node_id(), |ctx| {
            Ok(self.log_likelihood_ratio_from_label_move(mv, graph)?
                + self.log_prior_ratio_from_label_move_with(mv, graph, ctx)?)
        })
        .unwrap_or(Ok(0.0))
    }

    /// Change of [`Prior::log_joint`] if `mv` were applied.
    fn log_joint_ratio_from_label_move(&self, mv: &LabelMove, graph: &MultiGraph) -> Result<f64> {
        self.log_joint_ratio_from_label_move_with(mv, graph, &mut EvalContext::new())
    }

    /// [`Prior::apply_graph_move`] within an open traversal.
    fn apply_graph_move_with(&mut self, mv: &GraphMove, ctx: &mut EvalContext) -> Result<()> {
        let id = self.node_id();
        ctx.once(id, |ctx| {
            self.apply_graph_move_to_state(mv)?;
            self.apply_graph_move_to_priors_with(mv, ctx)
        })
        .unwrap_or(Ok(()))
    }

    /// Apply a graph move to the whole sub-hierarchy.
    fn apply_graph_move(&mut self, mv: &GraphMove) -> Result<()> {
        self.apply_graph_move_with(mv, &mut EvalContext::new())
    }

    /// [`Prior::apply_label_move`] within an open traversal.
    fn apply_label_move_with(
        &mut self,
        mv: &LabelMove,
        graph: &MultiGraph,
        ctx: &mut EvalContext,
    ) -> Result<()> {
        if mv.is_trivial() {
            return Ok(());
        }
        let id = self.node_id();
        ctx.once(id, |ctx| {
            self.apply_label_move_to_state(mv, graph, ctx)?;
            self.apply_label_move_to_priors_with(mv, graph, ctx)
        })
        .unwrap_or(Ok(()))
    }

    /// Apply a label move to the whole sub-hierarchy.
    fn apply_label_move(&mut self, mv: &LabelMove, graph: &MultiGraph) -> Result<()> {
        self.apply_label_move_with(mv, graph, &mut EvalContext::new())
    }
}
