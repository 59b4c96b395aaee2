//! Random graph models assembled from the prior hierarchy.

/// Degree-corrected stochastic block model
pub mod dcsbm;
/// Stochastic block model
pub mod sbm;

pub use dcsbm::DegreeCorrectedSbm;
pub use sbm::{SbmOptions, StochasticBlockModel};

use crate::error::Result;
use crate::graph::MultiGraph;
use crate::moves::{GraphMove, LabelMove};
use crate::nested::Shared;
use crate::prior::BlockPrior;
use rand::RngCore;

/// A sampleable graph together with the latent state of its priors.
///
/// The graph and every prior state agree at all times;
/// `check_self_consistency` verifies it after external injection.
pub trait RandomGraph {
    /// Current graph.
    fn graph(&self) -> &MultiGraph;

    /// Replace the graph and recompute every derived prior state.
    fn set_graph(&mut self, graph: MultiGraph) -> Result<()>;

    /// Replace the labels (compacted to `0..B`) and recompute the block
    /// statistics of the current graph.
    fn set_labels(&mut self, labels: &[usize]) -> Result<()>;

    /// Handle to the partition prior.
    fn block_prior(&self) -> &Shared<BlockPrior>;

    /// Draw every prior state, dependencies first.
    fn sample_priors(&mut self, rng: &mut dyn RngCore) -> Result<()>;

    /// Draw a graph conditioned on the current prior states.
    fn sample_graph(&mut self, rng: &mut dyn RngCore) -> Result<()>;

    /// Log-probability of the graph given the priors.
    fn log_likelihood(&self) -> f64;

    /// Log-joint of the prior hierarchy.
    fn log_prior(&self) -> f64;

    /// Change of the graph likelihood under a graph move.
    fn log_likelihood_ratio_from_graph_move(&self, mv: &GraphMove) -> Result<f64>;

    /// Change of the prior log-joint under a graph move.
    fn log_prior_ratio_from_graph_move(&self, mv: &GraphMove) -> Result<f64>;

    /// Change of the graph likelihood under a label move.
    fn log_likelihood_ratio_from_label_move(&self, mv: &LabelMove) -> Result<f64>;

    /// Change of the prior log-joint under a label move.
    fn log_prior_ratio_from_label_move(&self, mv: &LabelMove) -> Result<f64>;

    /// Apply a move to the graph and every prior, or fail without
    /// mutating anything.
    fn apply_graph_move(&mut self, mv: &GraphMove) -> Result<()>;

    /// Relabel one vertex across the whole hierarchy.
    fn apply_label_move(&mut self, mv: &LabelMove) -> Result<()>;

    /// Verify every cached statistic against the graph and labels.
    fn check_self_consistency(&self) -> Result<()>;

    /// Verify every parameter lies in its domain.
    fn check_safety(&self) -> Result<()>;

    /// Number of vertices.
    fn size(&self) -> usize {
        self.graph().size()
    }

    /// Copy of the current labels.
    fn labels(&self) -> Vec<usize> {
        self.block_prior().borrow().labels().to_vec()
    }

    /// Label of `v`.
    fn label_of(&self, v: usize) -> usize {
        self.block_prior().borrow().label_of(v)
    }

    /// Number of blocks.
    fn block_count(&self) -> usize {
        self.block_prior().borrow().block_count()
    }

    /// Copy of the block sizes.
    fn vertex_counts(&self) -> Vec<usize> {
        self.block_prior().borrow().vertex_counts().to_vec()
    }

    /// Draw the priors, then a graph given them.
    fn sample(&mut self, rng: &mut dyn RngCore) -> Result<()> {
        self.sample_priors(rng)?;
        self.sample_graph(rng)
    }

    /// Log-likelihood plus log-prior.
    fn log_joint(&self) -> f64 {
        self.log_likelihood() + self.log_prior()
    }

    /// Change of the log-joint under a graph move.
    fn log_joint_ratio_from_graph_move(&self, mv: &GraphMove) -> Result<f64> {
        let likelihood = self.log_likelihood_ratio_from_graph_move(mv)?;
        if likelihood == f64::NEG_INFINITY {
            return Ok(likelihood);
        }
        Ok(likelihood + self.log_prior_ratio_from_graph_move(mv)?)
    }

    /// Change of the log-joint under a label move.
    fn log_joint_ratio_from_label_move(&self, mv: &LabelMove) -> Result<f64> {
        if mv.is_trivial() {
            return Ok(0.0);
        }
        let likelihood = self.log_likelihood_ratio_from_label_move(mv)?;
        if likelihood == f64::NEG_INFINITY {
            return Ok(likelihood);
        }
        Ok(likelihood + self.log_prior_ratio_from_label_move(mv)?)
    }

    /// Whether `mv` fits the current graph.
    fn is_valid_graph_move(&self, mv: &GraphMove) -> bool {
        self.graph().check_graph_move(mv).is_ok()
    }
}
