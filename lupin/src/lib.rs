//! Bayesian inference of random graph models and network dynamics.
//!
//! A random graph model is a stack of prior nodes (edge count, block
//! count, block labels, edge matrix, degrees) topped by a graph
//! likelihood. Markov-chain Monte Carlo explores graphs, partitions and
//! dynamics parameters one small move at a time: every node reports how a
//! move changes its log-probability without recomputing anything global,
//! and shared nodes are visited once per evaluation.
//!
//! # Models
//!
//! Stochastic block model (uniform simple or multigraph likelihood, with
//! Erdős–Rényi as the one-block case) and the degree-corrected stochastic
//! block model (with the configuration model as the one-block case).
//!
//! # References
//!
//! Peixoto (2017). "Nonparametric Bayesian inference of the
//! microcanonical stochastic block model." Phys. Rev. E 95, 012317.

#![deny(missing_docs)]

/// Error types
pub mod error;

/// Log-combinatorics and combinatorial samplers
pub mod util;

/// Undirected multigraph with self-loops
pub mod graph;

/// Graph, label and parameter moves
pub mod moves;

/// Memoized traversal of shared prior nodes
pub mod nested;

/// Weighted vertex and edge samplers
pub mod sampler;

/// Prior hierarchy
pub mod prior;

/// Stochastic block models built on the priors
pub mod random_graph;

/// Move proposers with Hastings corrections
pub mod proposer;

/// Binary-state dynamics and trajectory likelihoods
pub mod dynamics;

/// Metropolis-Hastings targets and callbacks
pub mod mcmc;

#[cfg(test)]
mod test;

pub use error::{LupinError, Result};
pub use graph::{Edge, MultiGraph};
pub use moves::{GraphMove, LabelMove, McmcMove, ParamMove};
pub use random_graph::{DegreeCorrectedSbm, RandomGraph, SbmOptions, StochasticBlockModel};
