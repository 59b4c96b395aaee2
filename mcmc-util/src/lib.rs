//! Generic Metropolis-Hastings machinery.
//!
//! A target exposes proposal, log joint ratio, Hastings term and move
//! application; the driver strings those into steps and sweeps and calls
//! user callbacks around them.

#![deny(missing_docs)]

/// Target and callback interfaces
pub mod traits;

/// Step/sweep driver and counters
pub mod metropolis;

/// Per-sweep sample collection
pub mod chain;

pub use chain::{ChainCollector, McmcChain};
pub use metropolis::{McmcCounters, MetropolisHastings};
pub use traits::{McmcCallback, MetropolisHastingsTarget};
