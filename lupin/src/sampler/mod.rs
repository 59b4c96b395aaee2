//! Weighted structural samplers over vertices and edges.

/// Edges weighted by multiplicity
pub mod edge;
/// Uniform and degree-biased vertex samplers
pub mod vertex;
/// Generic weighted multiset
pub mod weighted_set;

pub use edge::EdgeSampler;
pub use vertex::{VertexDegreeSampler, VertexSampler, VertexUniformSampler};
pub use weighted_set::WeightedSet;
