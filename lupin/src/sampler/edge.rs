use crate::error::{LupinError, Result};
use crate::graph::{edge, Edge, MultiGraph};
use crate::moves::GraphMove;
use crate::sampler::weighted_set::{WeightedSet, REMOVAL_THRESHOLD};
use fnv::FnvHashSet;
use rand::RngCore;

/// Edges weighted by multiplicity.
#[derive(Debug, Clone, Default)]
pub struct EdgeSampler {
    set: WeightedSet<Edge>,
    blacklist: FnvHashSet<Edge>,
}

impl EdgeSampler {
    /// Empty sampler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a graph snapshot.
    pub fn set_up(&mut self, graph: &MultiGraph) {
        self.set.clear();
        for (e, m) in graph.edges() {
            if !self.blacklist.contains(&e) {
                self.set.set_weight(e, m as f64);
            }
        }
    }

    /// Rebuild from a graph snapshot, ignoring `blacklist` from now on.
    pub fn set_up_with_blacklist(&mut self, graph: &MultiGraph, blacklist: &[Edge]) {
        self.blacklist = blacklist.iter().map(|&(u, v)| edge(u, v)).collect();
        self.set_up(graph);
    }

    /// Draw an edge by multiplicity.
    pub fn sample(&self, rng: &mut dyn RngCore) -> Option<Edge> {
        self.set.sample(rng)
    }

    /// Sum of all multiplicities.
    pub fn total_weight(&self) -> f64 {
        self.set.total_weight()
    }

    /// Weight of `(u, v)`, zero if absent.
    pub fn edge_weight(&self, u: usize, v: usize) -> f64 {
        self.set.weight(&edge(u, v))
    }

    /// Whether `(u, v)` can be drawn.
    pub fn contains(&self, u: usize, v: usize) -> bool {
        self.set.contains(&edge(u, v))
    }

    /// Number of distinct edges available.
    pub fn len(&self) -> usize {
        self.set.len()
    }

    /// Whether no edge is available.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    fn is_blacklisted(&self, e: &Edge) -> bool {
        self.blacklist.contains(e)
    }

    /// Insert `e` with an explicit weight, replacing any previous weight.
    pub fn on_edge_insertion(&mut self, e: Edge, weight: f64) {
        let e = edge(e.0, e.1);
        if !self.is_blacklisted(&e) {
            self.set.set_weight(e, weight);
        }
    }

    /// Drop `e` regardless of its weight.
    pub fn on_edge_erasure(&mut self, e: Edge) {
        let e = edge(e.0, e.1);
        self.set.erase(&e);
    }

    /// One more copy of `e`.
    pub fn on_edge_addition(&mut self, e: Edge) {
        let e = edge(e.0, e.1);
        if !self.is_blacklisted(&e) {
            self.set.add_weight(e, 1.0);
        }
    }

    /// One less copy of `e`; the last copy evicts it.
    pub fn on_edge_removal(&mut self, e: Edge) -> Result<()> {
        let e = edge(e.0, e.1);
        if self.is_blacklisted(&e) {
            return Ok(());
        }
        self.set.remove_weight(e, 1.0).map_err(|_| {
            LupinError::consistency(
                "EdgeSampler",
                format!("edge ({}, {}) is not available for removal", e.0, e.1),
            )
        })
    }

    /// Fail if `mv` removes more copies of an edge than the sampler holds.
    pub fn check_graph_move(&self, mv: &GraphMove) -> Result<()> {
        for (e, delta) in mv.edge_diff() {
            if delta >= 0 || self.is_blacklisted(&e) {
                continue;
            }
            let available = self.set.weight(&e);
            if !self.set.contains(&e) || available + REMOVAL_THRESHOLD < (-delta) as f64 {
                return Err(LupinError::consistency(
                    "EdgeSampler",
                    format!(
                        "move removes {} copies of edge ({}, {}) but only {} are available",
                        -delta, e.0, e.1, available
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Track an accepted graph move; an invalid removal leaves the
    /// sampler untouched.
    pub fn apply_graph_move(&mut self, mv: &GraphMove) -> Result<()> {
        self.check_graph_move(mv)?;
        let folded = mv.folded();
        for &e in folded.removed_edges.iter() {
            self.on_edge_removal(e)?;
        }
        for &e in folded.added_edges.iter() {
            self.on_edge_addition(e);
        }
        Ok(())
    }
}
