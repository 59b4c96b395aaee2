use crate::error::{LupinError, Result};
use crate::graph::{Edge, MultiGraph};
use crate::moves::GraphMove;
use crate::sampler::edge::EdgeSampler;
use fnv::{FnvHashMap, FnvHashSet};
use rand::{Rng, RngCore};

/// Weighted draws over vertices, kept in sync with a graph.
pub trait VertexSampler {
    /// Rebuild from a graph snapshot.
    fn set_up(&mut self, graph: &MultiGraph);

    /// Draw a vertex; `None` when nothing is available.
    fn sample(&self, rng: &mut dyn RngCore) -> Option<usize>;

    /// Whether `v` can be drawn.
    fn contains(&self, v: usize) -> bool;

    /// Current sampling weight of `v`, zero if unavailable.
    fn vertex_weight(&self, v: usize) -> f64;

    /// Sum of all vertex weights.
    fn total_weight(&self) -> f64;

    /// Weight `v` would have after its degree changed by `degree_delta`.
    fn vertex_weight_after(&self, v: usize, degree_delta: isize) -> f64;

    /// Total weight after the edge count changed by `edge_delta`.
    fn total_weight_after(&self, edge_delta: isize) -> f64;

    /// Track one more copy of `e`.
    fn on_edge_addition(&mut self, e: Edge);

    /// Track one less copy of `e`.
    fn on_edge_removal(&mut self, e: Edge) -> Result<()>;

    /// Fail if `mv` cannot be tracked, without mutating.
    fn check_graph_move(&self, _mv: &GraphMove) -> Result<()> {
        Ok(())
    }

    /// Track an accepted graph move.
    fn apply_graph_move(&mut self, mv: &GraphMove) -> Result<()> {
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

    /// `log P(v)` under the current weights.
    fn log_prob(&self, v: usize) -> f64 {
        (self.vertex_weight(v) / self.total_weight()).ln()
    }
}

/// Every available vertex has weight one.
#[derive(Debug, Clone, Default)]
pub struct VertexUniformSampler {
    vertices: Vec<usize>,
    positions: FnvHashMap<usize, usize>,
    blacklist: FnvHashSet<usize>,
}

impl VertexUniformSampler {
    /// Empty sampler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a graph, never drawing the vertices in `blacklist`.
    pub fn set_up_with_blacklist(&mut self, graph: &MultiGraph, blacklist: &[usize]) {
        self.blacklist = blacklist.iter().copied().collect();
        self.set_up(graph);
    }

    /// Number of available vertices.
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    /// Whether no vertex is available.
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Make `v` available unless blacklisted.
    pub fn on_vertex_insertion(&mut self, v: usize) {
        if self.blacklist.contains(&v) || self.positions.contains_key(&v) {
            return;
        }
        self.positions.insert(v, self.vertices.len());
        self.vertices.push(v);
    }

    /// Stop drawing `v`.
    pub fn on_vertex_erasure(&mut self, v: usize) {
        if let Some(pos) = self.positions.remove(&v) {
            self.vertices.swap_remove(pos);
            if let Some(&moved) = self.vertices.get(pos) {
                self.positions.insert(moved, pos);
            }
        }
    }
}

impl VertexSampler for VertexUniformSampler {
    fn set_up(&mut self, graph: &MultiGraph) {
        self.vertices.clear();
        self.positions.clear();
        for v in 0..graph.size() {
            self.on_vertex_insertion(v);
        }
    }

    fn sample(&self, rng: &mut dyn RngCore) -> Option<usize> {
        if self.vertices.is_empty() {
            return None;
        }
        Some(self.vertices[rng.random_range(0..self.vertices.len())])
    }

    fn contains(&self, v: usize) -> bool {
        self.positions.contains_key(&v)
    }

    fn vertex_weight(&self, v: usize) -> f64 {
        if self.contains(v) {
            1.0
        } else {
            0.0
        }
    }

    fn total_weight(&self) -> f64 {
        self.vertices.len() as f64
    }

    fn vertex_weight_after(&self, v: usize, _degree_delta: isize) -> f64 {
        self.vertex_weight(v)
    }

    fn total_weight_after(&self, _edge_delta: isize) -> f64 {
        self.total_weight()
    }

    fn on_edge_addition(&mut self, _e: Edge) {}

    fn on_edge_removal(&mut self, _e: Edge) -> Result<()> {
        Ok(())
    }
}

/// Draws `v` with probability proportional to `degree(v) + shift`.
///
/// With probability `shift·N / (shift·N + 2E)` a vertex is drawn
/// uniformly; otherwise an edge is drawn by multiplicity and one of its
/// endpoints is kept by a fair coin.
#[derive(Debug, Clone)]
pub struct VertexDegreeSampler {
    shift: f64,
    uniform: VertexUniformSampler,
    edges: EdgeSampler,
    degrees: Vec<usize>,
}

impl VertexDegreeSampler {
    /// Fails on a negative or non-finite shift.
    pub fn new(shift: f64) -> Result<Self> {
        if !(shift >= 0.0 && shift.is_finite()) {
            return Err(LupinError::InvalidParameter(format!(
                "degree sampler shift must be finite and non-negative, got {}",
                shift
            )));
        }
        Ok(VertexDegreeSampler {
            shift,
            uniform: VertexUniformSampler::new(),
            edges: EdgeSampler::new(),
            degrees: vec![],
        })
    }

    /// Weight added to every degree.
    pub fn shift(&self) -> f64 {
        self.shift
    }

    fn uniform_weight(&self) -> f64 {
        self.shift * self.uniform.len() as f64
    }

    fn degree(&self, v: usize) -> usize {
        self.degrees.get(v).copied().unwrap_or(0)
    }
}

impl VertexSampler for VertexDegreeSampler {
    fn set_up(&mut self, graph: &MultiGraph) {
        self.uniform.set_up(graph);
        self.edges.set_up(graph);
        self.degrees = graph.degrees().to_vec();
    }

    fn sample(&self, rng: &mut dyn RngCore) -> Option<usize> {
        let uniform_weight = self.uniform_weight();
        let total = uniform_weight + 2.0 * self.edges.total_weight();
        if total <= 0.0 {
            return None;
        }
        if rng.random::<f64>() * total < uniform_weight {
            self.uniform.sample(rng)
        } else {
            let (u, v) = self.edges.sample(rng)?;
            Some(if rng.random::<bool>() { u } else { v })
        }
    }

    fn contains(&self, v: usize) -> bool {
        self.uniform.contains(v)
    }

    fn vertex_weight(&self, v: usize) -> f64 {
        if !self.contains(v) {
            return 0.0;
        }
        self.degree(v) as f64 + self.shift
    }

    fn total_weight(&self) -> f64 {
        self.uniform_weight() + 2.0 * self.edges.total_weight()
    }

    fn vertex_weight_after(&self, v: usize, degree_delta: isize) -> f64 {
        if !self.contains(v) {
            return 0.0;
        }
        (self.degree(v) as isize + degree_delta) as f64 + self.shift
    }

    fn total_weight_after(&self, edge_delta: isize) -> f64 {
        self.total_weight() + 2.0 * edge_delta as f64
    }

    fn on_edge_addition(&mut self, e: Edge) {
        let (u, v) = e;
        let needed = u.max(v) + 1;
        if self.degrees.len() < needed {
            self.degrees.resize(needed, 0);
        }
        self.degrees[u] += 1;
        self.degrees[v] += 1;
        self.edges.on_edge_addition(e);
    }

    fn check_graph_move(&self, mv: &GraphMove) -> Result<()> {
        self.edges.check_graph_move(mv)
    }

    fn on_edge_removal(&mut self, e: Edge) -> Result<()> {
        let (u, v) = e;
        self.edges.on_edge_removal(e)?;
        self.degrees[u] -= 1;
        self.degrees[v] -= 1;
        Ok(())
    }
}
