//! Undirected multigraph with self-loops.
//!
//! Vertices are `0..size`. Each adjacency row maps a neighbor to the edge
//! multiplicity; a self-loop `(v, v)` is stored once in row `v` and counts
//! twice toward the degree of `v`.

use crate::error::{LupinError, Result};
use crate::moves::GraphMove;
use fnv::FnvHashMap;

/// Unordered vertex pair, always stored with `.0 <= .1`.
pub type Edge = (usize, usize);

/// Normalize a vertex pair into an [`Edge`].
#[inline]
pub fn edge(u: usize, v: usize) -> Edge {
    if u <= v {
        (u, v)
    } else {
        (v, u)
    }
}

/// Undirected multigraph with cached degrees and edge total.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiGraph {
    adjacency: Vec<FnvHashMap<usize, usize>>,
    degrees: Vec<usize>,
    total_edges: usize,
}

impl MultiGraph {
    /// Empty graph on `size` vertices.
    pub fn new(size: usize) -> Self {
        MultiGraph {
            adjacency: vec![FnvHashMap::default(); size],
            degrees: vec![0; size],
            total_edges: 0,
        }
    }

    /// Build a graph from an edge list (repeated pairs become multi-edges).
    pub fn from_edges(size: usize, edges: &[Edge]) -> Result<Self> {
        let mut graph = MultiGraph::new(size);
        for &(u, v) in edges {
            graph.add_multiedge(u, v, 1)?;
        }
        Ok(graph)
    }

    /// Number of vertices.
    pub fn size(&self) -> usize {
        self.adjacency.len()
    }

    /// Number of edges, counting multiplicity.
    pub fn total_edge_number(&self) -> usize {
        self.total_edges
    }

    /// Degree of `v`; a self-loop adds two.
    pub fn degree(&self, v: usize) -> usize {
        self.degrees[v]
    }

    /// Degree of every vertex.
    pub fn degrees(&self) -> &[usize] {
        &self.degrees
    }

    /// Copies of `(u, v)`, zero if out of range.
    pub fn edge_multiplicity(&self, u: usize, v: usize) -> usize {
        self.adjacency
            .get(u)
            .and_then(|row| row.get(&v))
            .copied()
            .unwrap_or(0)
    }

    /// Whether at least one copy of `(u, v)` exists.
    pub fn has_edge(&self, u: usize, v: usize) -> bool {
        self.edge_multiplicity(u, v) > 0
    }

    /// `(neighbor, multiplicity)` pairs of `v`, including `v` itself for self-loops.
    pub fn neighbors(&self, v: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.adjacency[v].iter().map(|(&u, &m)| (u, m))
    }

    /// Every distinct edge once, as `((u, v), multiplicity)` with `u <= v`.
    pub fn edges(&self) -> impl Iterator<Item = (Edge, usize)> + '_ {
        self.adjacency.iter().enumerate().flat_map(|(u, row)| {
            row.iter()
                .filter(move |(&v, _)| u <= v)
                .map(move |(&v, &m)| ((u, v), m))
        })
    }

    fn check_vertex(&self, v: usize) -> Result<()> {
        if v >= self.size() {
            return Err(LupinError::consistency(
                "MultiGraph",
                format!("vertex {} out of range (size {})", v, self.size()),
            ));
        }
        Ok(())
    }

    /// Add `multiplicity` copies of `(u, v)`.
    pub fn add_multiedge(&mut self, u: usize, v: usize, multiplicity: usize) -> Result<()> {
        self.check_vertex(u)?;
        self.check_vertex(v)?;
        if multiplicity == 0 {
            return Ok(());
        }
        *self.adjacency[u].entry(v).or_insert(0) += multiplicity;
        if u != v {
            *self.adjacency[v].entry(u).or_insert(0) += multiplicity;
        }
        self.degrees[u] += multiplicity;
        self.degrees[v] += multiplicity;
        self.total_edges += multiplicity;
        Ok(())
    }

    /// Remove `multiplicity` copies of `(u, v)`; fails without mutating if
    /// fewer copies exist.
    pub fn remove_multiedge(&mut self, u: usize, v: usize, multiplicity: usize) -> Result<()> {
        self.check_vertex(u)?;
        self.check_vertex(v)?;
        let existing = self.edge_multiplicity(u, v);
        if existing < multiplicity {
            return Err(LupinError::consistency(
                "MultiGraph",
                format!(
                    "cannot remove {} copies of edge ({}, {}) with multiplicity {}",
                    multiplicity, u, v, existing
                ),
            ));
        }
        if multiplicity == 0 {
            return Ok(());
        }
        decrement(&mut self.adjacency[u], v, multiplicity);
        if u != v {
            decrement(&mut self.adjacency[v], u, multiplicity);
        }
        self.degrees[u] -= multiplicity;
        self.degrees[v] -= multiplicity;
        self.total_edges -= multiplicity;
        Ok(())
    }

    /// Validate a move against the current multiplicities without mutating.
    pub fn check_graph_move(&self, mv: &GraphMove) -> Result<()> {
        for (&(u, v), &delta) in mv.edge_diff().iter() {
            self.check_vertex(u)?;
            self.check_vertex(v)?;
            if delta < 0 && (self.edge_multiplicity(u, v) as isize) < -delta {
                return Err(LupinError::consistency(
                    "MultiGraph",
                    format!(
                        "move removes {} copies of edge ({}, {}) but only {} exist",
                        -delta,
                        u,
                        v,
                        self.edge_multiplicity(u, v)
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Apply a move atomically: either every edit lands or none does.
    pub fn apply_graph_move(&mut self, mv: &GraphMove) -> Result<()> {
        self.check_graph_move(mv)?;
        for (&(u, v), &delta) in mv.edge_diff().iter() {
            if delta > 0 {
                self.add_multiedge(u, v, delta as usize)?;
            } else if delta < 0 {
                self.remove_multiedge(u, v, (-delta) as usize)?;
            }
        }
        Ok(())
    }

    /// Number of self-loops at `v`.
    pub fn self_loops(&self, v: usize) -> usize {
        self.edge_multiplicity(v, v)
    }

    /// Parse a whitespace-separated edge list, one `u v` pair per line.
    /// Lines starting with `#` are skipped.
    pub fn parse_edge_list(text: &str, size: Option<usize>) -> Result<Self> {
        let mut pairs = vec![];
        let mut max_vertex = 0;
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut words = line.split_whitespace();
            let mut next_vertex = || -> Result<usize> {
                words
                    .next()
                    .and_then(|w| w.parse::<usize>().ok())
                    .ok_or_else(|| {
                        LupinError::InvalidParameter(format!(
                            "line {}: expected two vertex indices",
                            lineno + 1
                        ))
                    })
            };
            let u = next_vertex()?;
            let v = next_vertex()?;
            max_vertex = max_vertex.max(u).max(v);
            pairs.push(edge(u, v));
        }
        let size = size.unwrap_or(if pairs.is_empty() { 0 } else { max_vertex + 1 });
        MultiGraph::from_edges(size, &pairs)
    }
}

fn decrement(row: &mut FnvHashMap<usize, usize>, key: usize, by: usize) {
    if let Some(m) = row.get_mut(&key) {
        *m -= by;
        if *m == 0 {
            row.remove(&key);
        }
    }
}
