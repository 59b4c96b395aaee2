//! Move descriptions exchanged between proposers, models and the driver.

use crate::graph::{edge, Edge};
use fnv::FnvHashMap;

/// Proposed graph edit: edges removed and edges added (multi-edges allowed).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphMove {
    /// Edges losing one copy each, repeats allowed
    pub removed_edges: Vec<Edge>,
    /// Edges gaining one copy each, repeats allowed
    pub added_edges: Vec<Edge>,
}

impl GraphMove {
    /// Build a move; vertex pairs are normalized.
    pub fn new(removed_edges: Vec<Edge>, added_edges: Vec<Edge>) -> Self {
        GraphMove {
            removed_edges: removed_edges.into_iter().map(|(u, v)| edge(u, v)).collect(),
            added_edges: added_edges.into_iter().map(|(u, v)| edge(u, v)).collect(),
        }
    }

    /// The move that changes nothing.
    pub fn empty() -> Self {
        GraphMove::default()
    }

    /// Whether the move lists no edge at all.
    pub fn is_empty(&self) -> bool {
        self.removed_edges.is_empty() && self.added_edges.is_empty()
    }

    /// The move that undoes this one.
    pub fn reversed(&self) -> Self {
        GraphMove {
            removed_edges: self.added_edges.clone(),
            added_edges: self.removed_edges.clone(),
        }
    }

    /// Net multiplicity change per edge; entries that cancel are dropped,
    /// so an edge both removed and added never counts twice.
    pub fn edge_diff(&self) -> FnvHashMap<Edge, isize> {
        let mut diff = FnvHashMap::default();
        for &(u, v) in self.removed_edges.iter() {
            *diff.entry(edge(u, v)).or_insert(0) -= 1;
        }
        for &(u, v) in self.added_edges.iter() {
            *diff.entry(edge(u, v)).or_insert(0) += 1;
        }
        diff.retain(|_, d| *d != 0);
        diff
    }

    /// Net degree change per vertex (self-loops count twice).
    pub fn degree_diff(&self) -> FnvHashMap<usize, isize> {
        let mut diff = FnvHashMap::default();
        for (&(u, v), &d) in self.edge_diff().iter() {
            *diff.entry(u).or_insert(0) += d;
            *diff.entry(v).or_insert(0) += d;
        }
        diff.retain(|_, d| *d != 0);
        diff
    }

    /// Net change of the total edge count.
    pub fn edge_count_diff(&self) -> isize {
        self.added_edges.len() as isize - self.removed_edges.len() as isize
    }

    /// True when every edit cancels out.
    pub fn is_trivial(&self) -> bool {
        self.edge_diff().is_empty()
    }

    /// Drop edits that cancel, keeping one entry per remaining copy.
    pub fn folded(&self) -> Self {
        let mut removed = vec![];
        let mut added = vec![];
        let mut diff: Vec<_> = self.edge_diff().into_iter().collect();
        diff.sort_unstable();
        for (e, d) in diff {
            let target = if d < 0 { &mut removed } else { &mut added };
            target.extend(std::iter::repeat_n(e, d.unsigned_abs()));
        }
        GraphMove {
            removed_edges: removed,
            added_edges: added,
        }
    }
}

/// Reassignment of one vertex's label.
///
/// `added_labels` is `+1` when the vertex opens a fresh block, `-1` when
/// the vertex was the last member of `prev_label` (which is then compacted
/// away, shifting every larger label down by one), and `0` otherwise.
///
/// A fresh block is inserted at position `next_label` in `0..=B`: labels
/// at or above that position shift up by one, so birth at `t` is the exact
/// inverse of vacating block `t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelMove {
    /// Vertex being relabeled
    pub vertex: usize,
    /// Current label of `vertex`
    pub prev_label: usize,
    /// Target label; the insertion slot for a birth
    pub next_label: usize,
    /// Change in block count: `1`, `0` or `-1`
    pub added_labels: i32,
    /// Level of the block hierarchy; always `0` for flat models
    pub level: usize,
}

impl LabelMove {
    /// Move `vertex` from `prev_label` to `next_label` at level `0`.
    pub fn new(vertex: usize, prev_label: usize, next_label: usize, added_labels: i32) -> Self {
        LabelMove {
            vertex,
            prev_label,
            next_label,
            added_labels,
            level: 0,
        }
    }

    /// Move `vertex` into a fresh block inserted at `position`.
    pub fn birth(vertex: usize, prev_label: usize, position: usize) -> Self {
        LabelMove::new(vertex, prev_label, position, 1)
    }

    /// Whether the move opens a block.
    pub fn is_birth(&self) -> bool {
        self.added_labels > 0
    }

    /// The same move with the fresh block appended at `block_count`
    /// instead of inserted. Log-probabilities do not depend on the order
    /// of blocks, so ratios are evaluated on this form.
    pub fn appended(&self, block_count: usize) -> Self {
        if self.is_birth() {
            LabelMove {
                next_label: block_count,
                ..*self
            }
        } else {
            *self
        }
    }

    /// Where label `label` ends up once a fresh block appended at
    /// `block_count` is rotated into `position`.
    pub fn inserted_label(label: usize, position: usize, block_count: usize) -> usize {
        if label == block_count {
            position
        } else if label >= position {
            label + 1
        } else {
            label
        }
    }

    /// A move that keeps the vertex where it is.
    pub fn stay(vertex: usize, label: usize) -> Self {
        LabelMove::new(vertex, label, label, 0)
    }

    /// Whether the vertex stays where it is.
    pub fn is_trivial(&self) -> bool {
        self.prev_label == self.next_label && self.added_labels == 0
    }
}

/// New value for one parameter of a dynamics model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamMove {
    /// Position in the parameter vector
    pub index: usize,
    /// Current value
    pub prev_value: f64,
    /// Proposed value
    pub next_value: f64,
}

impl ParamMove {
    /// Whether the parameter keeps its value.
    pub fn is_trivial(&self) -> bool {
        self.prev_value == self.next_value
    }
}

/// Any move the concrete samplers can propose.
#[derive(Debug, Clone, PartialEq)]
pub enum McmcMove {
    /// Edit of the edge multiset
    Graph(GraphMove),
    /// Relabeling of one vertex
    Label(LabelMove),
    /// Change of one dynamics parameter
    Param(ParamMove),
}
