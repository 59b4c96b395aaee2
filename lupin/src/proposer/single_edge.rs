use crate::error::{LupinError, Result};
use crate::graph::{edge, MultiGraph};
use crate::moves::GraphMove;
use crate::proposer::{GraphMoveProposer, MAX_ITERATIONS};
use crate::sampler::{VertexDegreeSampler, VertexSampler, VertexUniformSampler};
use rand::{Rng, RngCore};
use std::f64::consts::LN_2;

/// Toggles one edge between two independently drawn vertices.
///
/// A missing edge is always added; an existing one is added to or removed
/// by a fair coin (removed outright without parallel edges). Without self
/// loops the second vertex is redrawn until it differs from the first.
#[derive(Debug, Clone)]
pub struct SingleEdgeProposer<S: VertexSampler> {
    vertex_sampler: S,
    allow_self_loops: bool,
    allow_multiedges: bool,
}

/// Single-edge proposer with uniform endpoints.
pub type SingleEdgeUniformProposer = SingleEdgeProposer<VertexUniformSampler>;
/// Single-edge proposer with degree-biased endpoints.
pub type SingleEdgeDegreeProposer = SingleEdgeProposer<VertexDegreeSampler>;

impl SingleEdgeUniformProposer {
    /// Endpoints drawn uniformly.
    pub fn uniform(allow_self_loops: bool, allow_multiedges: bool) -> Self {
        SingleEdgeProposer::new(VertexUniformSampler::new(), allow_self_loops, allow_multiedges)
    }
}

impl SingleEdgeDegreeProposer {
    /// Endpoints drawn with weight `degree + shift`.
    pub fn degree(shift: f64, allow_self_loops: bool, allow_multiedges: bool) -> Result<Self> {
        Ok(SingleEdgeProposer::new(
            VertexDegreeSampler::new(shift)?,
            allow_self_loops,
            allow_multiedges,
        ))
    }
}

impl<S: VertexSampler> SingleEdgeProposer<S> {
    /// Wrap an arbitrary vertex sampler.
    pub fn new(vertex_sampler: S, allow_self_loops: bool, allow_multiedges: bool) -> Self {
        SingleEdgeProposer {
            vertex_sampler,
            allow_self_loops,
            allow_multiedges,
        }
    }

    /// `log P(draw the pair {u, v})` for the given weights.
    fn log_pair_prob(&self, u: usize, v: usize, w_u: f64, w_v: f64, total: f64) -> f64 {
        if self.allow_self_loops {
            let order = if u == v { 1.0 } else { 2.0 };
            (order * w_u * w_v / (total * total)).ln()
        } else {
            (w_u * w_v / total * (1.0 / (total - w_u) + 1.0 / (total - w_v))).ln()
        }
    }

    /// `log P(choose add or remove)` once the pair is drawn.
    fn log_toggle_prob(&self, adding: bool, multiplicity: usize) -> f64 {
        let coin = self.allow_multiedges && multiplicity > 0;
        let forced = if adding {
            multiplicity == 0 || !self.allow_multiedges
        } else {
            !self.allow_multiedges
        };
        if coin && !forced {
            -LN_2
        } else {
            0.0
        }
    }

    fn draw_pair(&self, rng: &mut dyn RngCore) -> Result<(usize, usize)> {
        let exhausted = |attempts| LupinError::Exhausted {
            proposer: "SingleEdgeProposer",
            attempts,
        };
        let u = self.vertex_sampler.sample(rng).ok_or_else(|| exhausted(1))?;
        for _ in 0..MAX_ITERATIONS {
            let v = self.vertex_sampler.sample(rng).ok_or_else(|| exhausted(1))?;
            if self.allow_self_loops || u != v {
                return Ok((u, v));
            }
        }
        Err(exhausted(MAX_ITERATIONS))
    }
}

impl<S: VertexSampler> GraphMoveProposer for SingleEdgeProposer<S> {
    fn set_up(&mut self, graph: &MultiGraph) {
        self.vertex_sampler.set_up(graph);
    }

    fn propose_move(&self, graph: &MultiGraph, rng: &mut dyn RngCore) -> Result<GraphMove> {
        let (u, v) = self.draw_pair(rng)?;
        let m = graph.edge_multiplicity(u, v);
        let add = if m == 0 {
            true
        } else if !self.allow_multiedges {
            false
        } else {
            rng.random::<bool>()
        };
        Ok(if add {
            GraphMove::new(vec![], vec![(u, v)])
        } else {
            GraphMove::new(vec![(u, v)], vec![])
        })
    }

    fn log_proposal_prob_ratio(&self, mv: &GraphMove, graph: &MultiGraph) -> f64 {
        let folded = mv.folded();
        let (adding, (u, v)) = match (folded.removed_edges.as_slice(), folded.added_edges.as_slice()) {
            ([], [e]) => (true, *e),
            ([e], []) => (false, *e),
            _ => return 0.0,
        };
        let (u, v) = edge(u, v);
        let m = graph.edge_multiplicity(u, v);
        let next_m = if adding { m + 1 } else { m - 1 };

        let degree_diff = mv.degree_diff();
        let delta = |x: usize| degree_diff.get(&x).copied().unwrap_or(0);
        let vs = &self.vertex_sampler;

        let forward = self.log_pair_prob(
            u,
            v,
            vs.vertex_weight(u),
            vs.vertex_weight(v),
            vs.total_weight(),
        ) + self.log_toggle_prob(adding, m);
        let reverse = self.log_pair_prob(
            u,
            v,
            vs.vertex_weight_after(u, delta(u)),
            vs.vertex_weight_after(v, delta(v)),
            vs.total_weight_after(mv.edge_count_diff()),
        ) + self.log_toggle_prob(!adding, next_m);
        reverse - forward
    }

    fn apply_graph_move(&mut self, mv: &GraphMove) -> Result<()> {
        self.vertex_sampler.apply_graph_move(mv)
    }
}
