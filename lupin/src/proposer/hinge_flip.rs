use crate::error::{LupinError, Result};
use crate::graph::MultiGraph;
use crate::moves::GraphMove;
use crate::proposer::{respects_constraints, GraphMoveProposer, MAX_ITERATIONS};
use crate::sampler::{EdgeSampler, VertexDegreeSampler, VertexSampler, VertexUniformSampler};
use rand::{Rng, RngCore};
use std::f64::consts::LN_2;

/// Moves one endpoint of an existing edge to a new vertex.
///
/// An edge `{i, j}` is drawn by multiplicity, the pivot `i` by a fair
/// coin, and the new endpoint `k` from the vertex sampler; the move
/// replaces `{i, j}` by `{i, k}`.
#[derive(Debug, Clone)]
pub struct HingeFlipProposer<S: VertexSampler> {
    edge_sampler: EdgeSampler,
    vertex_sampler: S,
    allow_self_loops: bool,
    allow_multiedges: bool,
}

/// Hinge flip with a uniform new endpoint.
pub type HingeFlipUniformProposer = HingeFlipProposer<VertexUniformSampler>;
/// Hinge flip with a degree-biased new endpoint.
pub type HingeFlipDegreeProposer = HingeFlipProposer<VertexDegreeSampler>;

impl HingeFlipUniformProposer {
    /// New endpoint drawn uniformly.
    pub fn uniform(allow_self_loops: bool, allow_multiedges: bool) -> Self {
        HingeFlipProposer::new(VertexUniformSampler::new(), allow_self_loops, allow_multiedges)
    }
}

impl HingeFlipDegreeProposer {
    /// New endpoint drawn with weight `degree + shift`.
    pub fn degree(shift: f64, allow_self_loops: bool, allow_multiedges: bool) -> Result<Self> {
        Ok(HingeFlipProposer::new(
            VertexDegreeSampler::new(shift)?,
            allow_self_loops,
            allow_multiedges,
        ))
    }
}

/// `ln` of the chance that a fair coin picks a given endpoint of `{u, v}`.
#[inline]
fn log_endpoint_prob(u: usize, v: usize) -> f64 {
    if u == v {
        0.0
    } else {
        -LN_2
    }
}

impl<S: VertexSampler> HingeFlipProposer<S> {
    /// Wrap an arbitrary vertex sampler.
    pub fn new(vertex_sampler: S, allow_self_loops: bool, allow_multiedges: bool) -> Self {
        HingeFlipProposer {
            edge_sampler: EdgeSampler::new(),
            vertex_sampler,
            allow_self_loops,
            allow_multiedges,
        }
    }

    fn exhausted(attempts: usize) -> LupinError {
        LupinError::Exhausted {
            proposer: "HingeFlipProposer",
            attempts,
        }
    }
}

/// Split a folded hinge move into `(pivot, old end, new end)`.
fn hinge_of(mv: &GraphMove) -> Option<(usize, usize, usize)> {
    match (mv.removed_edges.as_slice(), mv.added_edges.as_slice()) {
        ([(a, b)], [(c, d)]) => {
            let (a, b, c, d) = (*a, *b, *c, *d);
            if a == c {
                Some((a, b, d))
            } else if a == d {
                Some((a, b, c))
            } else if b == c {
                Some((b, a, d))
            } else if b == d {
                Some((b, a, c))
            } else {
                None
            }
        }
        _ => None,
    }
}

impl<S: VertexSampler> GraphMoveProposer for HingeFlipProposer<S> {
    fn set_up(&mut self, graph: &MultiGraph) {
        self.edge_sampler.set_up(graph);
        self.vertex_sampler.set_up(graph);
    }

    fn propose_move(&self, graph: &MultiGraph, rng: &mut dyn RngCore) -> Result<GraphMove> {
        let (a, b) = self
            .edge_sampler
            .sample(rng)
            .ok_or_else(|| Self::exhausted(1))?;
        let (i, j) = if rng.random::<bool>() { (a, b) } else { (b, a) };

        let mut k = None;
        for _ in 0..MAX_ITERATIONS {
            let candidate = self
                .vertex_sampler
                .sample(rng)
                .ok_or_else(|| Self::exhausted(1))?;
            if self.allow_self_loops || candidate != i {
                k = Some(candidate);
                break;
            }
        }
        let k = k.ok_or_else(|| Self::exhausted(MAX_ITERATIONS))?;

        let mv = GraphMove::new(vec![(i, j)], vec![(i, k)]);
        if !respects_constraints(&mv, graph, self.allow_self_loops, self.allow_multiedges) {
            return Ok(GraphMove::empty());
        }
        Ok(mv)
    }

    fn log_proposal_prob_ratio(&self, mv: &GraphMove, graph: &MultiGraph) -> f64 {
        if mv.is_trivial() {
            return 0.0;
        }
        let Some((i, j, k)) = hinge_of(&mv.folded()) else {
            return f64::NEG_INFINITY;
        };

        let degree_diff = mv.degree_diff();
        let delta = |x: usize| degree_diff.get(&x).copied().unwrap_or(0);
        let vs = &self.vertex_sampler;

        let m_ij = graph.edge_multiplicity(i, j) as f64;
        let m_ik_after = (graph.edge_multiplicity(i, k) + 1) as f64;

        // the edge count is unchanged, so both edge draws share a denominator,
        // and so do both vertex draws (also when k != i is enforced, since the
        // pivot keeps its degree)
        let forward = m_ij.ln() + log_endpoint_prob(i, j) + vs.vertex_weight(k).ln();
        let reverse =
            m_ik_after.ln() + log_endpoint_prob(i, k) + vs.vertex_weight_after(j, delta(j)).ln();
        reverse - forward
    }

    fn apply_graph_move(&mut self, mv: &GraphMove) -> Result<()> {
        self.edge_sampler.check_graph_move(mv)?;
        self.vertex_sampler.check_graph_move(mv)?;
        self.edge_sampler.apply_graph_move(mv)?;
        self.vertex_sampler.apply_graph_move(mv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn toy_graph() -> MultiGraph {
        MultiGraph::from_edges(5, &[(0, 1), (1, 2), (2, 3), (3, 3), (2, 4), (2, 4)]).unwrap()
    }

    fn assert_reversible<P: GraphMoveProposer>(proposer: &mut P, graph: &mut MultiGraph, mv: &GraphMove) {
        let forward = proposer.log_proposal_prob_ratio(mv, graph);
        graph.apply_graph_move(mv).unwrap();
        proposer.apply_graph_move(mv).unwrap();
        let backward = proposer.log_proposal_prob_ratio(&mv.reversed(), graph);
        assert_abs_diff_eq!(forward, -backward, epsilon = 1e-10);
    }

    #[test]
    fn test_trivial_hinge_is_exactly_zero() {
        let g = toy_graph();
        let mut proposer = HingeFlipDegreeProposer::degree(1.0, true, true).unwrap();
        proposer.set_up(&g);
        let mv = GraphMove::new(vec![(2, 4)], vec![(4, 2)]);
        assert_eq!(proposer.log_proposal_prob_ratio(&mv, &g), 0.0);
    }

    #[test]
    fn test_known_correction() {
        let g = toy_graph();
        let mut proposer = HingeFlipUniformProposer::uniform(true, true);
        proposer.set_up(&g);
        // {2, 4} has multiplicity 2; {2, 0} is new
        let mv = GraphMove::new(vec![(2, 4)], vec![(2, 0)]);
        assert_abs_diff_eq!(
            proposer.log_proposal_prob_ratio(&mv, &g),
            -(2f64.ln()),
            epsilon = 1e-12
        );
        // moving the loop end: the reverse picks the pivot of {3, 0} by coin
        let mv = GraphMove::new(vec![(3, 3)], vec![(3, 0)]);
        assert_abs_diff_eq!(
            proposer.log_proposal_prob_ratio(&mv, &g),
            -LN_2,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_proposed_moves_are_reversible() {
        let mut rng = SmallRng::seed_from_u64(17);
        let mut graph = toy_graph();
        let mut proposer = HingeFlipDegreeProposer::degree(0.5, true, true).unwrap();
        proposer.set_up(&graph);
        for _ in 0..300 {
            let mv = proposer.propose_move(&graph, &mut rng).unwrap();
            assert!(graph.check_graph_move(&mv).is_ok());
            assert_reversible(&mut proposer, &mut graph, &mv);
        }
        assert_eq!(graph.total_edge_number(), 6);
    }

    #[test]
    fn test_simple_mode_keeps_graph_simple() {
        let mut rng = SmallRng::seed_from_u64(2);
        let mut graph = MultiGraph::from_edges(6, &[(0, 1), (1, 2), (3, 4), (4, 5)]).unwrap();
        let mut proposer = HingeFlipUniformProposer::uniform(false, false);
        proposer.set_up(&graph);
        for _ in 0..300 {
            let mv = proposer.propose_move(&graph, &mut rng).unwrap();
            graph.apply_graph_move(&mv).unwrap();
            proposer.apply_graph_move(&mv).unwrap();
            assert!(graph.edges().all(|((u, v), m)| u != v && m == 1));
        }
    }

    #[test]
    fn test_empty_graph_is_exhausted() {
        let g = MultiGraph::new(3);
        let mut proposer = HingeFlipUniformProposer::uniform(true, true);
        proposer.set_up(&g);
        let mut rng = SmallRng::seed_from_u64(1);
        assert!(proposer.propose_move(&g, &mut rng).is_err());
    }
}
