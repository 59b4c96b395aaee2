use crate::error::{LupinError, Result};
use crate::graph::{edge, Edge, MultiGraph};
use crate::moves::GraphMove;
use crate::proposer::{respects_constraints, GraphMoveProposer};
use crate::sampler::EdgeSampler;
use rand::{Rng, RngCore};

/// Rewires two edges while keeping every degree.
///
/// Two edges `{a, b}` and `{c, d}` are drawn by multiplicity and replaced by
/// `{a, d}, {c, b}` or, with a fair coin, `{a, c}, {d, b}`.
#[derive(Debug, Clone)]
pub struct DoubleEdgeSwapProposer {
    edge_sampler: EdgeSampler,
    allow_self_loops: bool,
    allow_multiedges: bool,
}

impl Default for DoubleEdgeSwapProposer {
    fn default() -> Self {
        DoubleEdgeSwapProposer::new(true, true)
    }
}

fn swapped(e1: Edge, e2: Edge, flip: bool) -> [Edge; 2] {
    let ((a, b), (c, d)) = (e1, e2);
    let (c, d) = if flip { (d, c) } else { (c, d) };
    let mut out = [edge(a, d), edge(c, b)];
    out.sort_unstable();
    out
}

/// Number of (draw order, coin) outcomes turning `removed` into `added`.
fn num_matching_draws(removed: [Edge; 2], added: [Edge; 2]) -> usize {
    let [e1, e2] = removed;
    [(e1, e2), (e2, e1)]
        .iter()
        .flat_map(|&(x, y)| [false, true].map(|flip| swapped(x, y, flip)))
        .filter(|out| *out == added)
        .count()
}

impl DoubleEdgeSwapProposer {
    /// Swap proposer honoring the structural constraints.
    pub fn new(allow_self_loops: bool, allow_multiedges: bool) -> Self {
        DoubleEdgeSwapProposer {
            edge_sampler: EdgeSampler::new(),
            allow_self_loops,
            allow_multiedges,
        }
    }
}

impl GraphMoveProposer for DoubleEdgeSwapProposer {
    fn set_up(&mut self, graph: &MultiGraph) {
        self.edge_sampler.set_up(graph);
    }

    fn propose_move(&self, graph: &MultiGraph, rng: &mut dyn RngCore) -> Result<GraphMove> {
        let exhausted = || LupinError::Exhausted {
            proposer: "DoubleEdgeSwapProposer",
            attempts: 1,
        };
        let e1 = self.edge_sampler.sample(rng).ok_or_else(exhausted)?;
        let e2 = self.edge_sampler.sample(rng).ok_or_else(exhausted)?;
        if e1 == e2 {
            return Ok(GraphMove::empty());
        }
        let added = swapped(e1, e2, rng.random::<bool>());
        let mv = GraphMove::new(vec![e1, e2], added.to_vec());
        if !respects_constraints(&mv, graph, self.allow_self_loops, self.allow_multiedges) {
            return Ok(GraphMove::empty());
        }
        Ok(mv)
    }

    fn log_proposal_prob_ratio(&self, mv: &GraphMove, graph: &MultiGraph) -> f64 {
        let folded = mv.folded();
        if folded.is_empty() {
            return 0.0;
        }
        let (removed, added) = match (folded.removed_edges.as_slice(), folded.added_edges.as_slice()) {
            ([e1, e2], [f1, f2]) => ([*e1, *e2], [*f1, *f2]),
            _ => return f64::NEG_INFINITY,
        };
        // a swap never draws the same edge twice
        if added[0] == added[1] {
            return f64::NEG_INFINITY;
        }
        if removed[0] == removed[1] {
            return f64::INFINITY;
        }

        let diff = mv.edge_diff();
        let after = |e: &Edge| {
            (graph.edge_multiplicity(e.0, e.1) as isize + diff.get(e).copied().unwrap_or(0)) as f64
        };
        let before = |e: &Edge| graph.edge_multiplicity(e.0, e.1) as f64;

        let forward = (before(&removed[0]) * before(&removed[1])).ln()
            + (num_matching_draws(removed, added) as f64).ln();
        let reverse = (after(&added[0]) * after(&added[1])).ln()
            + (num_matching_draws(added, removed) as f64).ln();
        reverse - forward
    }

    fn apply_graph_move(&mut self, mv: &GraphMove) -> Result<()> {
        self.edge_sampler.apply_graph_move(mv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn test_swap_preserves_degrees() {
        let mut rng = SmallRng::seed_from_u64(8);
        let mut graph =
            MultiGraph::from_edges(6, &[(0, 1), (1, 2), (2, 3), (3, 4), (4, 5), (5, 0), (0, 3)])
                .unwrap();
        let degrees = graph.degrees().to_vec();
        let mut proposer = DoubleEdgeSwapProposer::default();
        proposer.set_up(&graph);
        for _ in 0..500 {
            let mv = proposer.propose_move(&graph, &mut rng).unwrap();
            let forward = proposer.log_proposal_prob_ratio(&mv, &graph);
            graph.apply_graph_move(&mv).unwrap();
            proposer.apply_graph_move(&mv).unwrap();
            let backward = proposer.log_proposal_prob_ratio(&mv.reversed(), &graph);
            if forward.is_finite() {
                assert_abs_diff_eq!(forward, -backward, epsilon = 1e-10);
            }
            assert_eq!(graph.degrees(), degrees.as_slice());
        }
    }

    #[test]
    fn test_matching_draws() {
        // {0,1},{2,3} -> {0,3},{1,2}: one order and coin from each side
        assert_eq!(num_matching_draws([(0, 1), (2, 3)], [(0, 3), (1, 2)]), 2);
        // two loops merge the same way for every order and coin
        assert_eq!(num_matching_draws([(0, 0), (1, 1)], [(0, 1), (0, 1)]), 4);
    }

    #[test]
    fn test_merging_swap_cannot_be_reversed() {
        let graph = MultiGraph::from_edges(2, &[(0, 0), (1, 1)]).unwrap();
        let mut proposer = DoubleEdgeSwapProposer::default();
        proposer.set_up(&graph);
        let mv = GraphMove::new(vec![(0, 0), (1, 1)], vec![(0, 1), (0, 1)]);
        assert_eq!(proposer.log_proposal_prob_ratio(&mv, &graph), f64::NEG_INFINITY);
    }

    #[test]
    fn test_simple_mode_rejects_parallel_edges() {
        let mut rng = SmallRng::seed_from_u64(4);
        let mut graph = MultiGraph::from_edges(4, &[(0, 1), (2, 3), (0, 2), (1, 3)]).unwrap();
        let mut proposer = DoubleEdgeSwapProposer::new(false, false);
        proposer.set_up(&graph);
        for _ in 0..300 {
            let mv = proposer.propose_move(&graph, &mut rng).unwrap();
            graph.apply_graph_move(&mv).unwrap();
            proposer.apply_graph_move(&mv).unwrap();
            assert!(graph.edges().all(|((u, v), m)| u != v && m == 1));
        }
    }
}
