//! Stochastic block model with a uniform likelihood given the block
//! edge counts.

use crate::error::{LupinError, Result};
use crate::graph::{edge, Edge, MultiGraph};
use crate::moves::{GraphMove, LabelMove};
use crate::nested::{shared, Shared};
use crate::prior::edge_matrix::{matrix_diff_from_graph_move, matrix_diff_from_label_move};
use crate::prior::{
    BlockCountPrior, BlockPrior, BlockPriorKind, CountDistribution, DeltaCount, EdgeCountPrior,
    EdgeMatrixPrior, EdgeMatrixPriorKind, Prior,
};
use crate::random_graph::RandomGraph;
use crate::util::{
    log_binomial, log_multiset, num_triangle_pairs, sample_multiset, sample_subset, triangle_pair,
};
use fnv::FnvHashSet;
use rand::RngCore;

/// Likelihood variant of a [`StochasticBlockModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SbmOptions {
    /// Allow edges `(v, v)`.
    pub with_self_loops: bool,
    /// Allow more than one edge between the same pair.
    pub with_parallel_edges: bool,
}

impl Default for SbmOptions {
    fn default() -> Self {
        SbmOptions {
            with_self_loops: true,
            with_parallel_edges: true,
        }
    }
}

/// Stochastic block model over an edge matrix prior.
#[derive(Debug)]
pub struct StochasticBlockModel {
    graph: MultiGraph,
    edge_matrix: Shared<EdgeMatrixPrior>,
    block: Shared<BlockPrior>,
    options: SbmOptions,
}

impl StochasticBlockModel {
    /// Model on top of an already wired edge matrix prior. Starts from the
    /// empty graph.
    pub fn new(edge_matrix: Shared<EdgeMatrixPrior>, options: SbmOptions) -> Result<Self> {
        let block = edge_matrix.borrow().block_prior().clone();
        let size = block.borrow().size();
        let mut model = StochasticBlockModel {
            graph: MultiGraph::new(size),
            edge_matrix,
            block,
            options,
        };
        model.set_graph(MultiGraph::new(size))?;
        Ok(model)
    }

    /// Uniform block sizes and labels, uniform edge matrix.
    pub fn uniform(
        size: usize,
        edge_count: impl CountDistribution + 'static,
        block_count: impl CountDistribution + 'static,
        options: SbmOptions,
    ) -> Result<Self> {
        let edge_count = shared(EdgeCountPrior::new(edge_count));
        let block_count = shared(BlockCountPrior::new(block_count));
        let block = shared(BlockPrior::new(size, BlockPriorKind::UniformHyper, block_count));
        let edge_matrix = shared(EdgeMatrixPrior::new(
            EdgeMatrixPriorKind::Uniform,
            edge_count,
            block,
        ));
        Self::new(edge_matrix, options)
    }

    /// A single fixed block: every graph with `E` edges is equally likely.
    pub fn erdos_renyi(
        size: usize,
        edge_count: impl CountDistribution + 'static,
        options: SbmOptions,
    ) -> Result<Self> {
        let edge_count = shared(EdgeCountPrior::new(edge_count));
        let block_count = shared(BlockCountPrior::new(DeltaCount::new(size.min(1))));
        let block = shared(BlockPrior::new(size, BlockPriorKind::Delta, block_count));
        let edge_matrix = shared(EdgeMatrixPrior::new(
            EdgeMatrixPriorKind::Uniform,
            edge_count,
            block,
        ));
        Self::new(edge_matrix, options)
    }

    /// The likelihood variant.
    pub fn options(&self) -> SbmOptions {
        self.options
    }

    /// Handle to the edge matrix prior.
    pub fn edge_matrix_prior(&self) -> &Shared<EdgeMatrixPrior> {
        &self.edge_matrix
    }

    /// Number of vertex pairs between blocks of sizes `n_r` and `n_s`.
    fn pair_count(&self, n_r: usize, n_s: usize, same_block: bool) -> usize {
        if same_block {
            num_triangle_pairs(n_r, self.options.with_self_loops)
        } else {
            n_r * n_s
        }
    }

    /// Log-probability of one block pair: one over the number of ways to
    /// place `edges` edges on `pairs` vertex pairs.
    fn log_cell_likelihood(&self, pairs: usize, edges: usize) -> f64 {
        let log_count = if self.options.with_parallel_edges {
            log_multiset(pairs, edges)
        } else {
            log_binomial(pairs, edges)
        };
        if log_count == f64::NEG_INFINITY {
            f64::NEG_INFINITY
        } else {
            -log_count
        }
    }

    fn violates_options(&self, u: usize, v: usize, multiplicity: usize) -> bool {
        (!self.options.with_self_loops && u == v && multiplicity > 0)
            || (!self.options.with_parallel_edges && multiplicity > 1)
    }
}

impl RandomGraph for StochasticBlockModel {
    fn graph(&self) -> &MultiGraph {
        &self.graph
    }

    fn set_graph(&mut self, graph: MultiGraph) -> Result<()> {
        self.edge_matrix.borrow_mut().set_graph(&graph)?;
        self.graph = graph;
        Ok(())
    }

    fn set_labels(&mut self, labels: &[usize]) -> Result<()> {
        self.block.borrow_mut().set_labels(labels)?;
        self.edge_matrix.borrow_mut().set_graph(&self.graph)
    }

    fn block_prior(&self) -> &Shared<BlockPrior> {
        &self.block
    }

    fn sample_priors(&mut self, rng: &mut dyn RngCore) -> Result<()> {
        self.edge_matrix.borrow_mut().sample(rng)
    }

    fn sample_graph(&mut self, rng: &mut dyn RngCore) -> Result<()> {
        let members = self.block.borrow().members();
        let edge_matrix = self.edge_matrix.borrow();
        let mut graph = MultiGraph::new(self.graph.size());
        let b = members.len();

        for r in 0..b {
            for s in r..b {
                let edges = edge_matrix.get(r, s);
                if edges == 0 {
                    continue;
                }
                let pairs = self.pair_count(members[r].len(), members[s].len(), r == s);
                let picks = if self.options.with_parallel_edges {
                    sample_multiset(pairs, edges, rng)?
                } else {
                    sample_subset(pairs, edges, rng)?
                };
                for index in picks {
                    let (u, v) = if r == s {
                        let (a, c) =
                            triangle_pair(index, members[r].len(), self.options.with_self_loops);
                        (members[r][a], members[r][c])
                    } else {
                        let n_s = members[s].len();
                        (members[r][index / n_s], members[s][index % n_s])
                    };
                    graph.add_multiedge(u, v, 1)?;
                }
            }
        }
        drop(edge_matrix);
        self.graph = graph;
        Ok(())
    }

    fn log_likelihood(&self) -> f64 {
        for ((u, v), m) in self.graph.edges() {
            if self.violates_options(u, v, m) {
                return f64::NEG_INFINITY;
            }
        }
        let block = self.block.borrow();
        let edge_matrix = self.edge_matrix.borrow();
        let counts = block.vertex_counts();
        let mut total = 0.0;
        for r in 0..counts.len() {
            for s in r..counts.len() {
                let pairs = self.pair_count(counts[r], counts[s], r == s);
                total += self.log_cell_likelihood(pairs, edge_matrix.get(r, s));
            }
        }
        total
    }

    fn log_prior(&self) -> f64 {
        self.edge_matrix.borrow().log_joint()
    }

    fn log_likelihood_ratio_from_graph_move(&self, mv: &GraphMove) -> Result<f64> {
        self.graph.check_graph_move(mv)?;
        for (&(u, v), &d) in mv.edge_diff().iter() {
            let next = (self.graph.edge_multiplicity(u, v) as isize + d) as usize;
            if d > 0 && self.violates_options(u, v, next) {
                return Ok(f64::NEG_INFINITY);
            }
        }

        let block = self.block.borrow();
        let edge_matrix = self.edge_matrix.borrow();
        let counts = block.vertex_counts();
        let mut ratio = 0.0;
        for (&(r, s), &d) in matrix_diff_from_graph_move(mv, block.labels()).iter() {
            let pairs = self.pair_count(counts[r], counts[s], r == s);
            let m = edge_matrix.get(r, s);
            ratio += self.log_cell_likelihood(pairs, (m as isize + d) as usize)
                - self.log_cell_likelihood(pairs, m);
        }
        Ok(ratio)
    }

    fn log_prior_ratio_from_graph_move(&self, mv: &GraphMove) -> Result<f64> {
        self.edge_matrix
            .borrow()
            .log_joint_ratio_from_graph_move(mv)
    }

    /// Evaluated before compaction: a vacated block simply has zero
    /// vertices and zero edges afterwards.
    fn log_likelihood_ratio_from_label_move(&self, mv: &LabelMove) -> Result<f64> {
        let block = self.block.borrow();
        block.validate_label_move(mv)?;
        if mv.is_trivial() {
            return Ok(0.0);
        }
        let edge_matrix = self.edge_matrix.borrow();
        let mv = mv.appended(block.block_count());
        let (r, s) = (mv.prev_label, mv.next_label);
        let b = block.block_count().max(s + 1);

        let count_before = |t: usize| block.vertex_counts().get(t).copied().unwrap_or(0);
        let count_after = |t: usize| {
            let n = count_before(t);
            if t == r {
                n - 1
            } else if t == s {
                n + 1
            } else {
                n
            }
        };

        let diff = matrix_diff_from_label_move(&mv, &self.graph, block.labels());
        let cells: FnvHashSet<Edge> = (0..b).flat_map(|t| [edge(r, t), edge(s, t)]).collect();

        let mut ratio = 0.0;
        for &(a, c) in cells.iter() {
            let m = edge_matrix.get(a, c);
            let next_m = (m as isize + diff.get(&(a, c)).copied().unwrap_or(0)) as usize;
            let before = self.pair_count(count_before(a), count_before(c), a == c);
            let after = self.pair_count(count_after(a), count_after(c), a == c);
            ratio += self.log_cell_likelihood(after, next_m) - self.log_cell_likelihood(before, m);
        }
        Ok(ratio)
    }

    fn log_prior_ratio_from_label_move(&self, mv: &LabelMove) -> Result<f64> {
        self.edge_matrix
            .borrow()
            .log_joint_ratio_from_label_move(mv, &self.graph)
    }

    fn apply_graph_move(&mut self, mv: &GraphMove) -> Result<()> {
        self.graph.check_graph_move(mv)?;
        self.edge_matrix.borrow_mut().apply_graph_move(mv)?;
        self.graph.apply_graph_move(mv)
    }

    fn apply_label_move(&mut self, mv: &LabelMove) -> Result<()> {
        self.block.borrow().validate_label_move(mv)?;
        self.edge_matrix
            .borrow_mut()
            .apply_label_move(mv, &self.graph)
    }

    fn check_self_consistency(&self) -> Result<()> {
        let edge_matrix = self.edge_matrix.borrow();
        edge_matrix.check_self_consistency()?;
        edge_matrix.check_against_graph(&self.graph)?;
        if self.block.borrow().size() != self.graph.size() {
            return Err(LupinError::consistency(
                "StochasticBlockModel",
                "partition and graph sizes differ",
            ));
        }
        Ok(())
    }

    fn check_safety(&self) -> Result<()> {
        self.edge_matrix.borrow().check_safety()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prior::{PoissonCount, UniformCount};
    use approx::assert_abs_diff_eq;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn planted() -> StochasticBlockModel {
        let mut sbm = StochasticBlockModel::uniform(
            8,
            PoissonCount::new(10.0).unwrap(),
            UniformCount::new(1, 4).unwrap(),
            SbmOptions::default(),
        )
        .unwrap();
        sbm.set_labels(&[0, 0, 0, 1, 1, 1, 2, 2]).unwrap();
        let g = MultiGraph::from_edges(
            8,
            &[(0, 1), (1, 2), (0, 2), (3, 4), (4, 5), (5, 5), (6, 7), (2, 3), (5, 6), (1, 2)],
        )
        .unwrap();
        sbm.set_graph(g).unwrap();
        sbm
    }

    #[test]
    fn test_graph_move_ratio_matches_difference() {
        let mut sbm = planted();
        let moves = [
            GraphMove::new(vec![(0, 1)], vec![(0, 7)]),
            GraphMove::new(vec![], vec![(3, 3), (3, 4)]),
            GraphMove::new(vec![(1, 2), (5, 5)], vec![]),
        ];
        for mv in moves.iter() {
            let ratio = sbm.log_joint_ratio_from_graph_move(mv).unwrap();
            let before = sbm.log_joint();
            sbm.apply_graph_move(mv).unwrap();
            sbm.check_self_consistency().unwrap();
            assert_abs_diff_eq!(sbm.log_joint() - before, ratio, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_label_move_ratio_matches_difference() {
        let mut sbm = planted();
        let moves = [
            LabelMove::new(2, 0, 1, 0),
            LabelMove::new(7, 2, 3, 1),
            LabelMove::new(6, 2, 0, -1),
            LabelMove::new(5, 1, 2, 0),
        ];
        for mv in moves.iter() {
            let ratio = sbm.log_joint_ratio_from_label_move(mv).unwrap();
            let before = sbm.log_joint();
            sbm.apply_label_move(mv).unwrap();
            sbm.check_self_consistency().unwrap();
            assert_abs_diff_eq!(sbm.log_joint() - before, ratio, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_simple_graph_flags() {
        let options = SbmOptions {
            with_self_loops: false,
            with_parallel_edges: false,
        };
        let mut er = StochasticBlockModel::erdos_renyi(5, PoissonCount::new(3.0).unwrap(), options)
            .unwrap();
        er.set_graph(MultiGraph::from_edges(5, &[(0, 1), (2, 3)]).unwrap())
            .unwrap();
        assert!(er.log_joint().is_finite());

        let self_loop = GraphMove::new(vec![], vec![(4, 4)]);
        let parallel = GraphMove::new(vec![], vec![(1, 0)]);
        assert_eq!(
            er.log_joint_ratio_from_graph_move(&self_loop).unwrap(),
            f64::NEG_INFINITY
        );
        assert_eq!(
            er.log_joint_ratio_from_graph_move(&parallel).unwrap(),
            f64::NEG_INFINITY
        );

        let mut rng = SmallRng::seed_from_u64(13);
        for _ in 0..20 {
            er.sample(&mut rng).unwrap();
            er.check_self_consistency().unwrap();
            for ((u, v), m) in er.graph().edges() {
                assert!(u != v && m == 1);
            }
        }
    }

    #[test]
    fn test_invalid_graph_move_leaves_state() {
        let mut sbm = planted();
        let before = sbm.graph().clone();
        let joint = sbm.log_joint();
        let mv = GraphMove::new(vec![(6, 7), (6, 7)], vec![]);
        assert!(matches!(
            sbm.apply_graph_move(&mv),
            Err(LupinError::Consistency { .. })
        ));
        assert_eq!(sbm.graph(), &before);
        assert_eq!(sbm.log_joint(), joint);
        sbm.check_self_consistency().unwrap();
    }

    #[test]
    fn test_sampling_is_consistent() {
        let mut sbm = planted();
        let mut rng = SmallRng::seed_from_u64(3);
        for _ in 0..30 {
            sbm.sample(&mut rng).unwrap();
            sbm.check_self_consistency().unwrap();
            assert!(sbm.log_joint().is_finite());
            assert_eq!(
                sbm.graph().total_edge_number(),
                sbm.edge_matrix_prior()
                    .borrow()
                    .edge_count_prior()
                    .borrow()
                    .state()
            );
        }
    }
}
