//! Degree-corrected stochastic block model, stub-labeled.
//!
//! Given labels, block edge counts and degrees, every matching of edge
//! endpoints compatible with the block edge counts is equally likely:
//!
//! ```text
//! log P(G) = Σ_{r<s} ln m_rs! + Σ_r ln (2 m_rr)!! + Σ_i ln k_i!
//!          - Σ_r ln e_r! - Σ_{i<j} ln A_ij! - Σ_i ln (2 A_ii)!!
//! ```

use crate::error::{LupinError, Result};
use crate::graph::MultiGraph;
use crate::moves::{GraphMove, LabelMove};
use crate::nested::{shared, Shared};
use crate::prior::edge_matrix::{
    matrix_diff_from_graph_move, matrix_diff_from_label_move, stub_diff_from_graph_move,
};
use crate::prior::{
    BlockCountPrior, BlockPrior, BlockPriorKind, CountDistribution, DegreePrior, DegreePriorKind,
    DeltaCount, EdgeCountPrior, EdgeMatrixPrior, EdgeMatrixPriorKind, Prior,
};
use crate::random_graph::RandomGraph;
use crate::util::{log_double_factorial_loops, log_factorial};
use rand::seq::SliceRandom;
use rand::RngCore;

/// Degree-corrected stochastic block model.
#[derive(Debug)]
pub struct DegreeCorrectedSbm {
    graph: MultiGraph,
    degree: Shared<DegreePrior>,
    edge_matrix: Shared<EdgeMatrixPrior>,
    block: Shared<BlockPrior>,
}

/// `ln m!` off the diagonal, `ln (2m)!!` on it.
#[inline]
fn log_cell_pairings(same: bool, m: usize) -> f64 {
    if same {
        log_double_factorial_loops(m)
    } else {
        log_factorial(m)
    }
}

fn shifted(value: usize, delta: isize) -> usize {
    (value as isize + delta) as usize
}

impl DegreeCorrectedSbm {
    /// Model on top of an already wired degree prior. Starts from the
    /// empty graph.
    pub fn new(degree: Shared<DegreePrior>) -> Result<Self> {
        let edge_matrix = degree.borrow().edge_matrix_prior().clone();
        let block = edge_matrix.borrow().block_prior().clone();
        let size = block.borrow().size();
        let mut model = DegreeCorrectedSbm {
            graph: MultiGraph::new(size),
            degree,
            edge_matrix,
            block,
        };
        model.set_graph(MultiGraph::new(size))?;
        Ok(model)
    }

    /// Uniform partition, edge matrix and degrees.
    pub fn uniform(
        size: usize,
        edge_count: impl CountDistribution + 'static,
        block_count: impl CountDistribution + 'static,
    ) -> Result<Self> {
        let edge_count = shared(EdgeCountPrior::new(edge_count));
        let block_count = shared(BlockCountPrior::new(block_count));
        let block = shared(BlockPrior::new(size, BlockPriorKind::UniformHyper, block_count));
        Self::assemble(edge_count, block)
    }

    /// A single fixed block with uniform degrees.
    pub fn configuration(size: usize, edge_count: impl CountDistribution + 'static) -> Result<Self> {
        let edge_count = shared(EdgeCountPrior::new(edge_count));
        let block_count = shared(BlockCountPrior::new(DeltaCount::new(size.min(1))));
        let block = shared(BlockPrior::new(size, BlockPriorKind::Delta, block_count));
        Self::assemble(edge_count, block)
    }

    fn assemble(edge_count: Shared<EdgeCountPrior>, block: Shared<BlockPrior>) -> Result<Self> {
        let edge_matrix = shared(EdgeMatrixPrior::new(
            EdgeMatrixPriorKind::Uniform,
            edge_count,
            block.clone(),
        ));
        let degree = shared(DegreePrior::new(DegreePriorKind::Uniform, block, edge_matrix));
        Self::new(degree)
    }

    /// Handle to the degree prior.
    pub fn degree_prior(&self) -> &Shared<DegreePrior> {
        &self.degree
    }

    /// Handle to the edge matrix prior.
    pub fn edge_matrix_prior(&self) -> &Shared<EdgeMatrixPrior> {
        &self.edge_matrix
    }
}

impl RandomGraph for DegreeCorrectedSbm {
    fn graph(&self) -> &MultiGraph {
        &self.graph
    }

    fn set_graph(&mut self, graph: MultiGraph) -> Result<()> {
        self.edge_matrix.borrow_mut().set_graph(&graph)?;
        self.degree.borrow_mut().set_graph(&graph)?;
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
        self.degree.borrow_mut().sample(rng)
    }

    /// Stub matching: each block's stubs are shuffled and dealt out to the
    /// block pairs, then paired in order.
    fn sample_graph(&mut self, rng: &mut dyn RngCore) -> Result<()> {
        let block = self.block.borrow();
        let edge_matrix = self.edge_matrix.borrow();
        let degree = self.degree.borrow();
        let b = block.block_count();

        // hands[r][s]: stubs of block r reserved for block s
        let mut hands: Vec<Vec<Vec<usize>>> = Vec::with_capacity(b);
        for (r, members) in block.members().iter().enumerate() {
            let mut stubs: Vec<usize> = members
                .iter()
                .flat_map(|&v| std::iter::repeat_n(v, degree.degree(v)))
                .collect();
            if stubs.len() != edge_matrix.edge_count_in(r) {
                return Err(LupinError::consistency(
                    "DegreeCorrectedSbm",
                    format!(
                        "block {} has {} stubs but {} edge endpoints",
                        r,
                        stubs.len(),
                        edge_matrix.edge_count_in(r)
                    ),
                ));
            }
            stubs.shuffle(rng);
            let mut row = Vec::with_capacity(b);
            for s in 0..b {
                let take = if r == s {
                    2 * edge_matrix.get(r, r)
                } else {
                    edge_matrix.get(r, s)
                };
                let rest = stubs.split_off(take.min(stubs.len()));
                row.push(std::mem::replace(&mut stubs, rest));
            }
            hands.push(row);
        }

        let mut graph = MultiGraph::new(block.size());
        for r in 0..b {
            for (u, v) in hands[r][r].chunks_exact(2).map(|p| (p[0], p[1])) {
                graph.add_multiedge(u, v, 1)?;
            }
            for s in (r + 1)..b {
                for (&u, &v) in hands[r][s].iter().zip(hands[s][r].iter()) {
                    graph.add_multiedge(u, v, 1)?;
                }
            }
        }
        drop((block, edge_matrix, degree));
        self.graph = graph;
        Ok(())
    }

    fn log_likelihood(&self) -> f64 {
        let edge_matrix = self.edge_matrix.borrow();
        let b = edge_matrix.matrix().len();

        let mut total = 0.0;
        for r in 0..b {
            for s in r..b {
                total += log_cell_pairings(r == s, edge_matrix.get(r, s));
            }
            total -= log_factorial(edge_matrix.edge_count_in(r));
        }
        total += self
            .graph
            .degrees()
            .iter()
            .map(|&k| log_factorial(k))
            .sum::<f64>();
        for ((u, v), m) in self.graph.edges() {
            total -= log_cell_pairings(u == v, m);
        }
        total
    }

    fn log_prior(&self) -> f64 {
        self.degree.borrow().log_joint()
    }

    fn log_likelihood_ratio_from_graph_move(&self, mv: &GraphMove) -> Result<f64> {
        self.graph.check_graph_move(mv)?;
        let block = self.block.borrow();
        let edge_matrix = self.edge_matrix.borrow();
        let labels = block.labels();

        let mut ratio = 0.0;
        for (&(r, s), &d) in matrix_diff_from_graph_move(mv, labels).iter() {
            let m = edge_matrix.get(r, s);
            ratio += log_cell_pairings(r == s, shifted(m, d)) - log_cell_pairings(r == s, m);
        }
        for (&r, &d) in stub_diff_from_graph_move(mv, labels).iter() {
            let e = edge_matrix.edge_count_in(r);
            ratio -= log_factorial(shifted(e, d)) - log_factorial(e);
        }
        for (&v, &d) in mv.degree_diff().iter() {
            let k = self.graph.degree(v);
            ratio += log_factorial(shifted(k, d)) - log_factorial(k);
        }
        for (&(u, v), &d) in mv.edge_diff().iter() {
            let m = self.graph.edge_multiplicity(u, v);
            ratio -= log_cell_pairings(u == v, shifted(m, d)) - log_cell_pairings(u == v, m);
        }
        Ok(ratio)
    }

    fn log_prior_ratio_from_graph_move(&self, mv: &GraphMove) -> Result<f64> {
        self.degree.borrow().log_joint_ratio_from_graph_move(mv)
    }

    fn log_likelihood_ratio_from_label_move(&self, mv: &LabelMove) -> Result<f64> {
        let block = self.block.borrow();
        block.validate_label_move(mv)?;
        if mv.is_trivial() {
            return Ok(0.0);
        }
        let edge_matrix = self.edge_matrix.borrow();
        let mv = mv.appended(block.block_count());
        let (r, s) = (mv.prev_label, mv.next_label);
        let k = self.graph.degree(mv.vertex);

        let mut ratio = 0.0;
        for (&(a, c), &d) in matrix_diff_from_label_move(&mv, &self.graph, block.labels()).iter() {
            let m = edge_matrix.get(a, c);
            ratio += log_cell_pairings(a == c, shifted(m, d)) - log_cell_pairings(a == c, m);
        }
        let e_r = edge_matrix.edge_count_in(r);
        let e_s = edge_matrix.edge_count_in(s);
        ratio -= log_factorial(e_r - k) - log_factorial(e_r);
        ratio -= log_factorial(e_s + k) - log_factorial(e_s);
        Ok(ratio)
    }

    fn log_prior_ratio_from_label_move(&self, mv: &LabelMove) -> Result<f64> {
        self.degree
            .borrow()
            .log_joint_ratio_from_label_move(mv, &self.graph)
    }

    fn apply_graph_move(&mut self, mv: &GraphMove) -> Result<()> {
        self.graph.check_graph_move(mv)?;
        self.degree.borrow_mut().apply_graph_move(mv)?;
        self.graph.apply_graph_move(mv)
    }

    fn apply_label_move(&mut self, mv: &LabelMove) -> Result<()> {
        self.block.borrow().validate_label_move(mv)?;
        self.degree
            .borrow_mut()
            .apply_label_move(mv, &self.graph)
    }

    fn check_self_consistency(&self) -> Result<()> {
        let degree = self.degree.borrow();
        degree.check_self_consistency()?;
        degree.check_against_graph(&self.graph)?;
        self.edge_matrix.borrow().check_against_graph(&self.graph)
    }

    fn check_safety(&self) -> Result<()> {
        self.degree.borrow().check_safety()
    }
}
