use crate::error::{LupinError, Result};
use crate::graph::MultiGraph;
use crate::moves::{GraphMove, LabelMove};
use crate::nested::{EvalContext, NestedRandomVariable, NodeId, Shared};
use crate::prior::edge_matrix::stub_diff_from_graph_move;
use crate::prior::{BlockPrior, EdgeMatrixPrior, Prior};
use crate::util::{log_multiset, sample_weak_composition};
use rand::RngCore;

/// Shape of a [`DegreePrior`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegreePriorKind {
    /// The degree sequence is fixed.
    Delta,
    /// Uniform over the degree sequences summing to each block's
    /// endpoint count.
    Uniform,
}

/// Degree sequence, conditioned on the block sizes and the endpoint count
/// of every block.
#[derive(Debug)]
pub struct DegreePrior {
    id: NodeId,
    kind: DegreePriorKind,
    degrees: Vec<usize>,
    block: Shared<BlockPrior>,
    edge_matrix: Shared<EdgeMatrixPrior>,
}

impl DegreePrior {
    /// All degrees start at zero.
    pub fn new(
        kind: DegreePriorKind,
        block: Shared<BlockPrior>,
        edge_matrix: Shared<EdgeMatrixPrior>,
    ) -> Self {
        let size = block.borrow().size();
        DegreePrior {
            id: NodeId::fresh(),
            kind,
            degrees: vec![0; size],
            block,
            edge_matrix,
        }
    }

    /// The prior family.
    pub fn kind(&self) -> DegreePriorKind {
        self.kind
    }

    /// Degree of every vertex.
    pub fn degrees(&self) -> &[usize] {
        &self.degrees
    }

    /// Degree of `v`.
    pub fn degree(&self, v: usize) -> usize {
        self.degrees[v]
    }

    /// Handle to the edge matrix the degrees are conditioned on.
    pub fn edge_matrix_prior(&self) -> &Shared<EdgeMatrixPrior> {
        &self.edge_matrix
    }

    /// Copy the degree sequence of `graph`.
    pub fn set_graph(&mut self, graph: &MultiGraph) -> Result<()> {
        if graph.size() != self.degrees.len() {
            return Err(LupinError::InvalidParameter(format!(
                "graph has {} vertices, degree prior {}",
                graph.size(),
                self.degrees.len()
            )));
        }
        self.degrees = graph.degrees().to_vec();
        Ok(())
    }

    /// Fail unless the degrees match those of `graph`.
    pub fn check_against_graph(&self, graph: &MultiGraph) -> Result<()> {
        if self.degrees != graph.degrees() {
            return Err(LupinError::consistency(
                "DegreePrior",
                "degree sequence disagrees with the graph",
            ));
        }
        Ok(())
    }

    fn block_term(vertex_count: usize, edge_count: usize) -> f64 {
        -log_multiset(vertex_count, edge_count)
    }
}

impl NestedRandomVariable for DegreePrior {
    fn node_id(&self) -> NodeId {
        self.id
    }
}

impl Prior for DegreePrior {
    fn sample_state(&mut self, rng: &mut dyn RngCore) -> Result<()> {
        if self.kind == DegreePriorKind::Delta {
            return Ok(());
        }
        let block = self.block.borrow();
        let edge_matrix = self.edge_matrix.borrow();
        let members = block.members();
        let mut degrees = vec![0; block.size()];
        for (r, vertices) in members.iter().enumerate() {
            let parts = sample_weak_composition(edge_matrix.edge_count_in(r), vertices.len(), rng)?;
            for (&v, k) in vertices.iter().zip(parts) {
                degrees[v] = k;
            }
        }
        self.degrees = degrees;
        Ok(())
    }

    /// The edge matrix goes first; it pulls in the block prior itself.
    fn sample_priors_with(&mut self, rng: &mut dyn RngCore, ctx: &mut EvalContext) -> Result<()> {
        self.edge_matrix.borrow_mut().sample_with(rng, ctx)?;
        self.block.borrow_mut().sample_with(rng, ctx)
    }

    fn log_likelihood(&self) -> f64 {
        match self.kind {
            DegreePriorKind::Delta => 0.0,
            DegreePriorKind::Uniform => {
                let block = self.block.borrow();
                let edge_matrix = self.edge_matrix.borrow();
                block
                    .vertex_counts()
                    .iter()
                    .enumerate()
                    .map(|(r, &n)| Self::block_term(n, edge_matrix.edge_count_in(r)))
                    .sum()
            }
        }
    }

    fn log_prior_with(&self, ctx: &mut EvalContext) -> f64 {
        self.edge_matrix.borrow().log_joint_with(ctx) + self.block.borrow().log_joint_with(ctx)
    }

    fn log_likelihood_ratio_from_graph_move(&self, mv: &GraphMove) -> Result<f64> {
        let degree_diff = mv.degree_diff();
        for (&v, &d) in degree_diff.iter() {
            if (self.degrees[v] as isize) + d < 0 {
                return Err(LupinError::consistency(
                    "DegreePrior",
                    format!("degree of vertex {} would go negative", v),
                ));
            }
        }
        match self.kind {
            DegreePriorKind::Delta => Ok(if degree_diff.is_empty() {
                0.0
            } else {
                f64::NEG_INFINITY
            }),
            DegreePriorKind::Uniform => {
                let block = self.block.borrow();
                let edge_matrix = self.edge_matrix.borrow();
                let mut ratio = 0.0;
                for (&r, &d) in stub_diff_from_graph_move(mv, block.labels()).iter() {
                    let n = block.vertex_counts()[r];
                    let e = edge_matrix.edge_count_in(r);
                    ratio += Self::block_term(n, (e as isize + d) as usize) - Self::block_term(n, e);
                }
                Ok(ratio)
            }
        }
    }

    fn log_prior_ratio_from_graph_move_with(
        &self,
        mv: &GraphMove,
        ctx: &mut EvalContext,
    ) -> Result<f64> {
        let edge_matrix = self
            .edge_matrix
            .borrow()
            .log_joint_ratio_from_graph_move_with(mv, ctx)?;
        let block = self
            .block
            .borrow()
            .log_joint_ratio_from_graph_move_with(mv, ctx)?;
        Ok(edge_matrix + block)
    }

    fn log_likelihood_ratio_from_label_move(
        &self,
        mv: &LabelMove,
        graph: &MultiGraph,
    ) -> Result<f64> {
        match self.kind {
            DegreePriorKind::Delta => Ok(0.0),
            DegreePriorKind::Uniform => {
                let block = self.block.borrow();
                block.validate_label_move(mv)?;
                let edge_matrix = self.edge_matrix.borrow();
                let mv = mv.appended(block.block_count());
                let (r, s) = (mv.prev_label, mv.next_label);
                let k = graph.degree(mv.vertex);
                let n_r = block.vertex_counts()[r];
                let n_s = block.vertex_counts().get(s).copied().unwrap_or(0);
                let e_r = edge_matrix.edge_count_in(r);
                let e_s = edge_matrix.edge_count_in(s);
                let before = Self::block_term(n_r, e_r) + Self::block_term(n_s, e_s);
                let after = Self::block_term(n_r - 1, e_r - k) + Self::block_term(n_s + 1, e_s + k);
                Ok(after - before)
            }
        }
    }

    fn log_prior_ratio_from_label_move_with(
        &self,
        mv: &LabelMove,
        graph: &MultiGraph,
        ctx: &mut EvalContext,
    ) -> Result<f64> {
        let edge_matrix = self
            .edge_matrix
            .borrow()
            .log_joint_ratio_from_label_move_with(mv, graph, ctx)?;
        let block = self
            .block
            .borrow()
            .log_joint_ratio_from_label_move_with(mv, graph, ctx)?;
        Ok(edge_matrix + block)
    }

    fn apply_graph_move_to_state(&mut self, mv: &GraphMove) -> Result<()> {
        let degree_diff = mv.degree_diff();
        for (&v, &d) in degree_diff.iter() {
            if (self.degrees[v] as isize) + d < 0 {
                return Err(LupinError::consistency(
                    "DegreePrior",
                    format!("degree of vertex {} would go negative", v),
                ));
            }
        }
        for (&v, &d) in degree_diff.iter() {
            self.degrees[v] = (self.degrees[v] as isize + d) as usize;
        }
        Ok(())
    }

    fn apply_graph_move_to_priors_with(
        &mut self,
        mv: &GraphMove,
        ctx: &mut EvalContext,
    ) -> Result<()> {
        self.edge_matrix
            .borrow_mut()
            .apply_graph_move_with(mv, ctx)?;
        self.block.borrow_mut().apply_graph_move_with(mv, ctx)
    }

    fn apply_label_move_to_state(
        &mut self,
        _mv: &LabelMove,
        _graph: &MultiGraph,
        _ctx: &EvalContext,
    ) -> Result<()> {
        Ok(())
    }

    /// The edge matrix must read the labels before the block prior
    /// updates them.
    fn apply_label_move_to_priors_with(
        &mut self,
        mv: &LabelMove,
        graph: &MultiGraph,
        ctx: &mut EvalContext,
    ) -> Result<()> {
        self.edge_matrix
            .borrow_mut()
            .apply_label_move_with(mv, graph, ctx)?;
        self.block.borrow_mut().apply_label_move_with(mv, graph, ctx)
    }

    fn check_self_consistency(&self) -> Result<()> {
        let block = self.block.borrow();
        let edge_matrix = self.edge_matrix.borrow();
        if self.degrees.len() != block.size() {
            return Err(LupinError::consistency(
                "DegreePrior",
                format!(
                    "{} degrees for {} vertices",
                    self.degrees.len(),
                    block.size()
                ),
            ));
        }
        let mut stubs = vec![0; block.block_count()];
        for (v, &k) in self.degrees.iter().enumerate() {
            stubs[block.label_of(v)] += k;
        }
        if stubs != edge_matrix.edge_counts() {
            return Err(LupinError::consistency(
                "DegreePrior",
                format!(
                    "block degree sums {:?} disagree with edge matrix {:?}",
                    stubs,
                    edge_matrix.edge_counts()
                ),
            ));
        }
        edge_matrix.check_self_consistency()
    }

    fn check_safety(&self) -> Result<()> {
        self.edge_matrix.borrow().check_safety()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nested::shared;
    use crate::prior::{
        BlockCountPrior, BlockPriorKind, EdgeCountPrior, EdgeMatrixPriorKind, PoissonCount,
        ZeroTruncatedPoissonCount,
    };
    use approx::assert_abs_diff_eq;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn setup(labels: &[usize], graph: &MultiGraph) -> DegreePrior {
        let edge_count = shared(EdgeCountPrior::new(PoissonCount::new(8.0).unwrap()));
        let block_count = shared(BlockCountPrior::new(
            ZeroTruncatedPoissonCount::new(2.0).unwrap(),
        ));
        let block = shared(BlockPrior::new(
            labels.len(),
            BlockPriorKind::UniformHyper,
            block_count,
        ));
        block.borrow_mut().set_labels(labels).unwrap();
        let edge_matrix = shared(EdgeMatrixPrior::new(
            EdgeMatrixPriorKind::Uniform,
            edge_count,
            block.clone(),
        ));
        edge_matrix.borrow_mut().set_graph(graph).unwrap();
        let mut prior = DegreePrior::new(DegreePriorKind::Uniform, block, edge_matrix);
        prior.set_graph(graph).unwrap();
        prior
    }

    fn toy_graph() -> MultiGraph {
        MultiGraph::from_edges(6, &[(0, 1), (1, 2), (2, 2), (2, 3), (3, 4), (4, 5), (0, 5)]).unwrap()
    }

    #[test]
    fn test_graph_move_delta() {
        let mut g = toy_graph();
        let mut prior = setup(&[0, 0, 1, 1, 2, 2], &g);
        let moves = [
            GraphMove::new(vec![(2, 2)], vec![(1, 4)]),
            GraphMove::new(vec![], vec![(5, 5), (0, 3)]),
            GraphMove::new(vec![(0, 1), (3, 4)], vec![]),
        ];
        for mv in moves.iter() {
            let ratio = prior.log_joint_ratio_from_graph_move(mv).unwrap();
            let before = prior.log_joint();
            prior.apply_graph_move(mv).unwrap();
            g.apply_graph_move(mv).unwrap();
            prior.check_self_consistency().unwrap();
            prior.check_against_graph(&g).unwrap();
            assert_abs_diff_eq!(prior.log_joint() - before, ratio, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_label_move_goes_through_edge_matrix_first() {
        let g = toy_graph();
        let mut prior = setup(&[0, 0, 1, 1, 2, 2], &g);
        let moves = [
            LabelMove::new(3, 1, 2, 0),
            LabelMove::new(2, 1, 0, -1),
            LabelMove::new(5, 1, 2, 1),
        ];
        for mv in moves.iter() {
            let ratio = prior.log_joint_ratio_from_label_move(mv, &g).unwrap();
            let before = prior.log_joint();
            prior.apply_label_move(mv, &g).unwrap();
            prior.check_self_consistency().unwrap();
            prior.edge_matrix_prior().borrow().check_against_graph(&g).unwrap();
            assert_abs_diff_eq!(prior.log_joint() - before, ratio, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_sampled_degrees_match_block_sums() {
        let g = toy_graph();
        let mut prior = setup(&[0, 0, 1, 1, 2, 2], &g);
        let mut rng = SmallRng::seed_from_u64(4);
        let mut sampled = 0;
        while sampled < 20 {
            // a block count above the number of vertices cannot be realized
            if prior.sample(&mut rng).is_err() {
                continue;
            }
            prior.check_self_consistency().unwrap();
            assert!(prior.log_joint().is_finite());
            sampled += 1;
        }
    }
}
