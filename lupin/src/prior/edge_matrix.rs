use crate::error::{LupinError, Result};
use crate::graph::{edge, Edge, MultiGraph};
use crate::moves::{GraphMove, LabelMove};
use crate::nested::{EvalContext, NestedRandomVariable, NodeId, Shared};
use crate::prior::{BlockPrior, EdgeCountPrior, Prior};
use crate::util::{log_multiset, num_triangle_pairs, sample_multiset, triangle_pair};
use fnv::FnvHashMap;
use rand::RngCore;

/// Shape of an [`EdgeMatrixPrior`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeMatrixPriorKind {
    /// The matrix is fixed.
    Delta,
    /// Uniform over the multisets of `E` block pairs.
    Uniform,
}

/// Edge counts between blocks.
///
/// `matrix[r][s]` is the number of edges joining blocks `r` and `s`
/// (symmetric; the diagonal counts edges inside a block once) and
/// `edge_counts[r]` the number of edge endpoints in block `r`.
#[derive(Debug)]
pub struct EdgeMatrixPrior {
    id: NodeId,
    kind: EdgeMatrixPriorKind,
    matrix: Vec<Vec<usize>>,
    edge_counts: Vec<usize>,
    edge_count: Shared<EdgeCountPrior>,
    block: Shared<BlockPrior>,
}

/// Net change per block pair caused by a graph move.
pub(crate) fn matrix_diff_from_graph_move(
    mv: &GraphMove,
    labels: &[usize],
) -> FnvHashMap<Edge, isize> {
    let mut diff = FnvHashMap::default();
    for (&(u, v), &d) in mv.edge_diff().iter() {
        *diff.entry(edge(labels[u], labels[v])).or_insert(0) += d;
    }
    diff.retain(|_, d| *d != 0);
    diff
}

/// Net change per block pair caused by moving `mv.vertex`, in
/// pre-compaction indices.
pub(crate) fn matrix_diff_from_label_move(
    mv: &LabelMove,
    graph: &MultiGraph,
    labels: &[usize],
) -> FnvHashMap<Edge, isize> {
    let (r, s) = (mv.prev_label, mv.next_label);
    let mut diff = FnvHashMap::default();
    for (u, m) in graph.neighbors(mv.vertex) {
        let m = m as isize;
        let t_prev = if u == mv.vertex { r } else { labels[u] };
        let t_next = if u == mv.vertex { s } else { labels[u] };
        *diff.entry(edge(r, t_prev)).or_insert(0) -= m;
        *diff.entry(edge(s, t_next)).or_insert(0) += m;
    }
    diff.retain(|_, d| *d != 0);
    diff
}

/// Net change of per-block endpoint counts caused by a graph move.
pub(crate) fn stub_diff_from_graph_move(
    mv: &GraphMove,
    labels: &[usize],
) -> FnvHashMap<usize, isize> {
    let mut diff = FnvHashMap::default();
    for (&v, &d) in mv.degree_diff().iter() {
        *diff.entry(labels[v]).or_insert(0) += d;
    }
    diff.retain(|_, d| *d != 0);
    diff
}

/// Block matrix and endpoint counts of `graph` under `labels`.
pub(crate) fn count_block_edges(
    graph: &MultiGraph,
    labels: &[usize],
    block_count: usize,
) -> (Vec<Vec<usize>>, Vec<usize>) {
    let mut matrix = vec![vec![0; block_count]; block_count];
    let mut edge_counts = vec![0; block_count];
    for ((u, v), m) in graph.edges() {
        let (r, s) = (labels[u], labels[v]);
        matrix[r][s] += m;
        if r != s {
            matrix[s][r] += m;
        }
        edge_counts[r] += m;
        edge_counts[s] += m;
    }
    (matrix, edge_counts)
}

fn shifted(value: usize, delta: isize) -> Option<usize> {
    let next = value as isize + delta;
    if next < 0 {
        None
    } else {
        Some(next as usize)
    }
}

impl EdgeMatrixPrior {
    /// Empty matrix over the blocks of `block`.
    pub fn new(
        kind: EdgeMatrixPriorKind,
        edge_count: Shared<EdgeCountPrior>,
        block: Shared<BlockPrior>,
    ) -> Self {
        let b = block.borrow().block_count();
        EdgeMatrixPrior {
            id: NodeId::fresh(),
            kind,
            matrix: vec![vec![0; b]; b],
            edge_counts: vec![0; b],
            edge_count,
            block,
        }
    }

    /// The prior family.
    pub fn kind(&self) -> EdgeMatrixPriorKind {
        self.kind
    }

    /// Rows of the symmetric block matrix.
    pub fn matrix(&self) -> &[Vec<usize>] {
        &self.matrix
    }

    /// Edges between blocks `r` and `s`, zero outside the matrix.
    pub fn get(&self, r: usize, s: usize) -> usize {
        self.matrix
            .get(r)
            .and_then(|row| row.get(s))
            .copied()
            .unwrap_or(0)
    }

    /// Number of edge endpoints in each block.
    pub fn edge_counts(&self) -> &[usize] {
        &self.edge_counts
    }

    /// Edge endpoints in block `r`.
    pub fn edge_count_in(&self, r: usize) -> usize {
        self.edge_counts.get(r).copied().unwrap_or(0)
    }

    /// Handle to the edge count.
    pub fn edge_count_prior(&self) -> &Shared<EdgeCountPrior> {
        &self.edge_count
    }

    /// Handle to the partition.
    pub fn block_prior(&self) -> &Shared<BlockPrior> {
        &self.block
    }

    /// Recompute the matrix (and the edge count) from `graph` under the
    /// current labels.
    pub fn set_graph(&mut self, graph: &MultiGraph) -> Result<()> {
        let block = self.block.borrow();
        if graph.size() != block.size() {
            return Err(LupinError::InvalidParameter(format!(
                "graph has {} vertices, partition has {}",
                graph.size(),
                block.size()
            )));
        }
        let (matrix, edge_counts) = count_block_edges(graph, block.labels(), block.block_count());
        self.matrix = matrix;
        self.edge_counts = edge_counts;
        self.edge_count
            .borrow_mut()
            .set_state(graph.total_edge_number());
        Ok(())
    }

    /// Compare the state with the matrix induced by `graph`.
    pub fn check_against_graph(&self, graph: &MultiGraph) -> Result<()> {
        let block = self.block.borrow();
        let (matrix, edge_counts) = count_block_edges(graph, block.labels(), block.block_count());
        if matrix != self.matrix || edge_counts != self.edge_counts {
            return Err(LupinError::consistency(
                "EdgeMatrixPrior",
                format!(
                    "matrix {:?} disagrees with the graph's block edges {:?}",
                    self.matrix, matrix
                ),
            ));
        }
        Ok(())
    }

    fn log_likelihood_uniform(block_count: usize, edge_count: usize) -> f64 {
        -log_multiset(num_triangle_pairs(block_count, true), edge_count)
    }
}

impl NestedRandomVariable for EdgeMatrixPrior {
    fn node_id(&self) -> NodeId {
        self.id
    }
}

impl Prior for EdgeMatrixPrior {
    fn sample_state(&mut self, rng: &mut dyn RngCore) -> Result<()> {
        if self.kind == EdgeMatrixPriorKind::Delta {
            return Ok(());
        }
        let b = self.block.borrow().block_count();
        let e = self.edge_count.borrow().state();
        let mut matrix = vec![vec![0; b]; b];
        let mut edge_counts = vec![0; b];
        for index in sample_multiset(num_triangle_pairs(b, true), e, rng)? {
            let (r, s) = triangle_pair(index, b, true);
            matrix[r][s] += 1;
            if r != s {
                matrix[s][r] += 1;
            }
            edge_counts[r] += 1;
            edge_counts[s] += 1;
        }
        self.matrix = matrix;
        self.edge_counts = edge_counts;
        Ok(())
    }

    fn sample_priors_with(&mut self, rng: &mut dyn RngCore, ctx: &mut EvalContext) -> Result<()> {
        self.edge_count.borrow_mut().sample_with(rng, ctx)?;
        self.block.borrow_mut().sample_with(rng, ctx)
    }

    fn log_likelihood(&self) -> f64 {
        match self.kind {
            EdgeMatrixPriorKind::Delta => 0.0,
            EdgeMatrixPriorKind::Uniform => Self::log_likelihood_uniform(
                self.block.borrow().block_count(),
                self.edge_count.borrow().state(),
            ),
        }
    }

    fn log_prior_with(&self, ctx: &mut EvalContext) -> f64 {
        self.edge_count.borrow().log_joint_with(ctx) + self.block.borrow().log_joint_with(ctx)
    }

    fn log_likelihood_ratio_from_graph_move(&self, mv: &GraphMove) -> Result<f64> {
        match self.kind {
            EdgeMatrixPriorKind::Delta => {
                let block = self.block.borrow();
                if matrix_diff_from_graph_move(mv, block.labels()).is_empty() {
                    Ok(0.0)
                } else {
                    Ok(f64::NEG_INFINITY)
                }
            }
            EdgeMatrixPriorKind::Uniform => {
                let b = self.block.borrow().block_count();
                let e = self.edge_count.borrow().state();
                let Some(next_e) = shifted(e, mv.edge_count_diff()) else {
                    return Err(LupinError::consistency(
                        "EdgeMatrixPrior",
                        "move removes more edges than exist",
                    ));
                };
                Ok(Self::log_likelihood_uniform(b, next_e) - Self::log_likelihood_uniform(b, e))
            }
        }
    }

    fn log_prior_ratio_from_graph_move_with(
        &self,
        mv: &GraphMove,
        ctx: &mut EvalContext,
    ) -> Result<f64> {
        let edge_count = self
            .edge_count
            .borrow()
            .log_joint_ratio_from_graph_move_with(mv, ctx)?;
        let block = self
            .block
            .borrow()
            .log_joint_ratio_from_graph_move_with(mv, ctx)?;
        Ok(edge_count + block)
    }

    fn log_likelihood_ratio_from_label_move(
        &self,
        mv: &LabelMove,
        graph: &MultiGraph,
    ) -> Result<f64> {
        let block = self.block.borrow();
        block.validate_label_move(mv)?;
        match self.kind {
            EdgeMatrixPriorKind::Delta => {
                let mv = mv.appended(block.block_count());
                let diff = matrix_diff_from_label_move(&mv, graph, block.labels());
                if diff.is_empty() && mv.added_labels == 0 {
                    Ok(0.0)
                } else {
                    Ok(f64::NEG_INFINITY)
                }
            }
            EdgeMatrixPriorKind::Uniform => {
                let b = block.block_count();
                let next_b = (b as isize + mv.added_labels as isize) as usize;
                let e = self.edge_count.borrow().state();
                Ok(Self::log_likelihood_uniform(next_b, e) - Self::log_likelihood_uniform(b, e))
            }
        }
    }

    fn log_prior_ratio_from_label_move_with(
        &self,
        mv: &LabelMove,
        graph: &MultiGraph,
        ctx: &mut EvalContext,
    ) -> Result<f64> {
        let edge_count = self
            .edge_count
            .borrow()
            .log_joint_ratio_from_label_move_with(mv, graph, ctx)?;
        let block = self
            .block
            .borrow()
            .log_joint_ratio_from_label_move_with(mv, graph, ctx)?;
        Ok(edge_count + block)
    }

    fn apply_graph_move_to_state(&mut self, mv: &GraphMove) -> Result<()> {
        let block = self.block.borrow();
        let diff = matrix_diff_from_graph_move(mv, block.labels());
        let stubs = stub_diff_from_graph_move(mv, block.labels());

        for (&(r, s), &d) in diff.iter() {
            if shifted(self.get(r, s), d).is_none() {
                return Err(LupinError::consistency(
                    "EdgeMatrixPrior",
                    format!("edge count between blocks {} and {} would go negative", r, s),
                ));
            }
        }
        for (&(r, s), &d) in diff.iter() {
            let next = (self.matrix[r][s] as isize + d) as usize;
            self.matrix[r][s] = next;
            self.matrix[s][r] = next;
        }
        for (&r, &d) in stubs.iter() {
            self.edge_counts[r] = (self.edge_counts[r] as isize + d) as usize;
        }
        Ok(())
    }

    fn apply_graph_move_to_priors_with(
        &mut self,
        mv: &GraphMove,
        ctx: &mut EvalContext,
    ) -> Result<()> {
        self.edge_count.borrow_mut().apply_graph_move_with(mv, ctx)?;
        self.block.borrow_mut().apply_graph_move_with(mv, ctx)
    }

    fn apply_label_move_to_state(
        &mut self,
        mv: &LabelMove,
        graph: &MultiGraph,
        ctx: &EvalContext,
    ) -> Result<()> {
        let block = self.block.borrow();
        if ctx.is_processed(block.node_id()) {
            return Err(LupinError::safety(
                "EdgeMatrixPrior",
                "labels were updated before the edge matrix could read them",
            ));
        }
        block.validate_label_move(mv)?;

        let b = block.block_count();
        let position = mv.next_label;
        let mv = mv.appended(b);
        let (r, s) = (mv.prev_label, mv.next_label);
        let diff = matrix_diff_from_label_move(&mv, graph, block.labels());
        let k = graph.degree(mv.vertex);

        if mv.added_labels > 0 {
            for row in self.matrix.iter_mut() {
                row.push(0);
            }
            self.matrix.push(vec![0; s + 1]);
            self.edge_counts.push(0);
        }
        for (&(a, b), &d) in diff.iter() {
            let next = (self.matrix[a][b] as isize + d) as usize;
            self.matrix[a][b] = next;
            self.matrix[b][a] = next;
        }
        self.edge_counts[r] -= k;
        self.edge_counts[s] += k;

        if mv.is_birth() && position < b {
            let fresh = self.matrix.remove(b);
            self.matrix.insert(position, fresh);
            for row in self.matrix.iter_mut() {
                let cell = row.remove(b);
                row.insert(position, cell);
            }
            let fresh = self.edge_counts.remove(b);
            self.edge_counts.insert(position, fresh);
        }
        if mv.added_labels < 0 {
            self.matrix.remove(r);
            for row in self.matrix.iter_mut() {
                row.remove(r);
            }
            self.edge_counts.remove(r);
        }
        Ok(())
    }

    fn apply_label_move_to_priors_with(
        &mut self,
        mv: &LabelMove,
        graph: &MultiGraph,
        ctx: &mut EvalContext,
    ) -> Result<()> {
        self.edge_count
            .borrow_mut()
            .apply_label_move_with(mv, graph, ctx)?;
        self.block.borrow_mut().apply_label_move_with(mv, graph, ctx)
    }

    fn check_self_consistency(&self) -> Result<()> {
        let b = self.block.borrow().block_count();
        if self.matrix.len() != b || self.matrix.iter().any(|row| row.len() != b) {
            return Err(LupinError::consistency(
                "EdgeMatrixPrior",
                format!("matrix shape does not match {} blocks", b),
            ));
        }
        let mut total = 0;
        for r in 0..b {
            let mut stubs = 0;
            for s in 0..b {
                if self.matrix[r][s] != self.matrix[s][r] {
                    return Err(LupinError::consistency(
                        "EdgeMatrixPrior",
                        format!("matrix is not symmetric at ({}, {})", r, s),
                    ));
                }
                stubs += self.matrix[r][s];
                if s >= r {
                    total += self.matrix[r][s];
                }
            }
            stubs += self.matrix[r][r];
            if stubs != self.edge_counts[r] {
                return Err(LupinError::consistency(
                    "EdgeMatrixPrior",
                    format!(
                        "block {} has {} edge endpoints but {} recorded",
                        r, stubs, self.edge_counts[r]
                    ),
                ));
            }
        }
        let expected = self.edge_count.borrow().state();
        if total != expected {
            return Err(LupinError::consistency(
                "EdgeMatrixPrior",
                format!("matrix holds {} edges, edge count prior {}", total, expected),
            ));
        }
        self.edge_count.borrow().check_self_consistency()?;
        self.block.borrow().check_self_consistency()
    }

    fn check_safety(&self) -> Result<()> {
        self.edge_count.borrow().check_safety()?;
        self.block.borrow().check_safety()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nested::shared;
    use crate::prior::{
        BlockCountPrior, BlockPriorKind, CountDistribution, PoissonCount, UniformCount,
    };
    use approx::assert_abs_diff_eq;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn setup(
        labels: &[usize],
        graph: &MultiGraph,
        block_count: impl CountDistribution + 'static,
    ) -> (Shared<BlockPrior>, EdgeMatrixPrior) {
        let edge_count = shared(EdgeCountPrior::new(PoissonCount::new(6.0).unwrap()));
        let block_count = shared(BlockCountPrior::new(block_count));
        let block = shared(BlockPrior::new(
            labels.len(),
            BlockPriorKind::UniformHyper,
            block_count,
        ));
        block.borrow_mut().set_labels(labels).unwrap();
        let mut prior = EdgeMatrixPrior::new(EdgeMatrixPriorKind::Uniform, edge_count, block.clone());
        prior.set_graph(graph).unwrap();
        (block, prior)
    }

    fn toy_graph() -> MultiGraph {
        MultiGraph::from_edges(6, &[(0, 1), (1, 2), (2, 2), (2, 3), (3, 4), (4, 5), (4, 5)]).unwrap()
    }

    #[test]
    fn test_matrix_from_graph() {
        let g = toy_graph();
        let (_, prior) = setup(&[0, 0, 1, 1, 2, 2], &g, PoissonCount::new(2.0).unwrap());
        assert_eq!(prior.matrix(), &[vec![1, 1, 0], vec![1, 2, 1], vec![0, 1, 2]]);
        assert_eq!(prior.edge_counts(), &[3, 6, 5]);
        prior.check_self_consistency().unwrap();
        prior.check_against_graph(&g).unwrap();
    }

    #[test]
    fn test_label_moves_track_graph() {
        let g = toy_graph();
        let (block, mut prior) = setup(&[0, 0, 1, 1, 2, 2], &g, PoissonCount::new(2.0).unwrap());
        let moves = [
            LabelMove::new(2, 1, 0, 0),
            LabelMove::new(4, 2, 3, 1),
            LabelMove::new(3, 1, 2, -1),
            LabelMove::birth(1, 0, 1),
        ];
        for mv in moves.iter() {
            let ratio = prior.log_joint_ratio_from_label_move(mv, &g).unwrap();
            let before = prior.log_joint();
            prior.apply_label_move(mv, &g).unwrap();
            prior.check_self_consistency().unwrap();
            prior.check_against_graph(&g).unwrap();
            assert_abs_diff_eq!(prior.log_joint() - before, ratio, epsilon = 1e-10);
        }
        // the fresh block took label 1 and pushed the later ones up
        assert_eq!(block.borrow().labels(), &[0, 1, 0, 2, 3, 2]);
        assert_eq!(block.borrow().block_count(), 4);
    }

    #[test]
    fn test_graph_move_and_negative_counts() {
        let mut g = toy_graph();
        let (_, mut prior) = setup(&[0, 0, 1, 1, 2, 2], &g, PoissonCount::new(2.0).unwrap());
        let mv = GraphMove::new(vec![(4, 5)], vec![(0, 5), (3, 3)]);
        let ratio = prior.log_joint_ratio_from_graph_move(&mv).unwrap();
        let before = prior.log_joint();
        prior.apply_graph_move(&mv).unwrap();
        g.apply_graph_move(&mv).unwrap();
        prior.check_against_graph(&g).unwrap();
        prior.check_self_consistency().unwrap();
        assert_abs_diff_eq!(prior.log_joint() - before, ratio, epsilon = 1e-10);

        let bad = GraphMove::new(vec![(4, 4), (5, 5)], vec![]);
        assert!(prior.apply_graph_move(&bad).is_err());
        prior.check_against_graph(&g).unwrap();
    }

    #[test]
    fn test_sampled_matrix_is_consistent() {
        let g = toy_graph();
        let (_, mut prior) = setup(&[0, 1, 2, 0, 1, 2], &g, UniformCount::new(1, 3).unwrap());
        let mut rng = SmallRng::seed_from_u64(8);
        for _ in 0..20 {
            prior.sample(&mut rng).unwrap();
            prior.check_self_consistency().unwrap();
        }
    }
}
