use crate::error::{LupinError, Result};
use crate::graph::MultiGraph;
use crate::moves::{GraphMove, LabelMove};
use crate::nested::{EvalContext, NestedRandomVariable, NodeId, Shared};
use crate::prior::{BlockCountPrior, Prior};
use crate::util::{log_binomial, log_factorial, sample_strong_composition};
use rand::seq::SliceRandom;
use rand::RngCore;

/// Shape of a [`BlockPrior`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockPriorKind {
    /// Labels are fixed; any real move has probability zero.
    Delta,
    /// Uniform over block sizes given `B`, then uniform over labelings
    /// with those sizes.
    UniformHyper,
}

/// Partition of the vertices into `B` dense labels.
#[derive(Debug)]
pub struct BlockPrior {
    id: NodeId,
    kind: BlockPriorKind,
    labels: Vec<usize>,
    vertex_counts: Vec<usize>,
    block_count: Shared<BlockCountPrior>,
}

impl BlockPrior {
    /// All vertices start in block `0`.
    pub fn new(size: usize, kind: BlockPriorKind, block_count: Shared<BlockCountPrior>) -> Self {
        let vertex_counts = if size > 0 { vec![size] } else { vec![] };
        block_count.borrow_mut().set_state(vertex_counts.len());
        BlockPrior {
            id: NodeId::fresh(),
            kind,
            labels: vec![0; size],
            vertex_counts,
            block_count,
        }
    }

    /// The prior family.
    pub fn kind(&self) -> BlockPriorKind {
        self.kind
    }

    /// Number of vertices.
    pub fn size(&self) -> usize {
        self.labels.len()
    }

    /// Label of every vertex.
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Label of `v`.
    pub fn label_of(&self, v: usize) -> usize {
        self.labels[v]
    }

    /// Number of vertices in each block.
    pub fn vertex_counts(&self) -> &[usize] {
        &self.vertex_counts
    }

    /// Number of non-empty blocks.
    pub fn block_count(&self) -> usize {
        self.vertex_counts.len()
    }

    /// Vertices of each block, in increasing order.
    pub fn members(&self) -> Vec<Vec<usize>> {
        let mut members = vec![vec![]; self.block_count()];
        for (v, &r) in self.labels.iter().enumerate() {
            members[r].push(v);
        }
        members
    }

    /// Handle to the block count this partition depends on.
    pub fn block_count_prior(&self) -> &Shared<BlockCountPrior> {
        &self.block_count
    }

    /// Replace the labels; they are compacted into `0..B` preserving order.
    pub fn set_labels(&mut self, labels: &[usize]) -> Result<()> {
        if labels.len() != self.labels.len() {
            return Err(LupinError::InvalidParameter(format!(
                "expected {} labels, got {}",
                self.labels.len(),
                labels.len()
            )));
        }
        let max = labels.iter().copied().max().map(|m| m + 1).unwrap_or(0);
        let mut remap = vec![usize::MAX; max];
        for &l in labels {
            remap[l] = 0;
        }
        let mut next = 0;
        for r in remap.iter_mut().filter(|r| **r == 0) {
            *r = next;
            next += 1;
        }
        self.labels = labels.iter().map(|&l| remap[l]).collect();
        self.vertex_counts = vec![0; next];
        for &l in self.labels.iter() {
            self.vertex_counts[l] += 1;
        }
        self.block_count.borrow_mut().set_state(next);
        Ok(())
    }

    /// Reject moves that do not match the current partition.
    pub fn validate_label_move(&self, mv: &LabelMove) -> Result<()> {
        if mv.level > 0 {
            return Err(LupinError::safety(
                "BlockPrior",
                format!("label level {} requested from a flat partition", mv.level),
            ));
        }
        if mv.vertex >= self.size() || self.labels[mv.vertex] != mv.prev_label {
            return Err(LupinError::consistency(
                "BlockPrior",
                format!(
                    "vertex {} is not in block {}",
                    mv.vertex, mv.prev_label
                ),
            ));
        }
        if mv.is_trivial() {
            return Ok(());
        }
        let b = self.block_count();
        let n_r = self.vertex_counts[mv.prev_label];
        let valid = match mv.added_labels {
            // a singleton opening a fresh block would only relabel itself
            1 => mv.next_label <= b && n_r > 1,
            0 => mv.next_label < b && n_r > 1,
            -1 => mv.next_label < b && mv.next_label != mv.prev_label && n_r == 1,
            _ => false,
        };
        if !valid {
            return Err(LupinError::consistency(
                "BlockPrior",
                format!(
                    "label move {} -> {} with {} added labels is invalid for {} blocks",
                    mv.prev_label, mv.next_label, mv.added_labels, b
                ),
            ));
        }
        Ok(())
    }

    /// `(n_r, n_s, B')` after `mv`, in pre-compaction indices.
    pub(crate) fn counts_after(&self, mv: &LabelMove) -> (usize, usize, usize) {
        let mv = mv.appended(self.block_count());
        let n_s = self.vertex_counts.get(mv.next_label).copied().unwrap_or(0);
        let n_r = self.vertex_counts[mv.prev_label];
        let b = (self.block_count() as isize + mv.added_labels as isize) as usize;
        (n_r - 1, n_s + 1, b)
    }

    fn log_likelihood_from_counts(&self, block_count: usize) -> f64 {
        let n = self.size();
        if n == 0 {
            return 0.0;
        }
        if block_count == 0 || block_count > n {
            return f64::NEG_INFINITY;
        }
        let log_multinomial = log_factorial(n)
            - self
                .vertex_counts
                .iter()
                .map(|&c| log_factorial(c))
                .sum::<f64>();
        -log_multinomial - log_binomial(n - 1, block_count - 1)
    }
}

impl NestedRandomVariable for BlockPrior {
    fn node_id(&self) -> NodeId {
        self.id
    }
}

impl Prior for BlockPrior {
    fn sample_state(&mut self, rng: &mut dyn RngCore) -> Result<()> {
        match self.kind {
            BlockPriorKind::Delta => Ok(()),
            BlockPriorKind::UniformHyper => {
                let n = self.size();
                let b = self.block_count.borrow().state();
                let counts = sample_strong_composition(n, b, rng)?;
                let mut labels: Vec<usize> = counts
                    .iter()
                    .enumerate()
                    .flat_map(|(r, &c)| std::iter::repeat_n(r, c))
                    .collect();
                labels.shuffle(rng);
                self.labels = labels;
                self.vertex_counts = counts;
                Ok(())
            }
        }
    }

    fn sample_priors_with(&mut self, rng: &mut dyn RngCore, ctx: &mut EvalContext) -> Result<()> {
        self.block_count.borrow_mut().sample_with(rng, ctx)
    }

    fn log_likelihood(&self) -> f64 {
        match self.kind {
            BlockPriorKind::Delta => 0.0,
            BlockPriorKind::UniformHyper => self.log_likelihood_from_counts(self.block_count()),
        }
    }

    fn log_prior_with(&self, ctx: &mut EvalContext) -> f64 {
        self.block_count.borrow().log_joint_with(ctx)
    }

    fn log_likelihood_ratio_from_graph_move(&self, _mv: &GraphMove) -> Result<f64> {
        Ok(0.0)
    }

    fn log_prior_ratio_from_graph_move_with(
        &self,
        mv: &GraphMove,
        ctx: &mut EvalContext,
    ) -> Result<f64> {
        self.block_count
            .borrow()
            .log_joint_ratio_from_graph_move_with(mv, ctx)
    }

    fn log_likelihood_ratio_from_label_move(
        &self,
        mv: &LabelMove,
        _graph: &MultiGraph,
    ) -> Result<f64> {
        self.validate_label_move(mv)?;
        match self.kind {
            BlockPriorKind::Delta => Ok(f64::NEG_INFINITY),
            BlockPriorKind::UniformHyper => {
                let n = self.size();
                let b = self.block_count();
                let (n_r, n_s, next_b) = self.counts_after(mv);
                // only two factorials of the multinomial change
                let delta_multinomial = (n_s as f64).ln() - ((n_r + 1) as f64).ln();
                let delta_composition =
                    log_binomial(n - 1, next_b - 1) - log_binomial(n - 1, b - 1);
                Ok(delta_multinomial - delta_composition)
            }
        }
    }

    fn log_prior_ratio_from_label_move_with(
        &self,
        mv: &LabelMove,
        graph: &MultiGraph,
        ctx: &mut EvalContext,
    ) -> Result<f64> {
        self.block_count
            .borrow()
            .log_joint_ratio_from_label_move_with(mv, graph, ctx)
    }

    fn apply_graph_move_to_state(&mut self, _mv: &GraphMove) -> Result<()> {
        Ok(())
    }

    fn apply_graph_move_to_priors_with(
        &mut self,
        mv: &GraphMove,
        ctx: &mut EvalContext,
    ) -> Result<()> {
        self.block_count.borrow_mut().apply_graph_move_with(mv, ctx)
    }

    fn apply_label_move_to_state(
        &mut self,
        mv: &LabelMove,
        _graph: &MultiGraph,
        _ctx: &EvalContext,
    ) -> Result<()> {
        self.validate_label_move(mv)?;
        let b = self.block_count();
        let position = mv.next_label;
        let mv = mv.appended(b);
        let (r, s) = (mv.prev_label, mv.next_label);
        if mv.is_birth() {
            self.vertex_counts.push(0);
        }
        self.labels[mv.vertex] = s;
        self.vertex_counts[r] -= 1;
        self.vertex_counts[s] += 1;
        if mv.is_birth() && position < b {
            let fresh = self.vertex_counts.remove(b);
            self.vertex_counts.insert(position, fresh);
            self.labels
                .iter_mut()
                .for_each(|l| *l = LabelMove::inserted_label(*l, position, b));
        }
        if mv.added_labels < 0 {
            self.vertex_counts.remove(r);
            self.labels.iter_mut().filter(|l| **l > r).for_each(|l| *l -= 1);
        }
        Ok(())
    }

    fn apply_label_move_to_priors_with(
        &mut self,
        mv: &LabelMove,
        graph: &MultiGraph,
        ctx: &mut EvalContext,
    ) -> Result<()> {
        self.block_count
            .borrow_mut()
            .apply_label_move_with(mv, graph, ctx)
    }

    fn check_self_consistency(&self) -> Result<()> {
        let mut counts = vec![0; self.block_count()];
        for (v, &l) in self.labels.iter().enumerate() {
            if l >= counts.len() {
                return Err(LupinError::consistency(
                    "BlockPrior",
                    format!("vertex {} has label {} outside 0..{}", v, l, counts.len()),
                ));
            }
            counts[l] += 1;
        }
        if counts != self.vertex_counts {
            return Err(LupinError::consistency(
                "BlockPrior",
                format!(
                    "vertex counts {:?} disagree with labels {:?}",
                    self.vertex_counts, counts
                ),
            ));
        }
        if let Some(r) = counts.iter().position(|&c| c == 0) {
            return Err(LupinError::consistency(
                "BlockPrior",
                format!("block {} is empty", r),
            ));
        }
        let expected = self.block_count.borrow().state();
        if expected != self.block_count() {
            return Err(LupinError::consistency(
                "BlockPrior",
                format!(
                    "block count prior holds {} but the partition has {} blocks",
                    expected,
                    self.block_count()
                ),
            ));
        }
        self.block_count.borrow().check_self_consistency()
    }

    fn check_safety(&self) -> Result<()> {
        self.block_count.borrow().check_safety()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nested::shared;
    use crate::prior::{PoissonCount, UniformCount};
    use approx::assert_abs_diff_eq;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn uniform_block_prior(labels: &[usize]) -> BlockPrior {
        let block_count = shared(BlockCountPrior::new(PoissonCount::new(2.0).unwrap()));
        let mut prior = BlockPrior::new(labels.len(), BlockPriorKind::UniformHyper, block_count);
        prior.set_labels(labels).unwrap();
        prior
    }

    #[test]
    fn test_set_labels_compacts() {
        let prior = uniform_block_prior(&[4, 4, 7, 1, 7]);
        assert_eq!(prior.labels(), &[1, 1, 2, 0, 2]);
        assert_eq!(prior.vertex_counts(), &[1, 2, 2]);
        assert_eq!(prior.block_count_prior().borrow().state(), 3);
        prior.check_self_consistency().unwrap();
    }

    #[test]
    fn test_label_move_deltas() {
        let graph = MultiGraph::new(5);
        let moves = [
            LabelMove::new(1, 1, 0, 0),
            LabelMove::new(0, 0, 3, 1),
            LabelMove::new(4, 2, 0, -1),
        ];
        let mut prior = uniform_block_prior(&[0, 1, 1, 0, 2]);
        for mv in moves.iter() {
            let ratio = prior.log_joint_ratio_from_label_move(mv, &graph).unwrap();
            let before = prior.log_joint();
            prior.apply_label_move(mv, &graph).unwrap();
            prior.check_self_consistency().unwrap();
            assert_abs_diff_eq!(prior.log_joint() - before, ratio, epsilon = 1e-10);
        }
        // vertex 4 left block 2 empty, so label 3 shifted down
        assert_eq!(prior.labels(), &[2, 0, 1, 0, 0]);
        assert_eq!(prior.vertex_counts(), &[3, 1, 1]);
    }

    #[test]
    fn test_invalid_moves_are_rejected() {
        let graph = MultiGraph::new(4);
        let mut prior = uniform_block_prior(&[0, 0, 1, 1]);
        let bad = [
            LabelMove::new(0, 1, 0, 0),
            LabelMove::new(0, 0, 1, -1),
            LabelMove::new(0, 0, 2, 0),
        ];
        for mv in bad.iter() {
            assert!(prior.apply_label_move(mv, &graph).is_err());
        }
        let mut nested = LabelMove::new(0, 0, 1, 0);
        nested.level = 1;
        assert!(matches!(
            prior.apply_label_move(&nested, &graph),
            Err(LupinError::Safety { .. })
        ));
        assert_eq!(prior.labels(), &[0, 0, 1, 1]);
    }

    #[test]
    fn test_sampling_gives_dense_partition() {
        let block_count = shared(BlockCountPrior::new(UniformCount::new(1, 4).unwrap()));
        let mut prior = BlockPrior::new(10, BlockPriorKind::UniformHyper, block_count);
        let mut rng = SmallRng::seed_from_u64(2);
        for _ in 0..50 {
            prior.sample(&mut rng).unwrap();
            prior.check_self_consistency().unwrap();
            assert!(prior.log_joint().is_finite());
        }
    }
}
