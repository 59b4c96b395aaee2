use crate::error::{LupinError, Result};
use crate::moves::LabelMove;
use crate::prior::BlockPrior;
use rand::{Rng, RngCore};

/// Proposes relabelings of single vertices.
pub trait LabelMoveProposer {
    /// Draw a move from the current partition.
    fn propose_move(&self, block: &BlockPrior, rng: &mut dyn RngCore) -> Result<LabelMove>;

    /// `log q(old | new) - log q(new | old)` for `mv` proposed from `block`.
    fn log_proposal_prob_ratio(&self, mv: &LabelMove, block: &BlockPrior) -> f64;
}

/// Reassigns a uniformly chosen vertex.
///
/// With probability `p_create` the vertex opens a fresh block inserted at a
/// uniformly chosen position among the `B + 1` slots; otherwise it moves to
/// a uniformly chosen existing block (possibly its own, which is a no-op).
/// A singleton asked to open a fresh block stays put.
///
/// Vacated blocks are compacted by shifting larger labels down, so the
/// reverse of a death at block `r` is the birth at position `r`.
#[derive(Debug, Clone, Copy)]
pub struct UniformLabelProposer {
    p_create: f64,
}

impl UniformLabelProposer {
    /// Fails unless `p_create` lies in `[0, 1)`.
    pub fn new(p_create: f64) -> Result<Self> {
        if !(0.0..1.0).contains(&p_create) {
            return Err(LupinError::InvalidParameter(format!(
                "block creation probability must lie in [0, 1), got {}",
                p_create
            )));
        }
        Ok(UniformLabelProposer { p_create })
    }

    /// Probability of opening a fresh block.
    pub fn p_create(&self) -> f64 {
        self.p_create
    }
}

impl LabelMoveProposer for UniformLabelProposer {
    fn propose_move(&self, block: &BlockPrior, rng: &mut dyn RngCore) -> Result<LabelMove> {
        let n = block.size();
        if n == 0 {
            return Err(LupinError::Exhausted {
                proposer: "UniformLabelProposer",
                attempts: 1,
            });
        }
        let v = rng.random_range(0..n);
        let r = block.label_of(v);
        let b = block.block_count();
        let n_r = block.vertex_counts()[r];

        if self.p_create > 0.0 && rng.random::<f64>() < self.p_create {
            if n_r == 1 {
                return Ok(LabelMove::stay(v, r));
            }
            return Ok(LabelMove::birth(v, r, rng.random_range(0..=b)));
        }

        let s = rng.random_range(0..b);
        if s == r {
            return Ok(LabelMove::stay(v, r));
        }
        let added = if n_r == 1 { -1 } else { 0 };
        Ok(LabelMove::new(v, r, s, added))
    }

    fn log_proposal_prob_ratio(&self, mv: &LabelMove, block: &BlockPrior) -> f64 {
        let b = block.block_count() as f64;
        let p = self.p_create;
        match mv.added_labels {
            0 => 0.0,
            // forward: one of B + 1 slots; reverse: one of B + 1 blocks
            1 => ((1.0 - p) / (b + 1.0)).ln() - (p / (b + 1.0)).ln(),
            // forward: one of B blocks; reverse: one of B slots
            _ => (p / b).ln() - ((1.0 - p) / b).ln(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MultiGraph;
    use crate::nested::shared;
    use crate::prior::{BlockCountPrior, BlockPriorKind, Prior, UniformCount};
    use approx::assert_abs_diff_eq;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn block_prior(labels: &[usize]) -> BlockPrior {
        let count = shared(BlockCountPrior::new(UniformCount::new(1, labels.len()).unwrap()));
        let mut block = BlockPrior::new(labels.len(), BlockPriorKind::UniformHyper, count);
        block.set_labels(labels).unwrap();
        block
    }

    #[test]
    fn test_proposed_moves_validate() {
        let mut rng = SmallRng::seed_from_u64(9);
        let block = block_prior(&[0, 0, 1, 2, 2, 2]);
        let proposer = UniformLabelProposer::new(0.2).unwrap();
        let mut births = 0;
        let mut deaths = 0;
        for _ in 0..2000 {
            let mv = proposer.propose_move(&block, &mut rng).unwrap();
            block.validate_label_move(&mv).unwrap();
            match mv.added_labels {
                1 => births += 1,
                -1 => deaths += 1,
                _ => {}
            }
        }
        assert!(births > 0 && deaths > 0);
    }

    #[test]
    fn test_birth_death_corrections_are_inverse() {
        let proposer = UniformLabelProposer::new(0.3).unwrap();
        let mut block = block_prior(&[0, 0, 1]);
        let birth = LabelMove::birth(1, 0, 2);
        let forward = proposer.log_proposal_prob_ratio(&birth, &block);

        block.apply_label_move(&birth, &MultiGraph::new(3)).unwrap();
        let death = LabelMove::new(1, 2, 0, -1);
        let backward = proposer.log_proposal_prob_ratio(&death, &block);
        assert_abs_diff_eq!(forward, -backward, epsilon = 1e-12);
        assert_abs_diff_eq!(forward, 0.7f64.ln() - 0.3f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_death_of_inner_block_is_undone_by_birth() {
        let proposer = UniformLabelProposer::new(0.3).unwrap();
        let graph = MultiGraph::new(4);
        let mut block = block_prior(&[0, 1, 1, 2]);

        // vertex 0 vacates block 0, so blocks 1 and 2 shift down
        let death = LabelMove::new(0, 0, 2, -1);
        let forward = proposer.log_proposal_prob_ratio(&death, &block);
        block.apply_label_move(&death, &graph).unwrap();
        assert_eq!(block.labels(), &[1, 0, 0, 1]);

        let birth = LabelMove::birth(0, 1, 0);
        let backward = proposer.log_proposal_prob_ratio(&birth, &block);
        block.apply_label_move(&birth, &graph).unwrap();
        assert_eq!(block.labels(), &[0, 1, 1, 2]);
        assert_eq!(block.vertex_counts(), &[1, 2, 1]);
        assert_abs_diff_eq!(forward, -backward, epsilon = 1e-12);
    }

    #[test]
    fn test_births_cover_every_slot() {
        let mut rng = SmallRng::seed_from_u64(4);
        let block = block_prior(&[0, 0, 1, 1]);
        let proposer = UniformLabelProposer::new(0.5).unwrap();
        let mut slots = [0usize; 3];
        for _ in 0..3000 {
            let mv = proposer.propose_move(&block, &mut rng).unwrap();
            if mv.is_birth() {
                slots[mv.next_label] += 1;
            }
        }
        assert!(slots.iter().all(|&c| c > 300));
    }

    #[test]
    fn test_single_block_without_creation_is_a_no_op() {
        let mut rng = SmallRng::seed_from_u64(1);
        let block = block_prior(&[0, 0, 0]);
        let proposer = UniformLabelProposer::new(0.0).unwrap();
        for _ in 0..50 {
            assert!(proposer.propose_move(&block, &mut rng).unwrap().is_trivial());
        }
        assert!(UniformLabelProposer::new(1.0).is_err());
    }
}
