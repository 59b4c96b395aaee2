//! Count distributions and the two scalar count priors.

use crate::error::{LupinError, Result};
use crate::graph::MultiGraph;
use crate::moves::{GraphMove, LabelMove};
use crate::nested::{EvalContext, NestedRandomVariable, NodeId};
use crate::prior::Prior;
use crate::util::{
    log_geometric_pmf, log_poisson_pmf, log_uniform_count, log_zero_truncated_poisson_pmf,
};
use rand::{Rng, RngCore};
use rand_distr::{Distribution, Geometric, Poisson};

/// Distribution over non-negative counts.
pub trait CountDistribution: std::fmt::Debug {
    /// Log-probability of `k`.
    fn log_pmf(&self, k: usize) -> f64;

    /// Draw a value.
    fn sample(&self, rng: &mut dyn RngCore) -> Result<usize>;

    /// Fail if a parameter left its domain.
    fn check_safety(&self) -> Result<()>;

    /// `log_pmf(k + delta) - log_pmf(k)`; `-∞` below zero.
    fn log_pmf_ratio(&self, k: usize, delta: isize) -> f64 {
        let next = k as isize + delta;
        if next < 0 {
            return f64::NEG_INFINITY;
        }
        if delta == 0 {
            return 0.0;
        }
        self.log_pmf(next as usize) - self.log_pmf(k)
    }
}

fn check_mean(context: &'static str, mean: f64) -> Result<()> {
    if !(mean.is_finite() && mean >= 0.0) {
        return Err(LupinError::safety(
            context,
            format!("mean must be finite and non-negative, got {}", mean),
        ));
    }
    Ok(())
}

/// Point mass at `value`.
#[derive(Debug, Clone, Copy)]
pub struct DeltaCount {
    /// The only value with positive mass
    pub value: usize,
}

impl DeltaCount {
    /// Point mass at `value`.
    pub fn new(value: usize) -> Self {
        DeltaCount { value }
    }
}

impl CountDistribution for DeltaCount {
    fn log_pmf(&self, k: usize) -> f64 {
        if k == self.value {
            0.0
        } else {
            f64::NEG_INFINITY
        }
    }

    fn sample(&self, _rng: &mut dyn RngCore) -> Result<usize> {
        Ok(self.value)
    }

    fn check_safety(&self) -> Result<()> {
        Ok(())
    }
}

/// Poisson with the given mean.
#[derive(Debug, Clone, Copy)]
pub struct PoissonCount {
    /// Expected count
    pub mean: f64,
}

impl PoissonCount {
    /// Fails unless `mean` is positive.
    pub fn new(mean: f64) -> Result<Self> {
        check_mean("PoissonCount", mean)?;
        Ok(PoissonCount { mean })
    }
}

impl CountDistribution for PoissonCount {
    fn log_pmf(&self, k: usize) -> f64 {
        log_poisson_pmf(k, self.mean)
    }

    fn sample(&self, rng: &mut dyn RngCore) -> Result<usize> {
        if self.mean == 0.0 {
            return Ok(0);
        }
        let pois = Poisson::new(self.mean)
            .map_err(|e| LupinError::safety("PoissonCount", e.to_string()))?;
        let x: f64 = pois.sample(rng);
        Ok(x as usize)
    }

    fn check_safety(&self) -> Result<()> {
        check_mean("PoissonCount", self.mean)
    }
}

/// Poisson conditioned on being positive.
#[derive(Debug, Clone, Copy)]
pub struct ZeroTruncatedPoissonCount {
    /// Mean of the untruncated Poisson
    pub mean: f64,
}

impl ZeroTruncatedPoissonCount {
    /// Fails unless `mean` is positive.
    pub fn new(mean: f64) -> Result<Self> {
        let out = ZeroTruncatedPoissonCount { mean };
        out.check_safety()?;
        Ok(out)
    }
}

impl CountDistribution for ZeroTruncatedPoissonCount {
    fn log_pmf(&self, k: usize) -> f64 {
        log_zero_truncated_poisson_pmf(k, self.mean)
    }

    /// Inverse-cdf walk starting at one.
    fn sample(&self, rng: &mut dyn RngCore) -> Result<usize> {
        let u: f64 = rng.random();
        let mut k = 1;
        let mut p = self.log_pmf(1).exp();
        let mut cum = p;
        while u > cum && p > 0.0 {
            k += 1;
            p *= self.mean / k as f64;
            cum += p;
        }
        Ok(k)
    }

    fn check_safety(&self) -> Result<()> {
        check_mean("ZeroTruncatedPoissonCount", self.mean)?;
        if self.mean == 0.0 {
            return Err(LupinError::safety(
                "ZeroTruncatedPoissonCount",
                "mean must be positive",
            ));
        }
        Ok(())
    }
}

/// Geometric over `{0, 1, ...}` with the given mean.
#[derive(Debug, Clone, Copy)]
pub struct GeometricCount {
    /// Expected count
    pub mean: f64,
}

impl GeometricCount {
    /// Fails unless `mean` is positive.
    pub fn new(mean: f64) -> Result<Self> {
        check_mean("GeometricCount", mean)?;
        Ok(GeometricCount { mean })
    }
}

impl CountDistribution for GeometricCount {
    fn log_pmf(&self, k: usize) -> f64 {
        log_geometric_pmf(k, self.mean)
    }

    fn sample(&self, rng: &mut dyn RngCore) -> Result<usize> {
        let geom = Geometric::new(1.0 / (self.mean + 1.0))
            .map_err(|e| LupinError::safety("GeometricCount", e.to_string()))?;
        let x: u64 = geom.sample(rng);
        Ok(x as usize)
    }

    fn check_safety(&self) -> Result<()> {
        check_mean("GeometricCount", self.mean)
    }
}

/// Uniform over `min..=max`.
#[derive(Debug, Clone, Copy)]
pub struct UniformCount {
    /// Smallest value
    pub min: usize,
    /// Largest value
    pub max: usize,
}

impl UniformCount {
    /// Fails if `min > max`.
    pub fn new(min: usize, max: usize) -> Result<Self> {
        let out = UniformCount { min, max };
        out.check_safety()?;
        Ok(out)
    }
}

impl CountDistribution for UniformCount {
    fn log_pmf(&self, k: usize) -> f64 {
        log_uniform_count(k, self.min, self.max)
    }

    fn sample(&self, rng: &mut dyn RngCore) -> Result<usize> {
        Ok(rng.random_range(self.min..=self.max))
    }

    fn check_safety(&self) -> Result<()> {
        if self.min > self.max {
            return Err(LupinError::safety(
                "UniformCount",
                format!("empty range {}..={}", self.min, self.max),
            ));
        }
        Ok(())
    }
}

/// Prior on the total number of edges `E`.
#[derive(Debug)]
pub struct EdgeCountPrior {
    id: NodeId,
    state: usize,
    distribution: Box<dyn CountDistribution>,
}

impl EdgeCountPrior {
    /// Edge count prior starting at zero.
    pub fn new(distribution: impl CountDistribution + 'static) -> Self {
        EdgeCountPrior {
            id: NodeId::fresh(),
            state: 0,
            distribution: Box::new(distribution),
        }
    }

    /// Current edge count.
    pub fn state(&self) -> usize {
        self.state
    }

    /// Overwrite the edge count.
    pub fn set_state(&mut self, edge_count: usize) {
        self.state = edge_count;
    }

    /// The distribution of `E`.
    pub fn distribution(&self) -> &dyn CountDistribution {
        self.distribution.as_ref()
    }
}

impl NestedRandomVariable for EdgeCountPrior {
    fn node_id(&self) -> NodeId {
        self.id
    }
}

impl Prior for EdgeCountPrior {
    fn sample_state(&mut self, rng: &mut dyn RngCore) -> Result<()> {
        self.state = self.distribution.sample(rng)?;
        Ok(())
    }

    fn sample_priors_with(&mut self, _rng: &mut dyn RngCore, _ctx: &mut EvalContext) -> Result<()> {
        Ok(())
    }

    fn log_likelihood(&self) -> f64 {
        self.distribution.log_pmf(self.state)
    }

    fn log_prior_with(&self, _ctx: &mut EvalContext) -> f64 {
        0.0
    }

    fn log_likelihood_ratio_from_graph_move(&self, mv: &GraphMove) -> Result<f64> {
        let delta = mv.edge_count_diff();
        if (self.state as isize) + delta < 0 {
            return Err(LupinError::consistency(
                "EdgeCountPrior",
                format!("move removes {} edges from {}", -delta, self.state),
            ));
        }
        Ok(self.distribution.log_pmf_ratio(self.state, delta))
    }

    fn log_prior_ratio_from_graph_move_with(
        &self,
        _mv: &GraphMove,
        _ctx: &mut EvalContext,
    ) -> Result<f64> {
        Ok(0.0)
    }

    fn log_likelihood_ratio_from_label_move(
        &self,
        _mv: &LabelMove,
        _graph: &MultiGraph,
    ) -> Result<f64> {
        Ok(0.0)
    }

    fn log_prior_ratio_from_label_move_with(
        &self,
        _mv: &LabelMove,
        _graph: &MultiGraph,
        _ctx: &mut EvalContext,
    ) -> Result<f64> {
        Ok(0.0)
    }

    fn apply_graph_move_to_state(&mut self, mv: &GraphMove) -> Result<()> {
        let next = self.state as isize + mv.edge_count_diff();
        if next < 0 {
            return Err(LupinError::consistency(
                "EdgeCountPrior",
                format!("edge count would become {}", next),
            ));
        }
        self.state = next as usize;
        Ok(())
    }

    fn apply_graph_move_to_priors_with(
        &mut self,
        _mv: &GraphMove,
        _ctx: &mut EvalContext,
    ) -> Result<()> {
        Ok(())
    }

    fn apply_label_move_to_state(
        &mut self,
        _mv: &LabelMove,
        _graph: &MultiGraph,
        _ctx: &EvalContext,
    ) -> Result<()> {
        Ok(())
    }

    fn apply_label_move_to_priors_with(
        &mut self,
        _mv: &LabelMove,
        _graph: &MultiGraph,
        _ctx: &mut EvalContext,
    ) -> Result<()> {
        Ok(())
    }

    fn check_self_consistency(&self) -> Result<()> {
        Ok(())
    }

    fn check_safety(&self) -> Result<()> {
        self.distribution.check_safety()
    }
}

/// Prior on the number of non-empty blocks `B`.
#[derive(Debug)]
pub struct BlockCountPrior {
    id: NodeId,
    state: usize,
    distribution: Box<dyn CountDistribution>,
}

impl BlockCountPrior {
    /// Block count prior starting at one.
    pub fn new(distribution: impl CountDistribution + 'static) -> Self {
        BlockCountPrior {
            id: NodeId::fresh(),
            state: 1,
            distribution: Box::new(distribution),
        }
    }

    /// Current block count.
    pub fn state(&self) -> usize {
        self.state
    }

    /// Overwrite the block count.
    pub fn set_state(&mut self, block_count: usize) {
        self.state = block_count;
    }

    /// The distribution of `B`.
    pub fn distribution(&self) -> &dyn CountDistribution {
        self.distribution.as_ref()
    }
}

impl NestedRandomVariable for BlockCountPrior {
    fn node_id(&self) -> NodeId {
        self.id
    }
}

impl Prior for BlockCountPrior {
    fn sample_state(&mut self, rng: &mut dyn RngCore) -> Result<()> {
        self.state = self.distribution.sample(rng)?;
        Ok(())
    }

    fn sample_priors_with(&mut self, _rng: &mut dyn RngCore, _ctx: &mut EvalContext) -> Result<()> {
        Ok(())
    }

    fn log_likelihood(&self) -> f64 {
        self.distribution.log_pmf(self.state)
    }

    fn log_prior_with(&self, _ctx: &mut EvalContext) -> f64 {
        0.0
    }

    fn log_likelihood_ratio_from_graph_move(&self, _mv: &GraphMove) -> Result<f64> {
        Ok(0.0)
    }

    fn log_prior_ratio_from_graph_move_with(
        &self,
        _mv: &GraphMove,
        _ctx: &mut EvalContext,
    ) -> Result<f64> {
        Ok(0.0)
    }

    fn log_likelihood_ratio_from_label_move(
        &self,
        mv: &LabelMove,
        _graph: &MultiGraph,
    ) -> Result<f64> {
        Ok(self
            .distribution
            .log_pmf_ratio(self.state, mv.added_labels as isize))
    }

    fn log_prior_ratio_from_label_move_with(
        &self,
        _mv: &LabelMove,
        _graph: &MultiGraph,
        _ctx: &mut EvalContext,
    ) -> Result<f64> {
        Ok(0.0)
    }

    fn apply_graph_move_to_state(&mut self, _mv: &GraphMove) -> Result<()> {
        Ok(())
    }

    fn apply_graph_move_to_priors_with(
        &mut self,
        _mv: &GraphMove,
        _ctx: &mut EvalContext,
    ) -> Result<()> {
        Ok(())
    }

    fn apply_label_move_to_state(
        &mut self,
        mv: &LabelMove,
        _graph: &MultiGraph,
        _ctx: &EvalContext,
    ) -> Result<()> {
        let next = self.state as isize + mv.added_labels as isize;
        if next < 0 {
            return Err(LupinError::consistency(
                "BlockCountPrior",
                format!("block count would become {}", next),
            ));
        }
        self.state = next as usize;
        Ok(())
    }

    fn apply_label_move_to_priors_with(
        &mut self,
        _mv: &LabelMove,
        _graph: &MultiGraph,
        _ctx: &mut EvalContext,
    ) -> Result<()> {
        Ok(())
    }

    fn check_self_consistency(&self) -> Result<()> {
        Ok(())
    }

    fn check_safety(&self) -> Result<()> {
        self.distribution.check_safety()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn test_block_count_birth_ratio() {
        let mut prior = BlockCountPrior::new(ZeroTruncatedPoissonCount::new(5.0).unwrap());
        prior.set_state(3);
        let graph = MultiGraph::new(4);
        let mv = LabelMove::new(0, 1, 3, 1);
        let ratio = prior.log_joint_ratio_from_label_move(&mv, &graph).unwrap();
        let expected =
            log_zero_truncated_poisson_pmf(4, 5.0) - log_zero_truncated_poisson_pmf(3, 5.0);
        assert_eq!(ratio, expected);
        assert_abs_diff_eq!(ratio, (5.0f64 / 4.0).ln(), epsilon = 1e-12);

        let before = prior.log_joint();
        prior.apply_label_move(&mv, &graph).unwrap();
        assert_eq!(prior.state(), 4);
        assert_abs_diff_eq!(prior.log_joint() - before, ratio, epsilon = 1e-12);
    }

    #[test]
    fn test_edge_count_cannot_go_negative() {
        let mut prior = EdgeCountPrior::new(PoissonCount::new(3.0).unwrap());
        prior.set_state(1);
        let mv = GraphMove::new(vec![(0, 1), (1, 2)], vec![]);
        assert!(matches!(
            prior.log_joint_ratio_from_graph_move(&mv),
            Err(LupinError::Consistency { .. })
        ));
        assert!(prior.apply_graph_move(&mv).is_err());
        assert_eq!(prior.state(), 1);
    }

    #[test]
    fn test_edge_count_ratio_matches_difference() {
        let mut prior = EdgeCountPrior::new(GeometricCount::new(4.0).unwrap());
        prior.set_state(6);
        let mv = GraphMove::new(vec![(0, 1)], vec![(1, 2), (2, 3)]);
        let ratio = prior.log_joint_ratio_from_graph_move(&mv).unwrap();
        let before = prior.log_joint();
        prior.apply_graph_move(&mv).unwrap();
        assert_eq!(prior.state(), 7);
        assert_abs_diff_eq!(prior.log_joint() - before, ratio, epsilon = 1e-10);
    }

    #[test]
    fn test_count_samplers_stay_in_support() {
        let mut rng = SmallRng::seed_from_u64(17);
        let ztp = ZeroTruncatedPoissonCount::new(0.3).unwrap();
        let unif = UniformCount::new(2, 5).unwrap();
        let mut sum = 0;
        for _ in 0..10_000 {
            let k = ztp.sample(&mut rng).unwrap();
            assert!(k >= 1);
            sum += k;
            let k = unif.sample(&mut rng).unwrap();
            assert!((2..=5).contains(&k));
        }
        // E[k] = μ / (1 - e^{-μ})
        let mean = 0.3 / (1.0 - (-0.3f64).exp());
        assert_abs_diff_eq!(sum as f64 / 10_000.0, mean, epsilon = 0.03);

        assert!(PoissonCount::new(-1.0).is_err());
        assert!(ZeroTruncatedPoissonCount::new(0.0).is_err());
        assert!(UniformCount::new(3, 2).is_err());
        assert_eq!(DeltaCount::new(4).sample(&mut rng).unwrap(), 4);
        assert_eq!(DeltaCount::new(4).log_pmf_ratio(4, 1), f64::NEG_INFINITY);
    }
}
