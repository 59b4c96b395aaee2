use crate::dynamics::{Dynamics, DynamicsLikelihood};
use crate::error::{LupinError, Result};
use crate::mcmc::{check_probability, GraphMcmc, GraphMcmcOptions, InferenceTarget};
use crate::moves::{McmcMove, ParamMove};
use crate::random_graph::RandomGraph;
use mcmc_util::MetropolisHastingsTarget;
use rand::{Rng, RngCore};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Settings of a [`DynamicsMcmc`] chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicsMcmcOptions {
    /// Structural (graph and label) moves
    pub graph: GraphMcmcOptions,
    /// Probability of a parameter move; structural moves otherwise
    pub param_move_prob: f64,
    /// Standard deviation of the random-walk parameter proposals
    pub step_size: f64,
}

impl Default for DynamicsMcmcOptions {
    fn default() -> Self {
        DynamicsMcmcOptions {
            graph: GraphMcmcOptions::default(),
            param_move_prob: 0.1,
            step_size: 0.05,
        }
    }
}

/// Joint sampler of a random graph and the parameters of the dynamics
/// observed on it.
///
/// The posterior is `P(G, θ | X) ∝ P(X | G, θ) P(G)` with a flat prior on
/// each dynamics parameter over its support.
pub struct DynamicsMcmc<G: RandomGraph, D: Dynamics> {
    structure: GraphMcmc<G>,
    likelihood: DynamicsLikelihood<D>,
    param_move_prob: f64,
    step: Normal<f64>,
}

impl<G: RandomGraph, D: Dynamics> DynamicsMcmc<G, D> {
    /// The likelihood is rebuilt against the model's current graph.
    pub fn new(
        model: G,
        mut likelihood: DynamicsLikelihood<D>,
        options: DynamicsMcmcOptions,
    ) -> Result<Self> {
        check_probability("param_move_prob", options.param_move_prob)?;
        if let Some(row) = likelihood.states().first() {
            if row.len() != model.size() {
                return Err(LupinError::InvalidParameter(format!(
                    "trajectory covers {} vertices, graph has {}",
                    row.len(),
                    model.size()
                )));
            }
        }
        let step = Normal::new(0.0, options.step_size).map_err(|e| {
            LupinError::InvalidParameter(format!("step size {}: {}", options.step_size, e))
        })?;
        likelihood.set_graph(model.graph());
        Ok(DynamicsMcmc {
            structure: GraphMcmc::new(model, options.graph)?,
            likelihood,
            param_move_prob: options.param_move_prob,
            step,
        })
    }

    /// The graph model.
    pub fn model(&self) -> &G {
        self.structure.model()
    }

    /// The trajectory likelihood.
    pub fn likelihood(&self) -> &DynamicsLikelihood<D> {
        &self.likelihood
    }

    /// The transition model.
    pub fn dynamics(&self) -> &D {
        self.likelihood.dynamics()
    }
}

impl<G: RandomGraph, D: Dynamics> MetropolisHastingsTarget for DynamicsMcmc<G, D> {
    type Move = McmcMove;
    type Error = LupinError;

    fn propose_move(&mut self, rng: &mut dyn RngCore) -> Result<McmcMove> {
        let num_params = self.likelihood.dynamics().num_parameters();
        if num_params > 0 && rng.random::<f64>() < self.param_move_prob {
            let index = rng.random_range(0..num_params);
            let prev_value = self.likelihood.dynamics().parameters()[index];
            let next_value = prev_value + self.step.sample(rng);
            return Ok(McmcMove::Param(ParamMove {
                index,
                prev_value,
                next_value,
            }));
        }
        self.structure.propose_move(rng)
    }

    fn log_joint_ratio(&self, mv: &McmcMove) -> Result<f64> {
        match mv {
            McmcMove::Graph(graph_move) => {
                let structural = self.structure.log_joint_ratio(mv)?;
                if structural == f64::NEG_INFINITY {
                    return Ok(structural);
                }
                Ok(structural + self.likelihood.log_likelihood_ratio_from_graph_move(graph_move)?)
            }
            McmcMove::Label(_) => self.structure.log_joint_ratio(mv),
            McmcMove::Param(param_move) => {
                Ok(self.likelihood.log_likelihood_ratio_from_param_move(param_move))
            }
        }
    }

    fn log_proposal_prob_ratio(&self, mv: &McmcMove) -> f64 {
        match mv {
            // symmetric random walk
            McmcMove::Param(_) => 0.0,
            _ => self.structure.log_proposal_prob_ratio(mv),
        }
    }

    fn apply_move(&mut self, mv: &McmcMove) -> Result<()> {
        match mv {
            McmcMove::Graph(graph_move) => {
                self.structure.apply_move(mv)?;
                self.likelihood.apply_graph_move(graph_move)
            }
            McmcMove::Label(_) => self.structure.apply_move(mv),
            McmcMove::Param(param_move) => self.likelihood.apply_param_move(param_move),
        }
    }
}

impl<G: RandomGraph, D: Dynamics> InferenceTarget for DynamicsMcmc<G, D> {
    fn log_joint(&self) -> f64 {
        self.structure.log_joint() + self.likelihood.log_likelihood()
    }

    fn labels(&self) -> Vec<usize> {
        self.structure.labels()
    }

    fn check_self_consistency(&self) -> Result<()> {
        self.structure.check_self_consistency()?;
        self.likelihood.check_consistency(self.model().graph())
    }

    fn check_safety(&self) -> Result<()> {
        self.structure.check_safety()?;
        self.likelihood.check_safety()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::SisDynamics;
    use crate::prior::PoissonCount;
    use crate::random_graph::{SbmOptions, StochasticBlockModel};
    use approx::assert_abs_diff_eq;
    use mcmc_util::MetropolisHastings;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn test_accepted_ratios_sum_to_joint_change() {
        let mut rng = SmallRng::seed_from_u64(5);
        let mut model =
            StochasticBlockModel::erdos_renyi(10, PoissonCount::new(12.0).unwrap(), SbmOptions::default())
                .unwrap();
        model.sample(&mut rng).unwrap();
        let sis = SisDynamics::new(0.3, 0.3, 0.05).unwrap();
        let likelihood = DynamicsLikelihood::simulate(sis, model.graph(), None, 15, &mut rng).unwrap();

        let options = DynamicsMcmcOptions {
            param_move_prob: 0.3,
            graph: GraphMcmcOptions {
                graph_move_prob: 1.0,
                ..GraphMcmcOptions::default()
            },
            ..DynamicsMcmcOptions::default()
        };
        let mut target = DynamicsMcmc::new(model, likelihood, options).unwrap();
        let start = target.log_joint();
        let mut accumulated = 0.0;
        for _ in 0..300 {
            let mv = target.propose_move(&mut rng).unwrap();
            let ratio = target.log_joint_ratio(&mv).unwrap();
            if ratio.is_finite() && rng.random::<f64>() < 0.5 {
                target.apply_move(&mv).unwrap();
                accumulated += ratio;
            }
        }
        target.check_self_consistency().unwrap();
        assert_abs_diff_eq!(target.log_joint() - start, accumulated, epsilon = 1e-6);
    }

    #[test]
    fn test_driver_runs_and_keeps_parameters_in_support() {
        let mut rng = SmallRng::seed_from_u64(8);
        let mut model =
            StochasticBlockModel::erdos_renyi(8, PoissonCount::new(8.0).unwrap(), SbmOptions::default())
                .unwrap();
        model.sample(&mut rng).unwrap();
        let sis = SisDynamics::new(0.2, 0.4, 0.1).unwrap();
        let likelihood = DynamicsLikelihood::simulate(sis, model.graph(), None, 10, &mut rng).unwrap();
        let target = DynamicsMcmc::new(model, likelihood, DynamicsMcmcOptions::default()).unwrap();

        let mut mh = MetropolisHastings::new(target);
        mh.run(5, 50, &mut rng).unwrap();
        let target = mh.target();
        target.check_self_consistency().unwrap();
        target.check_safety().unwrap();
        assert!(target
            .dynamics()
            .parameters()
            .iter()
            .all(|p| (0.0..=1.0).contains(p)));
    }
}
