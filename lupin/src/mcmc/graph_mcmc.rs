use crate::error::{LupinError, Result};
use crate::graph::MultiGraph;
use crate::mcmc::{build_graph_proposer, check_probability, GraphProposerKind, InferenceTarget};
use crate::moves::McmcMove;
use crate::proposer::{GraphMoveProposer, LabelMoveProposer, UniformLabelProposer};
use crate::random_graph::RandomGraph;
use mcmc_util::MetropolisHastingsTarget;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

/// Settings of a [`GraphMcmc`] chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphMcmcOptions {
    /// Probability of a graph move; label moves otherwise
    pub graph_move_prob: f64,
    /// Proposer for graph moves
    pub graph_proposer: GraphProposerKind,
    /// Additive weight of the degree-biased vertex samplers
    pub degree_shift: f64,
    /// Probability that a label move opens a fresh block
    pub p_create: f64,
    /// Whether proposals may create self-loops
    pub allow_self_loops: bool,
    /// Whether proposals may create multi-edges
    pub allow_multiedges: bool,
}

impl Default for GraphMcmcOptions {
    fn default() -> Self {
        GraphMcmcOptions {
            graph_move_prob: 0.5,
            graph_proposer: GraphProposerKind::HingeFlipUniform,
            degree_shift: 1.0,
            p_create: 0.1,
            allow_self_loops: true,
            allow_multiedges: true,
        }
    }
}

/// Samples the graph and the latent block structure of a random graph model.
pub struct GraphMcmc<G: RandomGraph> {
    model: G,
    graph_proposer: Box<dyn GraphMoveProposer>,
    label_proposer: UniformLabelProposer,
    options: GraphMcmcOptions,
}

impl<G: RandomGraph> GraphMcmc<G> {
    /// Fails on an out-of-range probability or shift.
    pub fn new(model: G, options: GraphMcmcOptions) -> Result<Self> {
        check_probability("graph_move_prob", options.graph_move_prob)?;
        let mut graph_proposer = build_graph_proposer(
            options.graph_proposer,
            options.degree_shift,
            options.allow_self_loops,
            options.allow_multiedges,
        )?;
        graph_proposer.set_up(model.graph());
        let label_proposer = UniformLabelProposer::new(options.p_create)?;
        Ok(GraphMcmc {
            model,
            graph_proposer,
            label_proposer,
            options,
        })
    }

    /// The model being sampled.
    pub fn model(&self) -> &G {
        &self.model
    }

    /// Give back the model.
    pub fn into_model(self) -> G {
        self.model
    }

    /// The chain settings.
    pub fn options(&self) -> &GraphMcmcOptions {
        &self.options
    }

    /// Inject a graph and rebuild the proposer around it.
    pub fn set_graph(&mut self, graph: MultiGraph) -> Result<()> {
        self.model.set_graph(graph)?;
        self.graph_proposer.set_up(self.model.graph());
        Ok(())
    }

    /// Overwrite the partition.
    pub fn set_labels(&mut self, labels: &[usize]) -> Result<()> {
        self.model.set_labels(labels)
    }
}

impl<G: RandomGraph> MetropolisHastingsTarget for GraphMcmc<G> {
    type Move = McmcMove;
    type Error = LupinError;

    fn propose_move(&mut self, rng: &mut dyn RngCore) -> Result<McmcMove> {
        if rng.random::<f64>() < self.options.graph_move_prob {
            let mv = self.graph_proposer.propose_move(self.model.graph(), rng)?;
            Ok(McmcMove::Graph(mv))
        } else {
            let block = self.model.block_prior().borrow();
            let mv = self.label_proposer.propose_move(&block, rng)?;
            Ok(McmcMove::Label(mv))
        }
    }

    fn log_joint_ratio(&self, mv: &McmcMove) -> Result<f64> {
        match mv {
            McmcMove::Graph(mv) => self.model.log_joint_ratio_from_graph_move(mv),
            McmcMove::Label(mv) => self.model.log_joint_ratio_from_label_move(mv),
            McmcMove::Param(_) => Err(LupinError::safety(
                "GraphMcmc",
                "parameter moves need a dynamics model",
            )),
        }
    }

    fn log_proposal_prob_ratio(&self, mv: &McmcMove) -> f64 {
        match mv {
            McmcMove::Graph(mv) => self
                .graph_proposer
                .log_proposal_prob_ratio(mv, self.model.graph()),
            McmcMove::Label(mv) => {
                let block = self.model.block_prior().borrow();
                self.label_proposer.log_proposal_prob_ratio(mv, &block)
            }
            McmcMove::Param(_) => f64::NEG_INFINITY,
        }
    }

    fn apply_move(&mut self, mv: &McmcMove) -> Result<()> {
        match mv {
            McmcMove::Graph(mv) => {
                // model and proposer must fail together or not at all
                self.model.graph().check_graph_move(mv)?;
                self.model.apply_graph_move(mv)?;
                self.graph_proposer.apply_graph_move(mv)
            }
            McmcMove::Label(mv) => self.model.apply_label_move(mv),
            McmcMove::Param(_) => Err(LupinError::safety(
                "GraphMcmc",
                "parameter moves need a dynamics model",
            )),
        }
    }
}

impl<G: RandomGraph> InferenceTarget for GraphMcmc<G> {
    fn log_joint(&self) -> f64 {
        self.model.log_joint()
    }

    fn labels(&self) -> Vec<usize> {
        self.model.labels()
    }

    fn check_self_consistency(&self) -> Result<()> {
        self.model.check_self_consistency()
    }

    fn check_safety(&self) -> Result<()> {
        self.model.check_safety()
    }
}
