use crate::run_common::*;

use lupin::dynamics::{Dynamics, DynamicsLikelihood, GlauberDynamics, SisDynamics};
use lupin::graph::MultiGraph;
use lupin::mcmc::{DynamicsMcmc, DynamicsMcmcOptions, GraphMcmcOptions};
use lupin::random_graph::RandomGraph;

use clap::{Args, ValueEnum};
use indicatif::ProgressBar;
use log::info;
use rand::rngs::SmallRng;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
#[clap(rename_all = "lowercase")]
pub enum DynamicsArg {
    /// heat-bath Ising spins
    Glauber,
    /// susceptible-infected-susceptible epidemic
    Sis,
}

#[derive(Args, Debug)]
pub struct FitDynamicsArgs {
    #[arg(long, short = 'n', default_value_t = 30, help = "Number of vertices")]
    size: usize,

    #[arg(long, value_enum, default_value = "glauber", help = "Dynamics on the graph")]
    dynamics: DynamicsArg,

    #[arg(long = "num-steps", default_value_t = 100, help = "Length of the trajectory")]
    num_steps: usize,

    #[arg(long, default_value_t = 0.5, help = "Glauber coupling")]
    coupling: f64,

    #[arg(long, default_value_t = 0.3, help = "SIS infection probability per infected neighbor")]
    infection: f64,

    #[arg(long, default_value_t = 0.2, help = "SIS recovery probability")]
    recovery: f64,

    #[arg(
        long = "auto-infection",
        default_value_t = 0.01,
        help = "SIS spontaneous infection probability"
    )]
    auto_infection: f64,

    #[arg(
        long,
        value_enum,
        default_value = "hinge-flip",
        help = "Graph move proposer"
    )]
    proposer: ProposerArg,

    #[arg(
        long = "param-move-prob",
        default_value_t = 0.1,
        help = "Probability of a parameter move"
    )]
    param_move_prob: f64,

    #[arg(
        long = "step-size",
        default_value_t = 0.05,
        help = "Standard deviation of parameter proposals"
    )]
    step_size: f64,

    #[command(flatten)]
    model: ModelArgs,

    #[command(flatten)]
    mcmc: McmcArgs,
}

impl FitDynamicsArgs {
    fn options(&self) -> DynamicsMcmcOptions {
        DynamicsMcmcOptions {
            graph: GraphMcmcOptions {
                graph_proposer: self.proposer.into(),
                allow_self_loops: !self.model.simple,
                allow_multiedges: !self.model.simple,
                ..GraphMcmcOptions::default()
            },
            param_move_prob: self.param_move_prob,
            step_size: self.step_size,
        }
    }
}

pub fn run_fit_dynamics(args: &FitDynamicsArgs) -> anyhow::Result<()> {
    match args.dynamics {
        DynamicsArg::Glauber => fit_with(GlauberDynamics::new(args.coupling)?, args),
        DynamicsArg::Sis => fit_with(
            SisDynamics::new(args.infection, args.recovery, args.auto_infection)?,
            args,
        ),
    }
}

/// Simulate `dynamics` on a sampled graph, then infer both back.
fn fit_with<D: Dynamics + Sync + 'static>(dynamics: D, args: &FitDynamicsArgs) -> anyhow::Result<()> {
    // the stream right after the last chain's
    let mut rng = chain_rng(&args.mcmc, args.mcmc.chains);

    let true_graph = if args.model.is_degree_corrected() {
        sample_truth(args.model.dcsbm(args.size)?, &mut rng)?
    } else {
        sample_truth(args.model.sbm(args.size)?, &mut rng)?
    };
    let trajectory =
        DynamicsLikelihood::simulate(dynamics.clone(), &true_graph, None, args.num_steps, &mut rng)?;
    let states = trajectory.states().to_vec();
    info!(
        "simulated {:?} for {} steps on a graph with {} edges",
        dynamics,
        args.num_steps,
        true_graph.total_edge_number()
    );

    let summaries = run_chains(&args.mcmc, |chain, pb| {
        let likelihood = |graph: &MultiGraph| {
            DynamicsLikelihood::new(dynamics.clone(), states.clone(), graph)
        };
        if args.model.is_degree_corrected() {
            let model = args.model.dcsbm(args.size)?;
            fit_chain(model, likelihood, args, &true_graph, chain, pb)
        } else {
            let model = args.model.sbm(args.size)?;
            fit_chain(model, likelihood, args, &true_graph, chain, pb)
        }
    })?;

    for s in summaries.iter() {
        info!(
            "chain {}: parameters {:?}, edge recovery {:.3}",
            s.chain,
            s.parameters.as_deref().unwrap_or_default(),
            s.edge_recovery.unwrap_or_default()
        );
    }

    write_json(&args.mcmc.out, &summaries)?;
    Ok(())
}

fn sample_truth<G: RandomGraph>(mut model: G, rng: &mut SmallRng) -> anyhow::Result<MultiGraph> {
    model.sample(rng)?;
    Ok(model.graph().clone())
}

fn fit_chain<G, D, L>(
    mut model: G,
    likelihood: L,
    args: &FitDynamicsArgs,
    true_graph: &MultiGraph,
    chain: usize,
    pb: &ProgressBar,
) -> anyhow::Result<ChainSummary>
where
    G: RandomGraph + 'static,
    D: Dynamics + 'static,
    L: Fn(&MultiGraph) -> lupin::Result<DynamicsLikelihood<D>>,
{
    let mut rng = chain_rng(&args.mcmc, chain);
    model.sample(&mut rng)?;
    let likelihood = likelihood(model.graph())?;

    let target = DynamicsMcmc::new(model, likelihood, args.options())?;
    let (target, mut summary) = run_chain(target, &args.mcmc, chain, &mut rng, pb)?;

    let graph = target.model().graph();
    summary.num_edges = graph.total_edge_number();
    summary.parameters = Some(target.dynamics().parameters());
    summary.edge_recovery = Some(edge_recovery(true_graph, graph));
    Ok(summary)
}

/// Fraction of the true edges (with multiplicity) present in `inferred`.
fn edge_recovery(truth: &MultiGraph, inferred: &MultiGraph) -> f64 {
    let total = truth.total_edge_number();
    if total == 0 {
        return 1.0;
    }
    let found: usize = truth
        .edges()
        .map(|((u, v), m)| m.min(inferred.edge_multiplicity(u, v)))
        .sum();
    found as f64 / total as f64
}
