use crate::run_common::*;

use lupin::mcmc::{GraphMcmc, GraphMcmcOptions};
use lupin::random_graph::RandomGraph;

use clap::Args;
use indicatif::ProgressBar;
use log::info;

#[derive(Args, Debug)]
pub struct SampleGraphArgs {
    #[arg(long, short = 'n', default_value_t = 30, help = "Number of vertices")]
    size: usize,

    #[arg(
        long,
        value_enum,
        default_value = "hinge-flip",
        help = "Graph move proposer"
    )]
    proposer: ProposerArg,

    #[arg(
        long = "graph-move-prob",
        default_value_t = 0.5,
        help = "Probability of a graph move (label moves otherwise)"
    )]
    graph_move_prob: f64,

    #[arg(long = "p-create", default_value_t = 0.1, help = "Probability of opening a new block")]
    p_create: f64,

    #[arg(
        long = "degree-shift",
        default_value_t = 1.0,
        help = "Shift added to degrees by degree-biased proposers"
    )]
    degree_shift: f64,

    #[command(flatten)]
    model: ModelArgs,

    #[command(flatten)]
    mcmc: McmcArgs,
}

impl SampleGraphArgs {
    fn options(&self) -> GraphMcmcOptions {
        GraphMcmcOptions {
            graph_move_prob: self.graph_move_prob,
            graph_proposer: self.proposer.into(),
            degree_shift: self.degree_shift,
            p_create: self.p_create,
            allow_self_loops: !self.model.simple,
            allow_multiedges: !self.model.simple,
        }
    }
}

pub fn run_sample_graph(args: &SampleGraphArgs) -> anyhow::Result<()> {
    info!(
        "sampling {:?} graphs on {} vertices ({} chains)",
        args.model.model, args.size, args.mcmc.chains
    );

    let summaries = run_chains(&args.mcmc, |chain, pb| {
        if args.model.is_degree_corrected() {
            sample_chain(args.model.dcsbm(args.size)?, args, chain, pb)
        } else {
            sample_chain(args.model.sbm(args.size)?, args, chain, pb)
        }
    })?;

    write_json(&args.mcmc.out, &summaries)?;
    Ok(())
}

/// Draw a prior state and graph, then explore from there.
fn sample_chain<G: RandomGraph + 'static>(
    mut model: G,
    args: &SampleGraphArgs,
    chain: usize,
    pb: &ProgressBar,
) -> anyhow::Result<ChainSummary> {
    let mut rng = chain_rng(&args.mcmc, chain);
    model.sample(&mut rng)?;
    info!(
        "chain {}: initial graph with {} edges, {} blocks",
        chain,
        model.graph().total_edge_number(),
        model.block_count()
    );

    let target = GraphMcmc::new(model, args.options())?;
    let (target, mut summary) = run_chain(target, &args.mcmc, chain, &mut rng, pb)?;
    summary.num_edges = target.model().graph().total_edge_number();
    Ok(summary)
}
