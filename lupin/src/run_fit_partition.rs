use crate::run_common::*;

use lupin::graph::MultiGraph;
use lupin::mcmc::{GraphMcmc, GraphMcmcOptions};
use lupin::random_graph::RandomGraph;

use clap::Args;
use indicatif::ProgressBar;
use log::info;

#[derive(Args, Debug)]
pub struct FitPartitionArgs {
    #[arg(
        required = true,
        help = "Edge list file",
        long_help = "Edge list file: one `u v` pair of zero-based vertex\n\
		     indices per line, separated by whitespace.\n\
		     Lines starting with `#` are skipped."
    )]
    edges: Box<str>,

    #[arg(long, short = 'n', help = "Number of vertices (default: largest index + 1)")]
    size: Option<usize>,

    #[arg(long = "p-create", default_value_t = 0.1, help = "Probability of opening a new block")]
    p_create: f64,

    #[command(flatten)]
    model: ModelArgs,

    #[command(flatten)]
    mcmc: McmcArgs,
}

pub fn run_fit_partition(args: &FitPartitionArgs) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&*args.edges)?;
    let graph = MultiGraph::parse_edge_list(&text, args.size)?;
    info!(
        "read {} vertices and {} edges from {}",
        graph.size(),
        graph.total_edge_number(),
        args.edges
    );

    // Observed graph, so only label moves.
    let options = GraphMcmcOptions {
        graph_move_prob: 0.0,
        p_create: args.p_create,
        allow_self_loops: !args.model.simple,
        allow_multiedges: !args.model.simple,
        ..GraphMcmcOptions::default()
    };

    let summaries = run_chains(&args.mcmc, |chain, pb| {
        let observed = graph.clone();
        if args.model.is_degree_corrected() {
            let model = args.model.dcsbm(observed.size())?;
            fit_chain(model, observed, options.clone(), &args.mcmc, chain, pb)
        } else {
            let model = args.model.sbm(observed.size())?;
            fit_chain(model, observed, options.clone(), &args.mcmc, chain, pb)
        }
    })?;

    if let Some(best) = summaries
        .iter()
        .max_by(|a, b| a.final_log_joint.total_cmp(&b.final_log_joint))
    {
        let num_blocks = best.map_labels.iter().max().map(|&b| b + 1).unwrap_or(0);
        info!(
            "best chain {}: {} blocks, final log-joint {:.4}",
            best.chain, num_blocks, best.final_log_joint
        );
    }

    write_json(&args.mcmc.out, &summaries)?;
    Ok(())
}

fn fit_chain<G: RandomGraph + 'static>(
    mut model: G,
    observed: MultiGraph,
    options: GraphMcmcOptions,
    mcmc: &McmcArgs,
    chain: usize,
    pb: &ProgressBar,
) -> anyhow::Result<ChainSummary> {
    let mut rng = chain_rng(mcmc, chain);
    model.sample_priors(&mut rng)?;
    model.set_graph(observed)?;

    let target = GraphMcmc::new(model, options)?;
    let (target, mut summary) = run_chain(target, mcmc, chain, &mut rng, pb)?;
    summary.num_edges = target.model().graph().total_edge_number();
    Ok(summary)
}
