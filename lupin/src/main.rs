mod run_common;
mod run_fit_dynamics;
mod run_fit_partition;
mod run_sample_graph;

use run_fit_dynamics::*;
use run_fit_partition::*;
use run_sample_graph::*;

use clap::{Parser, Subcommand};
use log::info;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "LUPIN",
    long_about = "Bayesian inference of random graphs and network dynamics\n\
		  by incremental Metropolis-Hastings sampling."
)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Sample graphs and partitions from a random graph prior",
        long_about = "Draw a graph from a random graph prior, then explore\n\
		      graphs and block labels with Metropolis-Hastings:\n\
		      (1) sample prior states and a graph\n\
		      (2) run independent chains of graph and label moves\n\
		      (3) write per-sweep traces as JSON.\n"
    )]
    SampleGraph(SampleGraphArgs),

    #[command(
        about = "Infer block labels of an observed graph",
        long_about = "Read an edge list (`u v` per line) and infer the\n\
		      block labels of a (degree-corrected) stochastic block\n\
		      model with the graph held fixed.\n",
        visible_alias = "partition"
    )]
    FitPartition(FitPartitionArgs),

    #[command(
        about = "Reconstruct a graph from dynamics observed on it",
        long_about = "Simulate a binary-state dynamics on a sampled graph,\n\
		      hide the graph, and jointly sample the graph and the\n\
		      dynamics parameters given the trajectory.\n"
    )]
    FitDynamics(FitDynamicsArgs),
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match &cli.commands {
        Commands::SampleGraph(args) => {
            run_sample_graph(args)?;
        }
        Commands::FitPartition(args) => {
            run_fit_partition(args)?;
        }
        Commands::FitDynamics(args) => {
            run_fit_dynamics(args)?;
        }
    }

    info!("Done");
    Ok(())
}
