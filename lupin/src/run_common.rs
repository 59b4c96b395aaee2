use lupin::mcmc::{ConsistencyCheck, GraphProposerKind, InferenceTarget, SweepLogger};
use lupin::prior::{PoissonCount, UniformCount, ZeroTruncatedPoissonCount};
use lupin::random_graph::{DegreeCorrectedSbm, SbmOptions, StochasticBlockModel};

use clap::{Args, ValueEnum};
use indicatif::{ProgressBar, ProgressDrawTarget};
use log::info;
use mcmc_util::{
    ChainCollector, McmcCallback, McmcCounters, MetropolisHastings, MetropolisHastingsTarget,
};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::Serialize;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
#[clap(rename_all = "kebab-case")]
pub enum ProposerArg {
    SingleEdge,
    SingleEdgeDegree,
    HingeFlip,
    HingeFlipDegree,
    DoubleSwap,
}

impl From<ProposerArg> for GraphProposerKind {
    fn from(arg: ProposerArg) -> Self {
        match arg {
            ProposerArg::SingleEdge => GraphProposerKind::SingleEdgeUniform,
            ProposerArg::SingleEdgeDegree => GraphProposerKind::SingleEdgeDegree,
            ProposerArg::HingeFlip => GraphProposerKind::HingeFlipUniform,
            ProposerArg::HingeFlipDegree => GraphProposerKind::HingeFlipDegree,
            ProposerArg::DoubleSwap => GraphProposerKind::DoubleEdgeSwap,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
#[clap(rename_all = "kebab-case")]
pub enum ModelArg {
    /// stochastic block model
    Sbm,
    /// degree-corrected stochastic block model
    Dcsbm,
    /// one-block stochastic block model
    ErdosRenyi,
    /// one-block degree-corrected model
    Configuration,
}

/// Prior hyperparameters shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    #[arg(long, value_enum, default_value = "sbm", help = "Random graph model")]
    pub model: ModelArg,

    #[arg(
        long = "edge-mean",
        default_value_t = 50.0,
        help = "Mean of the Poisson edge count prior"
    )]
    pub edge_mean: f64,

    #[arg(
        long = "block-mean",
        help = "Mean of a zero-truncated Poisson block count prior",
        long_help = "Mean of a zero-truncated Poisson block count prior.\n\
		     If unset, the block count is uniform on 1..=max-blocks\n\
		     (capped by the number of vertices)."
    )]
    pub block_mean: Option<f64>,

    #[arg(long = "max-blocks", default_value_t = 10, help = "Largest block count")]
    pub max_blocks: usize,

    #[arg(long = "simple", default_value_t = false, help = "No self-loops or parallel edges")]
    pub simple: bool,
}

impl ModelArgs {
    pub fn sbm_options(&self) -> SbmOptions {
        SbmOptions {
            with_self_loops: !self.simple,
            with_parallel_edges: !self.simple,
        }
    }

    pub fn sbm(&self, size: usize) -> anyhow::Result<StochasticBlockModel> {
        let edges = PoissonCount::new(self.edge_mean)?;
        let options = self.sbm_options();
        Ok(match (self.model, self.block_mean) {
            (ModelArg::ErdosRenyi, _) => StochasticBlockModel::erdos_renyi(size, edges, options)?,
            (_, Some(mean)) => StochasticBlockModel::uniform(
                size,
                edges,
                ZeroTruncatedPoissonCount::new(mean)?,
                options,
            )?,
            (_, None) => StochasticBlockModel::uniform(
                size,
                edges,
                UniformCount::new(1, self.max_blocks.clamp(1, size.max(1)))?,
                options,
            )?,
        })
    }

    pub fn dcsbm(&self, size: usize) -> anyhow::Result<DegreeCorrectedSbm> {
        let edges = PoissonCount::new(self.edge_mean)?;
        Ok(match (self.model, self.block_mean) {
            (ModelArg::Configuration, _) => DegreeCorrectedSbm::configuration(size, edges)?,
            (_, Some(mean)) => {
                DegreeCorrectedSbm::uniform(size, edges, ZeroTruncatedPoissonCount::new(mean)?)?
            }
            (_, None) => DegreeCorrectedSbm::uniform(
                size,
                edges,
                UniformCount::new(1, self.max_blocks.clamp(1, size.max(1)))?,
            )?,
        })
    }

    pub fn is_degree_corrected(&self) -> bool {
        matches!(self.model, ModelArg::Dcsbm | ModelArg::Configuration)
    }
}

/// Chain layout, seeding and reporting.
#[derive(Args, Debug, Clone)]
pub struct McmcArgs {
    #[arg(long, default_value_t = 100, help = "Number of sweeps per chain")]
    pub sweeps: usize,

    #[arg(long, default_value_t = 100, help = "Metropolis-Hastings steps per sweep")]
    pub burn: usize,

    #[arg(
        long,
        default_value_t = 1,
        help = "Number of independent chains",
        long_help = "Number of independent chains.\n\
		     Chain c is seeded with `seed + c` and owns its own model."
    )]
    pub chains: usize,

    #[arg(long, help = "Maximum number of threads (default: all CPUs)")]
    pub threads: Option<usize>,

    #[arg(long, default_value_t = 42, help = "Random seed")]
    pub seed: u64,

    #[arg(
        long = "check-every",
        default_value_t = 0,
        help = "Verify model consistency every n sweeps (0: never)"
    )]
    pub check_every: usize,

    #[arg(long = "log-every", default_value_t = 10, help = "Log progress every n sweeps")]
    pub log_every: usize,

    #[arg(short, long, required = true, help = "Output header")]
    pub out: Box<str>,

    #[arg(short, long, help = "Verbosity (hides the progress bar)")]
    pub verbose: bool,
}

/// Per-chain output written to `{out}.json`.
#[derive(Serialize, Debug, Clone, Default)]
pub struct ChainSummary {
    pub chain: usize,
    pub seed: u64,
    pub num_steps: usize,
    pub acceptance_rate: f64,
    pub log_joint: Vec<f64>,
    pub block_count: Vec<usize>,
    pub map_labels: Vec<usize>,
    pub final_log_joint: f64,
    pub num_edges: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edge_recovery: Option<f64>,
}

/// Advance a shared progress bar once per sweep.
pub struct ProgressTick {
    pb: ProgressBar,
}

impl<T: MetropolisHastingsTarget> McmcCallback<T> for ProgressTick {
    fn on_sweep_end(&mut self, _counters: &McmcCounters, _target: &T) -> Result<(), T::Error> {
        self.pb.inc(1);
        Ok(())
    }
}

/// Random stream of chain `chain`.
pub fn chain_rng(args: &McmcArgs, chain: usize) -> SmallRng {
    SmallRng::seed_from_u64(args.seed + chain as u64)
}

/// Run one chain on `target` with the standard callbacks, continuing the
/// chain's random stream.
pub fn run_chain<T: InferenceTarget + 'static>(
    target: T,
    args: &McmcArgs,
    chain: usize,
    rng: &mut SmallRng,
    pb: &ProgressBar,
) -> anyhow::Result<(T, ChainSummary)> {
    let seed = args.seed + chain as u64;

    let collector = ChainCollector::new(|t: &T| t.labels(), |t: &T| t.log_joint(), 1);
    let trace = collector.chain();

    let mut mh = MetropolisHastings::new(target);
    mh.insert_callback(Box::new(collector));
    mh.insert_callback(Box::new(ProgressTick { pb: pb.clone() }));
    if args.check_every > 0 {
        mh.insert_callback(Box::new(ConsistencyCheck::new(args.check_every)));
    }
    if args.log_every > 0 && args.verbose {
        mh.insert_callback(Box::new(SweepLogger::new(args.log_every)));
    }

    mh.run(args.sweeps, args.burn, rng)?;

    let counters = mh.counters().clone();
    let target = mh.into_target();
    let trace = trace.borrow();

    let map_labels = match trace.argmax_log_joint() {
        Some(i) => trace.samples[i].clone(),
        None => target.labels(),
    };
    let block_count = trace
        .samples
        .iter()
        .map(|labels| labels.iter().max().map(|&b| b + 1).unwrap_or(0))
        .collect();

    let summary = ChainSummary {
        chain,
        seed,
        num_steps: counters.num_steps,
        acceptance_rate: counters.acceptance_rate(),
        log_joint: trace.log_joints.clone(),
        block_count,
        map_labels,
        final_log_joint: target.log_joint(),
        ..ChainSummary::default()
    };
    Ok((target, summary))
}

/// Run `args.chains` independent chains in parallel.
///
/// `chain_fn` builds and runs a whole component stack for one chain.
pub fn run_chains<F>(args: &McmcArgs, chain_fn: F) -> anyhow::Result<Vec<ChainSummary>>
where
    F: Fn(usize, &ProgressBar) -> anyhow::Result<ChainSummary> + Sync,
{
    if args.chains == 0 {
        anyhow::bail!("need at least one chain");
    }
    let max_threads = args.threads.unwrap_or_else(num_cpus::get).max(1);
    let num_threads = max_threads.min(args.chains);

    let pb = ProgressBar::new((args.sweeps * args.chains) as u64);
    if args.verbose {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    }

    info!("running {} chains on {} threads", args.chains, num_threads);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()?;
    let summaries = pool.install(|| {
        (0..args.chains)
            .into_par_iter()
            .map(|chain| chain_fn(chain, &pb))
            .collect::<anyhow::Result<Vec<_>>>()
    })?;
    pb.finish_and_clear();

    for s in summaries.iter() {
        info!(
            "chain {}: final log-joint {:.4}, acceptance rate {:.3}",
            s.chain, s.final_log_joint, s.acceptance_rate
        );
    }
    Ok(summaries)
}

/// Write `value` as pretty JSON to `{out}.json`.
pub fn write_json<T: Serialize>(out: &str, value: &T) -> anyhow::Result<String> {
    let path = format!("{}.json", out.trim_end_matches(".json"));
    let file = std::fs::File::create(&path)?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), value)?;
    info!("wrote {}", path);
    Ok(path)
}
