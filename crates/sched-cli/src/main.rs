//! Command-line driver for the `sched-core` replay simulator.
//!
//! Loads a workload trace, a cluster shape, and an algorithm-config file,
//! picks a policy and a set of pluggable parts (estimator/submitter/share
//! assigner), runs one `Simulator` to completion, and writes the §6 event
//! stream plus a final diagnostic summary.

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::io::Write;

use sched_core::accounting::{
    AverageOfLastNEstimator, ConstantTimeSubmitter, DefaultEstimator, DefaultTimeSubmitter, Estimator,
    EqualShare, OracleSubmitter, ShareAssigner, Submitter,
};
use sched_core::policy::Policy;
use sched_core::timeline::NodeMap;
use sched_core::{AlgoConfig, JobInput, RunOutput, Simulator};
use sched_workload::{load_custom_shares, open_writer, read_jobs, AlgoConfigFile, ClusterConfig, WorkloadFormat};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PolicyArg {
    Ostrich,
    Fairshare,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatArg {
    Jsonl,
    Swf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EstimatorArg {
    Default,
    AverageN,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SubmitterArg {
    Oracle,
    FromWorkload,
    Constant,
}

/// Replay a recorded batch workload through the OStrich/Fairshare
/// discrete-event simulator core.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Workload trace path. `-` reads stdin; a `.gz` extension is
    /// transparently decompressed.
    #[arg(long)]
    workload: String,

    #[arg(long, value_enum, default_value_t = FormatArg::Jsonl)]
    workload_format: FormatArg,

    /// Cluster shape: TOML `cpus = N` or a `[nodes]` table of `node_id =
    /// cpu_count` entries.
    #[arg(long)]
    cluster: String,

    /// Algorithmic knobs: TOML `threshold`, `decay`, `bf_depth`,
    /// `bf_window`, `bf_interval`, optional `core_window = [start, end]`.
    #[arg(long = "algo-config")]
    algo_config: String,

    #[arg(long, value_enum)]
    policy: PolicyArg,

    /// Optional `user_id = share_weight` TOML table; users not listed
    /// default to a weight of 1.0. Omit for equal shares.
    #[arg(long)]
    shares: Option<String>,

    #[arg(long, value_enum, default_value_t = EstimatorArg::Default)]
    estimator: EstimatorArg,

    /// History window for `--estimator average-n`.
    #[arg(long, default_value_t = 5)]
    estimator_window: usize,

    #[arg(long, value_enum, default_value_t = SubmitterArg::FromWorkload)]
    submitter: SubmitterArg,

    /// Time limit (seconds) used by `--submitter constant`.
    #[arg(long, default_value_t = 86_400)]
    submitter_constant: i64,

    /// Event-stream output path. `-` writes stdout; a `.gz` extension is
    /// transparently compressed.
    #[arg(long, default_value = "-")]
    output: String,

    /// Emit the final diagnostic summary as JSON instead of plain text.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();

    log::info!("loading workload from {}", cli.workload);
    let format = match cli.workload_format {
        FormatArg::Jsonl => WorkloadFormat::Jsonl,
        FormatArg::Swf => WorkloadFormat::Swf,
    };
    let records = read_jobs(&cli.workload, format).with_context(|| format!("reading workload {}", cli.workload))?;
    if records.is_empty() {
        bail!("workload {} contained no jobs", cli.workload);
    }

    let cluster =
        ClusterConfig::load(&cli.cluster).with_context(|| format!("reading cluster config {}", cli.cluster))?;
    let cluster_scalar = cluster.resolve_scalar(&records).ok();

    let jobs: Vec<JobInput> = records.into_iter().map(|r| r.into_job_input()).collect();
    log::info!("{} jobs loaded", jobs.len());
    let algo_config: AlgoConfig = AlgoConfigFile::load(&cli.algo_config)
        .with_context(|| format!("reading algorithm config {}", cli.algo_config))?
        .into_algo_config();

    let policy = match cli.policy {
        PolicyArg::Ostrich => Policy::OStrich,
        PolicyArg::Fairshare => Policy::Fairshare,
    };

    let shares: Box<dyn ShareAssigner> = match &cli.shares {
        Some(path) => {
            Box::new(load_custom_shares(path).with_context(|| format!("reading share table {path}"))?)
        }
        None => Box::new(EqualShare),
    };

    let estimator: Box<dyn Estimator> = match cli.estimator {
        EstimatorArg::Default => Box::new(DefaultEstimator),
        EstimatorArg::AverageN => Box::new(AverageOfLastNEstimator::new(cli.estimator_window)),
    };

    let submitter: Box<dyn Submitter> = match cli.submitter {
        SubmitterArg::Oracle => Box::new(OracleSubmitter),
        SubmitterArg::FromWorkload => Box::new(DefaultTimeSubmitter),
        SubmitterArg::Constant => Box::new(ConstantTimeSubmitter::new(cli.submitter_constant)),
    };

    let output = match cluster_scalar {
        Some(scalar) => {
            log::info!("cluster sized at {} cpus", scalar.0);
            run_simulation(jobs, scalar, policy, algo_config, estimator, submitter.as_ref(), shares.as_ref())?
        }
        None => {
            let vector = cluster.as_vector().expect("a Nodes cluster config always yields a vector");
            run_simulation(jobs, vector, policy, algo_config, estimator, submitter.as_ref(), shares.as_ref())?
        }
    };

    let mut writer = open_writer(&cli.output).with_context(|| format!("opening output {}", cli.output))?;
    for record in &output.records {
        writeln!(writer, "{record}").with_context(|| format!("writing to {}", cli.output))?;
    }
    writer.close().with_context(|| format!("closing {}", cli.output))?;

    print_summary(&output, cli.json)?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_simulation<M: NodeMap>(
    jobs: Vec<JobInput>,
    cluster_total: M,
    policy: Policy,
    config: AlgoConfig,
    estimator: Box<dyn Estimator>,
    submitter: &dyn Submitter,
    shares: &dyn ShareAssigner,
) -> Result<RunOutput> {
    let job_count = jobs.len();
    let sim = Simulator::new(jobs, Vec::new(), cluster_total, policy, config, estimator, submitter, shares)
        .context("constructing simulator")?;
    log::info!("starting simulation of {job_count} jobs");
    let output = sim.run().context("running simulation")?;
    log::info!(
        "simulation finished: {} started/schedule, {} started/backfill, {} infeasible skipped",
        output.diagnostics.started_by_schedule,
        output.diagnostics.started_by_backfill,
        output.diagnostics.jobs_skipped_infeasible
    );
    Ok(output)
}

fn print_summary(output: &RunOutput, json: bool) -> Result<()> {
    let d = &output.diagnostics;
    if json {
        let summary = serde_json::json!({
            "jobs_skipped_infeasible": d.jobs_skipped_infeasible,
            "forced_decay_events": d.forced_decay_events,
            "schedule_passes": d.schedule_passes,
            "backfill_passes": d.backfill_passes,
            "started_by_schedule": d.started_by_schedule,
            "started_by_backfill": d.started_by_backfill,
            "mean_utilization": d.mean_utilization(),
            "wall_clock_span": d.wall_clock_span,
        });
        println!("{summary}");
    } else {
        println!(
            "DIAG skipped={} forced_decay={} schedule_passes={} backfill_passes={} started_schedule={} started_backfill={} mean_util={:.4} wall_clock={}",
            d.jobs_skipped_infeasible,
            d.forced_decay_events,
            d.schedule_passes,
            d.backfill_passes,
            d.started_by_schedule,
            d.started_by_backfill,
            d.mean_utilization(),
            d.wall_clock_span,
        );
    }
    Ok(())
}
