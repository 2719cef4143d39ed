//! Round-robin parallel dispatch of (block x policy) `sched-core` runs.
//!
//! Grounded on `tools::bin::tournament`'s worker-pool shape: a bounded
//! rendezvous `crossbeam-channel` pair, a fixed-size pool of `std::thread`
//! workers, and periodic progress reporting. Nothing inside a single
//! `Simulator::run()` is ever touched by more than one thread; only the
//! ticket (which block, which policy) and the finished diagnostic summary
//! cross a channel.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use crossbeam_channel as chan;

use sched_core::accounting::{
    AverageOfLastNEstimator, ConstantTimeSubmitter, DefaultEstimator, DefaultTimeSubmitter, Estimator,
    EqualShare, OracleSubmitter, ShareAssigner, Submitter,
};
use sched_core::policy::Policy;
use sched_core::timeline::NodeMap;
use sched_core::{AlgoConfig, JobInput, Simulator};
use sched_workload::{load_custom_shares, open_writer, read_jobs, tag_block, AlgoConfigFile, ClusterConfig, WorkloadFormat};

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
enum PolicyArg {
    Ostrich,
    Fairshare,
}

impl From<PolicyArg> for Policy {
    fn from(p: PolicyArg) -> Self {
        match p {
            PolicyArg::Ostrich => Policy::OStrich,
            PolicyArg::Fairshare => Policy::Fairshare,
        }
    }
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

/// Fan a workload trace out across a bounded worker pool, one `Simulator`
/// run per (block, policy) pair, and collect per-run diagnostics into a
/// single JSONL report.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[arg(long)]
    workload: String,

    #[arg(long, value_enum, default_value_t = FormatArg::Jsonl)]
    workload_format: FormatArg,

    #[arg(long)]
    cluster: String,

    #[arg(long = "algo-config")]
    algo_config: String,

    /// Policies to run each block through; repeatable. Defaults to both.
    #[arg(long = "policy", value_enum)]
    policies: Vec<PolicyArg>,

    #[arg(long)]
    shares: Option<String>,

    #[arg(long, value_enum, default_value_t = EstimatorArg::Default)]
    estimator: EstimatorArg,

    #[arg(long, default_value_t = 5)]
    estimator_window: usize,

    #[arg(long, value_enum, default_value_t = SubmitterArg::FromWorkload)]
    submitter: SubmitterArg,

    #[arg(long, default_value_t = 86_400)]
    submitter_constant: i64,

    /// Split the trace into fixed-length blocks of this many seconds;
    /// `0` runs the whole trace as a single block.
    #[arg(long, default_value_t = 0)]
    block_time: i64,

    /// Warm-up/cool-down margin (seconds) added on each side of a block's
    /// core window.
    #[arg(long, default_value_t = 0)]
    block_margin: i64,

    /// Number of concurrent worker threads.
    #[arg(long, default_value_t = 1)]
    concurrency: usize,

    /// Print progress after this many completed runs.
    #[arg(long, default_value_t = 1)]
    report_interval: u32,

    /// Directory to write each run's event stream and the final report.
    #[arg(long)]
    out_dir: PathBuf,
}

#[derive(Clone)]
enum EstimatorKind {
    Default,
    AverageN(usize),
}

impl EstimatorKind {
    fn build(&self) -> Box<dyn Estimator> {
        match self {
            EstimatorKind::Default => Box::new(DefaultEstimator),
            EstimatorKind::AverageN(n) => Box::new(AverageOfLastNEstimator::new(*n)),
        }
    }
}

struct Ticket<M> {
    block_index: usize,
    policy: PolicyArg,
    core_window: (i64, i64),
    jobs: Vec<JobInput>,
    /// Resolved per-ticket, since a `percentile`-sized cluster is sized
    /// from each block's own concurrent offered load rather than shared
    /// across the whole trace.
    cluster_total: M,
}

struct RunResult {
    block_index: usize,
    policy: PolicyArg,
    summary: serde_json::Value,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    if cli.concurrency == 0 {
        bail!("--concurrency must be at least 1");
    }

    let format = match cli.workload_format {
        FormatArg::Jsonl => WorkloadFormat::Jsonl,
        FormatArg::Swf => WorkloadFormat::Swf,
    };
    let records = read_jobs(&cli.workload, format).with_context(|| format!("reading workload {}", cli.workload))?;
    if records.is_empty() {
        bail!("workload {} contained no jobs", cli.workload);
    }

    let blocks = tag_block(&records, cli.block_time, cli.block_margin);
    log::info!("{} jobs split into {} block(s)", records.len(), blocks.len());

    let policies: Vec<PolicyArg> = if cli.policies.is_empty() {
        vec![PolicyArg::Ostrich, PolicyArg::Fairshare]
    } else {
        cli.policies.clone()
    };

    let cluster =
        ClusterConfig::load(&cli.cluster).with_context(|| format!("reading cluster config {}", cli.cluster))?;
    let algo_template: AlgoConfig = AlgoConfigFile::load(&cli.algo_config)
        .with_context(|| format!("reading algorithm config {}", cli.algo_config))?
        .into_algo_config();

    let shares: Arc<dyn ShareAssigner + Send + Sync> = match &cli.shares {
        Some(path) => Arc::new(load_custom_shares(path).with_context(|| format!("reading share table {path}"))?),
        None => Arc::new(EqualShare),
    };
    let submitter: Arc<dyn Submitter + Send + Sync> = match cli.submitter {
        SubmitterArg::Oracle => Arc::new(OracleSubmitter),
        SubmitterArg::FromWorkload => Arc::new(DefaultTimeSubmitter),
        SubmitterArg::Constant => Arc::new(ConstantTimeSubmitter::new(cli.submitter_constant)),
    };
    let estimator_kind = match cli.estimator {
        EstimatorArg::Default => EstimatorKind::Default,
        EstimatorArg::AverageN => EstimatorKind::AverageN(cli.estimator_window),
    };

    std::fs::create_dir_all(&cli.out_dir).with_context(|| format!("creating {}", cli.out_dir.display()))?;

    if matches!(cluster, ClusterConfig::Single { .. } | ClusterConfig::Percentile { .. }) {
        let mut tickets = Vec::with_capacity(blocks.len() * policies.len());
        for block in &blocks {
            let jobs: Vec<JobInput> = block.jobs.iter().cloned().map(|r| r.into_job_input()).collect();
            let cluster_total = cluster
                .resolve_scalar(&block.jobs)
                .with_context(|| format!("resolving cluster CPU count for block {}", block.index))?;
            for &policy in &policies {
                tickets.push(Ticket {
                    block_index: block.index,
                    policy,
                    core_window: block.core_window,
                    jobs: jobs.clone(),
                    cluster_total,
                });
            }
        }
        let total_runs = tickets.len() as u32;
        println!(
            "batch-run: {} block(s), {} polic(y/ies), {} total runs, concurrency={}",
            blocks.len(),
            policies.len(),
            total_runs,
            cli.concurrency
        );
        dispatch(tickets, total_runs, &cli, algo_template, estimator_kind, submitter, shares)
    } else {
        let vector = cluster.as_vector().expect("a Nodes cluster config always yields a vector");
        let mut tickets = Vec::with_capacity(blocks.len() * policies.len());
        for block in &blocks {
            let jobs: Vec<JobInput> = block.jobs.iter().cloned().map(|r| r.into_job_input()).collect();
            for &policy in &policies {
                tickets.push(Ticket {
                    block_index: block.index,
                    policy,
                    core_window: block.core_window,
                    jobs: jobs.clone(),
                    cluster_total: vector.clone(),
                });
            }
        }
        let total_runs = tickets.len() as u32;
        println!(
            "batch-run: {} block(s), {} polic(y/ies), {} total runs, concurrency={}",
            blocks.len(),
            policies.len(),
            total_runs,
            cli.concurrency
        );
        dispatch(tickets, total_runs, &cli, algo_template, estimator_kind, submitter, shares)
    }
}

#[allow(clippy::too_many_arguments)]
fn dispatch<M: NodeMap + Clone + Send + 'static>(
    tickets: Vec<Ticket<M>>,
    total_runs: u32,
    cli: &Cli,
    algo_template: AlgoConfig,
    estimator_kind: EstimatorKind,
    submitter: Arc<dyn Submitter + Send + Sync>,
    shares: Arc<dyn ShareAssigner + Send + Sync>,
) -> Result<()> {
    let (ticket_tx, ticket_rx) = chan::bounded::<Option<Ticket<M>>>(0);
    let (result_tx, result_rx) = chan::bounded::<Result<RunResult, String>>(0);
    let shutdown = Arc::new(AtomicBool::new(false));

    let mut handles = Vec::with_capacity(cli.concurrency);
    for _ in 0..cli.concurrency {
        let rx = ticket_rx.clone();
        let tx = result_tx.clone();
        let algo_template = algo_template;
        let estimator_kind = estimator_kind.clone();
        let submitter = Arc::clone(&submitter);
        let shares = Arc::clone(&shares);
        let out_dir = cli.out_dir.clone();
        let sd = Arc::clone(&shutdown);
        handles.push(thread::spawn(move || {
            while let Ok(Some(ticket)) = rx.recv() {
                if sd.load(Ordering::Relaxed) {
                    break;
                }
                let result = run_ticket(
                    ticket,
                    algo_template,
                    &estimator_kind,
                    submitter.as_ref(),
                    shares.as_ref(),
                    &out_dir,
                );
                if tx.send(result).is_err() {
                    break;
                }
            }
        }));
    }
    drop(result_tx);

    let start_time = Instant::now();
    let mut completed = 0u32;
    let mut failed = 0u32;
    let mut report_lines = Vec::with_capacity(tickets.len());
    let mut ticket_iter = tickets.into_iter();
    let mut next_ticket = ticket_iter.next();

    while completed < total_runs {
        match next_ticket.take() {
            None => match result_rx.recv() {
                Ok(result) => {
                    completed += 1;
                    record_result(result, &mut report_lines, &mut failed);
                    maybe_report(completed, total_runs, cli.report_interval, start_time);
                }
                Err(_) => break,
            },
            Some(t) => {
                chan::select! {
                    send(ticket_tx, Some(t)) -> res => {
                        next_ticket = match res {
                            Ok(()) => ticket_iter.next(),
                            Err(chan::SendError(Some(t))) => Some(t),
                            Err(_) => None,
                        };
                    }
                    recv(result_rx) -> result => {
                        if let Ok(result) = result {
                            completed += 1;
                            record_result(result, &mut report_lines, &mut failed);
                            maybe_report(completed, total_runs, cli.report_interval, start_time);
                        }
                    }
                }
            }
        }
    }

    for _ in 0..cli.concurrency {
        let _ = ticket_tx.send(None);
    }
    for h in handles {
        let _ = h.join();
    }

    let report_path = cli.out_dir.join("report.jsonl");
    let mut report_writer = open_writer(&report_path).with_context(|| format!("opening {}", report_path.display()))?;
    use std::io::Write as _;
    for line in &report_lines {
        writeln!(report_writer, "{line}")?;
    }
    report_writer.close()?;

    println!();
    println!(
        "batch-run complete: {completed} runs ({failed} failed) in {:.1}s",
        start_time.elapsed().as_secs_f64()
    );
    println!("report: {}", report_path.display());
    if failed > 0 {
        bail!("{failed} of {completed} runs failed; see stderr log for details");
    }
    Ok(())
}

fn record_result(result: Result<RunResult, String>, report_lines: &mut Vec<String>, failed: &mut u32) {
    match result {
        Ok(r) => {
            let line = serde_json::json!({
                "block_index": r.block_index,
                "policy": format!("{:?}", r.policy),
                "summary": r.summary,
            });
            report_lines.push(line.to_string());
        }
        Err(e) => {
            *failed += 1;
            log::error!("run failed: {e}");
        }
    }
}

fn maybe_report(completed: u32, total: u32, interval: u32, start: Instant) {
    if interval > 0 && (completed % interval == 0 || completed == total) {
        println!(
            "[{completed}/{total}] {:.1}s elapsed",
            start.elapsed().as_secs_f64()
        );
    }
}

#[allow(clippy::too_many_arguments)]
fn run_ticket<M: NodeMap>(
    ticket: Ticket<M>,
    mut algo_template: AlgoConfig,
    estimator_kind: &EstimatorKind,
    submitter: &dyn Submitter,
    shares: &dyn ShareAssigner,
    out_dir: &std::path::Path,
) -> Result<RunResult, String> {
    algo_template.core_window = Some(ticket.core_window);
    let policy: Policy = ticket.policy.into();
    let estimator = estimator_kind.build();
    let block_index = ticket.block_index;
    let ticket_policy = ticket.policy;

    let sim = Simulator::new(
        ticket.jobs,
        Vec::new(),
        ticket.cluster_total,
        policy,
        algo_template,
        estimator,
        submitter,
        shares,
    )
    .map_err(|e| e.to_string())?;
    let output = sim.run().map_err(|e| e.to_string())?;

    let filename = format!("block{block_index:04}-{ticket_policy:?}.jsonl").to_ascii_lowercase();
    let path = out_dir.join(filename);
    let mut writer = open_writer(&path).map_err(|e| e.to_string())?;
    use std::io::Write as _;
    for record in &output.records {
        writeln!(writer, "{record}").map_err(|e| e.to_string())?;
    }
    writer.close().map_err(|e| e.to_string())?;

    let d = &output.diagnostics;
    let summary = serde_json::json!({
        "jobs_skipped_infeasible": d.jobs_skipped_infeasible,
        "forced_decay_events": d.forced_decay_events,
        "schedule_passes": d.schedule_passes,
        "backfill_passes": d.backfill_passes,
        "started_by_schedule": d.started_by_schedule,
        "started_by_backfill": d.started_by_backfill,
        "mean_utilization": d.mean_utilization(),
        "wall_clock_span": d.wall_clock_span,
        "event_file": path.display().to_string(),
    });

    Ok(RunResult {
        block_index,
        policy: ticket_policy,
        summary,
    })
}
