//! Feeds a randomly generated workload through JSONL round-tripping and a
//! full `sched-core` run. The trace itself is meaningless; the point is to
//! exercise the parser and the simulator against arrival patterns no
//! hand-written fixture would think to cover.

use rand::Rng;
use rand_xoshiro::rand_core::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use sched_core::policy::Policy;
use sched_core::{AlgoConfig, Simulator};
use sched_core::accounting::{DefaultEstimator, DefaultTimeSubmitter, EqualShare};
use sched_core::timeline::Scalar;
use sched_workload::{read_jobs, WorkloadFormat};

/// Generates `n` jobs with increasing submit times, run times in
/// `1..=max_run`, and `proc` counts in `1..=cpus` so every job fits the
/// cluster on its own.
fn synth_jsonl(rng: &mut Xoshiro256PlusPlus, n: u64, cpus: u32, max_run: i64) -> String {
    let mut submit = 0i64;
    let mut out = String::new();
    for id in 1..=n {
        submit += rng.random_range(0..=20);
        let run_time = rng.random_range(1..=max_run);
        let proc = rng.random_range(1..=cpus);
        let user_id = rng.random_range(1..=4u64);
        out.push_str(&format!(
            "{{\"id\":{id},\"submit\":{submit},\"run_time\":{run_time},\"proc\":{proc},\"user_id\":{user_id}}}\n"
        ));
    }
    out
}

fn write_temp(contents: &str) -> tempfile_path::TempPath {
    tempfile_path::TempPath::new(contents)
}

mod tempfile_path {
    use std::io::Write;
    use std::path::{Path, PathBuf};

    /// Minimal scratch-file helper: writes to `std::env::temp_dir()` and
    /// removes the file when dropped. `sched-workload` has no tempfile
    /// dependency, so this test rolls its own rather than adding one.
    pub struct TempPath(PathBuf);

    impl TempPath {
        pub fn new(contents: &str) -> Self {
            let path = std::env::temp_dir().join(format!(
                "sched-workload-synth-{}-{}.jsonl",
                std::process::id(),
                contents.len()
            ));
            let mut f = std::fs::File::create(&path).expect("create temp workload file");
            f.write_all(contents.as_bytes()).expect("write temp workload file");
            TempPath(path)
        }

        pub fn as_path(&self) -> &Path {
            &self.0
        }
    }

    impl Drop for TempPath {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }
}

fn run_with_seed(seed: u64, policy: Policy) {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let cpus = 8;
    let trace = synth_jsonl(&mut rng, 200, cpus, 600);
    let file = write_temp(&trace);

    let records = read_jobs(file.as_path().to_str().unwrap(), WorkloadFormat::Jsonl).unwrap();
    assert_eq!(records.len(), 200);
    let jobs = records.into_iter().map(|r| r.into_job_input()).collect();

    let config = AlgoConfig {
        threshold: 3600,
        decay: 86_400,
        bf_depth: 32,
        bf_window: 7 * 86_400,
        bf_interval: 300,
        core_window: None,
    };
    let sim = Simulator::new(
        jobs,
        Vec::new(),
        Scalar(cpus),
        policy,
        config,
        Box::new(DefaultEstimator),
        &DefaultTimeSubmitter,
        &EqualShare,
    )
    .expect("synthetic trace should always validate");

    let output = sim.run().expect("simulation should never error on a well-formed trace");
    assert_eq!(output.diagnostics.jobs_skipped_infeasible, 0);
    assert!(output.diagnostics.started_by_schedule + output.diagnostics.started_by_backfill >= 200);
}

#[test]
fn random_traces_run_to_completion_under_ostrich() {
    for seed in [1u64, 2, 3] {
        run_with_seed(seed, Policy::OStrich);
    }
}

#[test]
fn random_traces_run_to_completion_under_fairshare() {
    for seed in [1u64, 2, 3] {
        run_with_seed(seed, Policy::Fairshare);
    }
}
