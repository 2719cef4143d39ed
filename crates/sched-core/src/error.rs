//! Error types for the replay simulator core.
//!
//! Mirrors the failure taxonomy of the spec: a recoverable `InfeasibleJob`
//! skip, a fatal `EstimatorExhausted` abort, fatal `Invariant` assertions for
//! implementation bugs, and ingress `Validation` failures.

use thiserror::Error;

/// Errors raised by `sched-core`.
#[derive(Debug, Error)]
pub enum SchedError {
    /// `PriorityQueue::pop`/`peek` called on an empty queue.
    #[error("pop/peek on an empty priority queue")]
    EmptyQueue,

    /// Malformed input at ingress (duplicate id, non-positive field, etc).
    #[error("invalid job {job_id}: {reason}")]
    Validation { job_id: u64, reason: String },

    /// `sanity_test` rejected a job the cluster can never run. Recoverable:
    /// the simulator counts and skips it, no other state is touched.
    #[error("job {job_id} ({proc} cpus) cannot fit a {cpu_limit}-cpu cluster")]
    InfeasibleJob {
        job_id: u64,
        proc: u32,
        cpu_limit: u32,
    },

    /// The default estimator was selected but a job's `run_time` exceeds
    /// its `time_limit`; the default estimator cannot raise the estimate
    /// past `time_limit`, so the simulation cannot proceed.
    #[error("job {job_id} exceeded its time limit under the default estimator")]
    EstimatorExhausted { job_id: u64 },

    /// An internal invariant was violated. Always a bug, never user-facing.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, SchedError>;
