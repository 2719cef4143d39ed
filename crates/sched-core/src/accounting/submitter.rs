//! Decides a job's hard time limit at submission.

use crate::types::Job;

pub trait Submitter {
    /// `declared` is whatever time limit the workload trace itself
    /// carried, if any (the submitter is free to ignore it).
    fn time_limit(&self, job: &Job, declared: Option<i64>) -> i64;
}

/// Perfect-information submitter: the time limit is exactly the job's
/// actual run time. Useful as a best-case baseline.
pub struct OracleSubmitter;

impl Submitter for OracleSubmitter {
    fn time_limit(&self, job: &Job, _declared: Option<i64>) -> i64 {
        job.run_time
    }
}

/// Uses the time limit recorded in the workload trace, falling back to
/// the job's run time when the trace didn't carry one.
pub struct DefaultTimeSubmitter;

impl Submitter for DefaultTimeSubmitter {
    fn time_limit(&self, job: &Job, declared: Option<i64>) -> i64 {
        declared.unwrap_or(job.run_time)
    }
}

/// Ignores both the trace and the job: every job gets the same hard
/// limit, clamped up to its own run time so the ingress invariant
/// (`time_limit >= run_time`) can never fail on a job that simply ran
/// longer than the configured constant.
pub struct ConstantTimeSubmitter {
    pub constant: i64,
}

impl ConstantTimeSubmitter {
    pub fn new(constant: i64) -> Self {
        assert!(constant > 0, "constant time limit must be positive");
        Self { constant }
    }
}

impl Submitter for ConstantTimeSubmitter {
    fn time_limit(&self, job: &Job, _declared: Option<i64>) -> i64 {
        self.constant.max(job.run_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oracle_uses_run_time() {
        let job = Job::new(1, 1, 0, 120, 1);
        assert_eq!(OracleSubmitter.time_limit(&job, Some(600)), 120);
    }

    #[test]
    fn default_time_prefers_declared_value() {
        let job = Job::new(1, 1, 0, 120, 1);
        assert_eq!(DefaultTimeSubmitter.time_limit(&job, Some(600)), 600);
        assert_eq!(DefaultTimeSubmitter.time_limit(&job, None), 120);
    }

    #[test]
    fn constant_submitter_ignores_declared_and_clamps_to_run_time() {
        let job = Job::new(1, 1, 0, 900, 1);
        let sub = ConstantTimeSubmitter::new(600);
        assert_eq!(sub.time_limit(&job, Some(100)), 900);

        let short_job = Job::new(2, 1, 0, 10, 1);
        assert_eq!(sub.time_limit(&short_job, None), 600);
    }
}
