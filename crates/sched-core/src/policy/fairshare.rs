//! SLURM multifactor-style decayed-usage priority ("Fairshare"): a job's
//! priority grows the less of the cluster its owner has actually used
//! recently, relative to its share.

use std::cmp::Ordering;

use super::PriorityContext;
use crate::types::JobId;

#[derive(Debug, Clone, Copy)]
pub struct Key {
    neg_priority: i64,
    submit: i64,
    job_id: JobId,
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for Key {}
impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        self.neg_priority
            .cmp(&other.neg_priority)
            .then(self.submit.cmp(&other.submit))
            .then(self.job_id.cmp(&other.job_id))
    }
}

/// `priority = floor(2^(-(effective_usage / shares)) * 100000)`, where
/// `effective_usage = user.cpu_clock_used / total_usage`. Ranked
/// descending by priority (highest first), so the key stores its
/// negation for ascending comparisons. A user with no usage yet, or a
/// cluster with no usage at all, gets `effective_usage = 0`.
pub fn key(ctx: &PriorityContext) -> Key {
    let fairshare_factor = if ctx.total_usage == 0.0 {
        1.0
    } else {
        let effective = ctx.user_cpu_clock_used / ctx.total_usage;
        2f64.powf(-(effective / ctx.user_shares))
    };
    let priority = (fairshare_factor * 100_000.0).floor() as i64;
    Key {
        neg_priority: -priority,
        submit: ctx.job_submit,
        job_id: ctx.job_id,
    }
}
