//! The two fairness policies: campaign-based virtual time (OStrich) and
//! decayed real CPU usage (Fairshare). Dispatched by value over a fixed,
//! closed set rather than through a trait object, since there are exactly
//! two and the simulator needs to know which virtual/real accounting
//! stages to run based on which one is active.

mod fairshare;
mod ostrich;

use std::cmp::Ordering;

use crate::types::{CampaignId, JobId, UserId};

/// Everything a priority key might need, gathered by the simulator before
/// ranking a batch of candidate jobs.
#[derive(Debug, Clone, Copy)]
pub struct PriorityContext {
    pub job_id: JobId,
    pub job_submit: i64,
    pub user_id: UserId,
    pub user_shares: f64,
    pub user_cpu_clock_used: f64,
    pub camp_id: CampaignId,
    pub camp_created: i64,
    pub camp_time_left: i64,
    pub job_estimate: i64,
    pub total_usage: f64,
}

/// The fairness policy in effect for a whole simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    OStrich,
    Fairshare,
}

impl Policy {
    /// Whether virtual-time accounting (campaign redistribution) runs
    /// under this policy.
    pub fn uses_virtual_time(&self) -> bool {
        matches!(self, Policy::OStrich)
    }

    /// Whether decayed real CPU-usage accounting runs under this policy.
    pub fn uses_decayed_usage(&self) -> bool {
        matches!(self, Policy::Fairshare)
    }

    pub fn priority_key(&self, ctx: &PriorityContext) -> PriorityKey {
        match self {
            Policy::OStrich => PriorityKey::OStrich(ostrich::key(ctx)),
            Policy::Fairshare => PriorityKey::Fairshare(fairshare::key(ctx)),
        }
    }
}

/// A comparable priority key. Scheduling always ranks jobs under one
/// policy at a time, so comparing keys from different variants is a bug.
#[derive(Debug, Clone, Copy)]
pub enum PriorityKey {
    OStrich(ostrich::Key),
    Fairshare(fairshare::Key),
}

impl PartialEq for PriorityKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for PriorityKey {}

impl PartialOrd for PriorityKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PriorityKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (PriorityKey::OStrich(a), PriorityKey::OStrich(b)) => a.cmp(b),
            (PriorityKey::Fairshare(a), PriorityKey::Fairshare(b)) => a.cmp(b),
            _ => unreachable!("comparing priority keys from two different policies"),
        }
    }
}
