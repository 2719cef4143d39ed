//! A user: the entity shares are assigned to, and the owner of its own
//! campaigns.

use std::collections::VecDeque;

use super::{Campaign, CampaignId, UserId};

#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,

    /// Normalized weight assigned by the ShareAssigner. Always `> 0`.
    shares: f64,

    /// Decayed cumulative `proc * elapsed` CPU-time usage, under Fairshare.
    pub cpu_clock_used: f64,
    pub occupied_cpus: u32,

    virt_pool: f64,
    /// Virtual work that overflowed every active campaign's workload cap
    /// during a redistribution pass; never recovered.
    pub lost_virtual: f64,

    /// How long (seconds) this user has been continuously active, or 0
    /// just after reactivation from inactivity.
    pub false_inactivity: i64,
    pub last_active: Option<i64>,

    completed_jobs: u64,

    /// Owned campaigns, arena-indexed: `campaigns[i].id == i`.
    campaigns: Vec<Campaign>,
    /// Campaigns with `time_left > 0`, in creation order.
    active_camps: VecDeque<CampaignId>,
    /// Campaigns with `time_left <= 0`, kept ordered by id (dense, so a
    /// slice `completed_camps[k..]` is "every campaign from id k onward").
    completed_camps: Vec<CampaignId>,
}

impl User {
    pub fn new(id: UserId, shares: f64) -> Self {
        assert!(shares > 0.0, "user shares must be positive");
        Self {
            id,
            shares,
            cpu_clock_used: 0.0,
            occupied_cpus: 0,
            virt_pool: 0.0,
            lost_virtual: 0.0,
            false_inactivity: 0,
            last_active: None,
            completed_jobs: 0,
            campaigns: Vec::new(),
            active_camps: VecDeque::new(),
            completed_camps: Vec::new(),
        }
    }

    pub fn shares(&self) -> f64 {
        self.shares
    }

    pub fn set_shares(&mut self, shares: f64) {
        assert!(shares > 0.0, "user shares must be positive");
        self.shares = shares;
    }

    pub fn active(&self) -> bool {
        !self.active_camps.is_empty()
    }

    pub fn active_camps(&self) -> impl Iterator<Item = &CampaignId> {
        self.active_camps.iter()
    }

    pub fn completed_camps(&self) -> &[CampaignId] {
        &self.completed_camps
    }

    pub fn campaign(&self, id: CampaignId) -> &Campaign {
        &self.campaigns[id as usize]
    }

    pub fn campaign_mut(&mut self, id: CampaignId) -> &mut Campaign {
        &mut self.campaigns[id as usize]
    }

    /// The head active campaign (earliest created), if any.
    pub fn head_active_camp(&self) -> Option<CampaignId> {
        self.active_camps.front().copied()
    }

    /// The most recently created active campaign, if any (candidate for a
    /// new job to join directly).
    pub fn last_active_camp(&self) -> Option<CampaignId> {
        self.active_camps.back().copied()
    }

    /// The most recently completed campaign, if any (candidate for
    /// Selector resurrection).
    pub fn last_completed_camp(&self) -> Option<CampaignId> {
        self.completed_camps.last().copied()
    }

    pub fn create_campaign(&mut self, now: i64) -> CampaignId {
        let id = self.campaigns.len() as CampaignId;
        self.campaigns.push(Campaign::new(id, self.id, now));
        self.active_camps.push_back(id);
        id
    }

    /// Move a campaign the Selector decided to reuse back from
    /// `completed_camps` to the end of `active_camps`. The caller must
    /// have already checked `id` is in `completed_camps`.
    pub fn resurrect_campaign(&mut self, id: CampaignId) {
        let pos = self
            .completed_camps
            .iter()
            .position(|&c| c == id)
            .expect("resurrect_campaign called for a campaign that isn't completed");
        self.completed_camps.remove(pos);
        self.active_camps.push_back(id);
    }

    pub fn add_virtual(&mut self, value: f64) {
        self.virt_pool += value;
    }

    pub fn job_started(&mut self, proc: u32) {
        self.occupied_cpus += proc;
    }

    /// Apply a job's completion: update occupied CPUs, swap the owning
    /// campaign's workload (estimate credit for real run time), and flow
    /// the virtual overshoot back into the pool.
    pub fn job_ended(&mut self, camp_id: CampaignId, estimate: i64, run_time: i64, proc: u32, end_time: i64) {
        self.occupied_cpus -= proc;
        let overshoot = self.campaigns[camp_id as usize].job_ended(estimate, run_time, proc, end_time);
        self.virt_pool += overshoot;
        self.completed_jobs += 1;
    }

    pub fn completed_jobs(&self) -> u64 {
        self.completed_jobs
    }

    /// Apply a higher estimate to a still-running job's campaign. If the
    /// campaign had already been moved to `completed_camps` (possible when
    /// virtual time outran real completion), resurrect it and every later
    /// completed campaign back onto the front of `active_camps`.
    pub fn job_next_estimate(&mut self, camp_id: CampaignId, prev: i64, new: i64, proc: u32) {
        self.campaigns[camp_id as usize].revise_estimate(prev, new, proc);

        if let Some(pos) = self.completed_camps.iter().position(|&c| c == camp_id) {
            let reactivated: Vec<CampaignId> = self.completed_camps.drain(pos..).collect();
            for id in reactivated.into_iter().rev() {
                self.active_camps.push_front(id);
            }
        }
    }

    /// Two-stage virtual redistribution: pool together the unallocated
    /// `virt_pool` and every active campaign's already-assigned virtual
    /// progress, then hand it back out in creation order, capping each
    /// campaign at its own workload. Anything left over after every active
    /// campaign is saturated is permanently lost.
    pub fn redistribute_virtual(&mut self) {
        let mut total: f64 = self.virt_pool
            + self
                .active_camps
                .iter()
                .map(|&id| self.campaigns[id as usize].virtual_progress())
                .sum::<f64>();

        let mut offset = 0i64;
        for &id in self.active_camps.iter() {
            let camp = &mut self.campaigns[id as usize];
            let workload = camp.workload() as f64;
            let assigned = total.min(workload);
            total -= assigned;
            camp.set_virtual(assigned);
            camp.set_offset(offset);
            offset += camp.time_left();
        }

        self.virt_pool = 0.0;
        self.lost_virtual += total;
    }

    /// Used only by the real-only (Fairshare) run: since nothing ever drives
    /// virtual-time accounting for this user, force every still-active
    /// campaign to its own workload so it closes cleanly at finalization
    /// instead of being reported as still open. Returns the ids retired.
    pub fn drain_virtual_at_finish(&mut self) -> Vec<CampaignId> {
        let active: Vec<CampaignId> = self.active_camps.iter().copied().collect();
        for id in active {
            let workload = self.campaigns[id as usize].workload() as f64;
            self.campaigns[id as usize].set_virtual(workload);
        }
        self.retire_finished_campaigns()
    }

    /// Move every active campaign whose `time_left <= 0` from
    /// `active_camps` to the end of `completed_camps`, in creation order.
    /// Returns the ids moved, for diagnostic reporting.
    pub fn retire_finished_campaigns(&mut self) -> Vec<CampaignId> {
        let mut retired = Vec::new();
        while let Some(&id) = self.active_camps.front() {
            if self.campaigns[id as usize].active() {
                break;
            }
            self.active_camps.pop_front();
            self.completed_camps.push(id);
            retired.push(id);
        }
        retired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redistribution_caps_per_campaign_and_tracks_overflow() {
        let mut user = User::new(1, 1.0);
        let a = user.create_campaign(0);
        let b = user.create_campaign(0);
        user.campaign_mut(a).add_job(10, 1);
        user.campaign_mut(b).add_job(100, 1);

        user.add_virtual(5.0);
        user.redistribute_virtual();
        assert_eq!(user.campaign(a).virtual_progress(), 5.0);
        assert_eq!(user.campaign(a).offset(), 0);
        assert_eq!(user.campaign(b).virtual_progress(), 0.0);
        assert_eq!(user.campaign(b).offset(), 5);

        user.add_virtual(200.0);
        user.redistribute_virtual();
        assert_eq!(user.campaign(a).virtual_progress(), 10.0);
        assert_eq!(user.campaign(b).virtual_progress(), 100.0);
        assert!(user.lost_virtual > 0.0);
    }

    #[test]
    fn retire_and_resurrect_campaign() {
        let mut user = User::new(1, 1.0);
        let a = user.create_campaign(0);
        user.campaign_mut(a).add_job(10, 1);
        user.add_virtual(10.0);
        user.redistribute_virtual();
        assert_eq!(user.retire_finished_campaigns(), vec![a]);
        assert!(!user.active());

        user.job_next_estimate(a, 10, 20, 1);
        assert!(user.active());
        assert_eq!(user.head_active_camp(), Some(a));
        assert!(user.completed_camps().is_empty());
    }
}
