//! The discrete-event loop that ties every other module together: pops the
//! next event, advances the virtual/real clocks for the elapsed interval,
//! dispatches on event kind, and conditionally triggers scheduling,
//! backfilling, and campaign-end re-estimation.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::accounting::{Estimator, Selector, ShareAssigner, Submitter};
use crate::diagnostics::Diagnostics;
use crate::error::{Result, SchedError};
use crate::event::{EventKind, EventTarget};
use crate::output::{BlockTag, DiagnosticRecord};
use crate::policy::{Policy, PriorityContext};
use crate::queue::PriorityQueue;
use crate::resource_manager::ResourceManager;
use crate::timeline::NodeMap;
use crate::types::{CampaignId, Job, JobId, User, UserId};

/// Seconds between periodic `ForceDecay` ticks (the original's 5-minute
/// cadence), independent of the backfill interval.
const FORCE_DECAY_INTERVAL: i64 = 5 * 60;

/// One job as the host hands it to the simulator, before the Submitter has
/// resolved its hard time limit.
#[derive(Debug, Clone)]
pub struct JobInput {
    pub id: JobId,
    pub submit: i64,
    pub run_time: i64,
    pub proc: u32,
    pub user: UserId,
    /// Whatever time limit the workload trace itself carried, if any.
    pub declared_time_limit: Option<i64>,
}

/// The algorithmic knobs from §6: everything besides the workload, cluster
/// shape, and policy choice.
#[derive(Debug, Clone, Copy)]
pub struct AlgoConfig {
    /// Seconds of submission idleness that starts a new campaign.
    pub threshold: i64,
    /// CPU-usage half-life, in seconds, for the Fairshare decay.
    pub decay: i64,
    /// Max pending jobs examined per backfill pass (0 disables backfill).
    pub bf_depth: usize,
    /// How far ahead of `now` a backfill reservation may be placed.
    pub bf_window: i64,
    /// Seconds between periodic backfill passes (0 disables periodic
    /// backfill; a pass still runs right after every immediate schedule
    /// pass when `bf_depth > 0`, per §4.8 step 8).
    pub bf_interval: i64,
    /// Optional `[start, end)` core measurement window; jobs/campaigns
    /// whose defining timestamp falls outside are tagged `MARG`. `None`
    /// means the whole run is core.
    pub core_window: Option<(i64, i64)>,
}

/// Everything a finished run produced: the §6 event stream plus the §6
/// diagnostic record.
#[derive(Debug, Clone, Default)]
pub struct RunOutput {
    pub records: Vec<DiagnosticRecord>,
    pub diagnostics: Diagnostics,
}

struct ResolvedJob {
    input: JobInput,
    time_limit: i64,
}

pub struct Simulator<M: NodeMap> {
    queue: PriorityQueue,
    resource_manager: ResourceManager<M>,
    jobs: HashMap<JobId, Job>,
    users: HashMap<UserId, User>,
    policy: Policy,
    selector: Selector,
    estimator: Box<dyn Estimator>,
    config: AlgoConfig,

    decay_factor: f64,
    total_active_shares: f64,
    total_usage: f64,

    now: i64,
    prev_event_time: i64,
    first_event_time: i64,
    last_util_time: i64,

    future_jobs: VecDeque<ResolvedJob>,
    staged_new_jobs: HashMap<JobId, ResolvedJob>,
    pending_new_job_count: usize,
    /// Jobs submitted but not yet started, in submission order; re-sorted
    /// by policy key at the top of every scheduling pass.
    pending: Vec<JobId>,

    emitted_camp_end: HashSet<(UserId, CampaignId)>,
    records: Vec<DiagnosticRecord>,
    diagnostics: Diagnostics,
}

impl<M: NodeMap> Simulator<M> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mut jobs: Vec<JobInput>,
        user_ids: Vec<UserId>,
        cluster_total: M,
        policy: Policy,
        config: AlgoConfig,
        estimator: Box<dyn Estimator>,
        submitter: &dyn Submitter,
        shares: &dyn ShareAssigner,
    ) -> Result<Self> {
        let mut seen_ids = HashSet::with_capacity(jobs.len());
        let mut resolved = Vec::with_capacity(jobs.len());
        let mut all_users: HashSet<UserId> = user_ids.into_iter().collect();

        for input in jobs.drain(..) {
            if !seen_ids.insert(input.id) {
                return Err(SchedError::Validation {
                    job_id: input.id,
                    reason: "duplicate job id".into(),
                });
            }
            if input.run_time <= 0 {
                return Err(SchedError::Validation {
                    job_id: input.id,
                    reason: "run_time must be positive".into(),
                });
            }
            if input.proc == 0 {
                return Err(SchedError::Validation {
                    job_id: input.id,
                    reason: "proc must be positive".into(),
                });
            }
            if input.submit < 0 {
                return Err(SchedError::Validation {
                    job_id: input.id,
                    reason: "submit must be non-negative".into(),
                });
            }

            let stub = Job::new(input.id, input.user, input.submit, input.run_time, input.proc);
            let time_limit = submitter.time_limit(&stub, input.declared_time_limit);
            if time_limit < input.run_time {
                return Err(SchedError::Validation {
                    job_id: input.id,
                    reason: "time_limit below run_time after submitter normalization".into(),
                });
            }

            all_users.insert(input.user);
            resolved.push(ResolvedJob { input, time_limit });
        }
        resolved.sort_by_key(|r| (r.input.submit, r.input.id));

        let mut weighted: Vec<(UserId, f64)> = all_users.iter().map(|&id| (id, shares.user_share(id))).collect();
        weighted.sort_by_key(|(id, _)| *id);
        let total_weight: f64 = weighted.iter().map(|(_, w)| w).sum();
        let mut users = HashMap::with_capacity(weighted.len());
        for (id, weight) in weighted {
            let normalized = if total_weight > 0.0 { weight / total_weight } else { 1.0 };
            users.insert(id, User::new(id, normalized));
        }

        let decay_factor = 1.0 - 0.693 / config.decay as f64;
        let first_event_time = resolved.front().map(|r| r.input.submit).unwrap_or(0);
        let resource_manager = ResourceManager::new(cluster_total, config.bf_window);

        let mut sim = Self {
            queue: PriorityQueue::new(),
            resource_manager,
            jobs: HashMap::new(),
            users,
            policy,
            selector: Selector::new(config.threshold),
            estimator,
            config,
            decay_factor,
            total_active_shares: 0.0,
            total_usage: 0.0,
            now: first_event_time,
            prev_event_time: first_event_time,
            first_event_time,
            last_util_time: first_event_time,
            future_jobs: resolved.into(),
            staged_new_jobs: HashMap::new(),
            pending_new_job_count: 0,
            pending: Vec::new(),
            emitted_camp_end: HashSet::new(),
            records: Vec::new(),
            diagnostics: Diagnostics::new(),
        };

        sim.top_up_new_jobs();
        if sim.config.bf_interval > 0 {
            sim.queue.add(first_event_time + sim.config.bf_interval, EventKind::BfRun, EventTarget::Global);
        }
        if sim.policy.uses_decayed_usage() {
            sim.queue
                .add(first_event_time + FORCE_DECAY_INTERVAL, EventKind::ForceDecay, EventTarget::Global);
        }

        Ok(sim)
    }

    fn top_up_new_jobs(&mut self) {
        while self.pending_new_job_count < 2 {
            let Some(resolved) = self.future_jobs.pop_front() else {
                break;
            };
            let id = resolved.input.id;
            let submit = resolved.input.submit;
            self.staged_new_jobs.insert(id, resolved);
            self.queue.add(submit, EventKind::NewJob, EventTarget::Job(id));
            self.pending_new_job_count += 1;
        }
    }

    fn tag_for(&self, defining_time: i64) -> BlockTag {
        match self.config.core_window {
            Some((start, end)) if defining_time >= start && defining_time < end => BlockTag::Core,
            Some(_) => BlockTag::Margin,
            None => BlockTag::Core,
        }
    }

    /// `(shares / total_active_shares) * max(cpu_used, 1)`: the rate, in
    /// virtual seconds per real second, at which this user's campaigns
    /// accumulate virtual progress under equal-share allocation.
    fn share_cpu_value(&self, user: &User) -> f64 {
        let cpu_used = self.resource_manager.cpu_used().max(1) as f64;
        (user.shares() / self.total_active_shares) * cpu_used
    }

    /// §4.8 step 3: advance every user's virtual and decayed-real
    /// accounting by the `delta` seconds since the previous event.
    fn apply_delta_stage(&mut self, delta: i64) {
        if delta <= 0 {
            return;
        }

        if self.policy.uses_virtual_time() && self.total_active_shares > 0.0 {
            let active: Vec<UserId> = self.users.values().filter(|u| u.active()).map(|u| u.id).collect();
            for id in active {
                let share_value = {
                    let user = &self.users[&id];
                    self.share_cpu_value(user)
                };
                self.users.get_mut(&id).unwrap().add_virtual(delta as f64 * share_value);
            }
        }

        if self.policy.uses_decayed_usage() {
            let decay = self.decay_factor.powf(delta as f64);
            for user in self.users.values_mut() {
                user.cpu_clock_used += user.occupied_cpus as f64 * delta as f64;
                user.cpu_clock_used *= decay;
            }
            self.total_usage += self.resource_manager.cpu_used() as f64 * delta as f64;
            self.total_usage *= decay;
        }
    }

    fn run_virtual_second_stage(&mut self) {
        if !self.policy.uses_virtual_time() {
            return;
        }
        for user in self.users.values_mut() {
            user.redistribute_virtual();
        }
    }

    /// §4.8 step 10: push a fresh `CampaignEnd` projection for every
    /// active user's head campaign.
    fn push_campaign_end_estimates(&mut self) {
        if !self.policy.uses_virtual_time() {
            return;
        }
        let ids: Vec<UserId> = self.users.values().filter(|u| u.active()).map(|u| u.id).collect();
        for id in ids {
            let user = &self.users[&id];
            let head = user.head_active_camp().expect("active user without a head campaign");
            let time_left = user.campaign(head).time_left();
            let share_value = self.share_cpu_value(user);
            let est_time = self.now + (time_left as f64 / share_value).ceil() as i64;
            self.queue.add(est_time, EventKind::CampaignEnd, EventTarget::Campaign(id, head));
        }
    }

    fn priority_context(&self, job_id: JobId) -> PriorityContext {
        let job = &self.jobs[&job_id];
        let user = &self.users[&job.user];
        let camp = user.campaign(job.camp());
        PriorityContext {
            job_id,
            job_submit: job.submit,
            user_id: user.id,
            user_shares: user.shares(),
            user_cpu_clock_used: user.cpu_clock_used,
            camp_id: camp.id,
            camp_created: camp.created,
            camp_time_left: camp.time_left(),
            job_estimate: job.estimate,
            total_usage: self.total_usage,
        }
    }

    fn emit_camp_start(&mut self, user_id: UserId, camp_id: CampaignId) {
        let created = self.users[&user_id].campaign(camp_id).created;
        let utility = self.resource_manager.cpu_used() as f64 / self.resource_manager.cpu_limit() as f64;
        self.records.push(DiagnosticRecord::CampStart {
            tag: self.tag_for(created),
            camp_id,
            user_id,
            created,
            utility,
        });
    }

    fn emit_camp_end(&mut self, user_id: UserId, camp_id: CampaignId) {
        if !self.emitted_camp_end.insert((user_id, camp_id)) {
            return;
        }
        let camp = self.users[&user_id].campaign(camp_id);
        self.records.push(DiagnosticRecord::CampEnd {
            tag: self.tag_for(camp.created),
            camp_id,
            user_id,
            real_end_time: camp.last_job_end(),
            workload: camp.workload(),
            job_count: camp.job_count(),
        });
    }

    fn emit_job(&mut self, job_id: JobId) {
        let job = &self.jobs[&job_id];
        self.records.push(DiagnosticRecord::Job {
            tag: self.tag_for(job.submit),
            job_id,
            camp_id: job.camp(),
            user_id: job.user,
            submit: job.submit,
            start: job.start_time(),
            end: job.end_time(),
            final_estimate: job.estimate,
            time_limit: job.time_limit(),
            proc: job.proc,
        });
    }

    /// §4.8 steps 8/9: sort pending jobs by policy key and either start
    /// them immediately (stopping at the first failure) or reserve them
    /// via backfill (continuing past failures, bounded by `bf_depth`).
    fn run_scheduling_pass(&mut self, bf_mode: bool) {
        let policy = self.policy;
        self.pending
            .sort_by_key(|&id| policy.priority_key(&self.priority_context(id)));

        self.resource_manager.start_session(self.now);
        let mut started = 0u64;
        let mut still_pending = Vec::with_capacity(self.pending.len());
        let candidates = std::mem::take(&mut self.pending);

        if !bf_mode {
            let mut candidates = candidates.into_iter();
            for job_id in &mut candidates {
                let (proc, time_limit) = {
                    let job = &self.jobs[&job_id];
                    (job.proc, job.time_limit())
                };
                if self.resource_manager.try_schedule(job_id, proc, time_limit) {
                    self.start_job(job_id);
                    started += 1;
                } else {
                    still_pending.push(job_id);
                    break;
                }
            }
            still_pending.extend(candidates);
        } else {
            let mut examined = 0usize;
            for job_id in candidates {
                if examined >= self.config.bf_depth {
                    still_pending.push(job_id);
                    continue;
                }
                examined += 1;
                let (proc, time_limit) = {
                    let job = &self.jobs[&job_id];
                    (job.proc, job.time_limit())
                };
                let started_now = self.resource_manager.try_backfill(job_id, proc, time_limit);
                if started_now {
                    self.start_job(job_id);
                    started += 1;
                } else {
                    still_pending.push(job_id);
                }
            }
        }
        self.resource_manager.end_session();
        self.pending = still_pending;

        if bf_mode {
            self.diagnostics.record_backfill_pass(started);
        } else {
            self.diagnostics.record_schedule_pass(started);
        }

        if self.tag_for(self.now) == BlockTag::Core {
            let value = self.resource_manager.cpu_used() as f64 / self.resource_manager.cpu_limit() as f64;
            let period = self.now - self.last_util_time;
            self.records.push(DiagnosticRecord::Util { period_length: period, value });
            self.diagnostics.record_utilization_sample(period, value);
        }
        self.last_util_time = self.now;
    }

    fn start_job(&mut self, job_id: JobId) {
        let now = self.now;
        let (estimate, run_time, proc, user_id) = {
            let job = &self.jobs[&job_id];
            (job.estimate, job.run_time, job.proc, job.user)
        };
        self.jobs.get_mut(&job_id).unwrap().start_execution(now);
        self.users.get_mut(&user_id).unwrap().job_started(proc);
        self.queue.add(now + run_time, EventKind::JobEnd, EventTarget::Job(job_id));
        if estimate < run_time {
            self.queue.add(now + estimate, EventKind::EstimateEnd, EventTarget::Job(job_id));
        }
    }

    fn dispatch(&mut self, kind: EventKind, target: EventTarget) -> Result<(bool, bool, bool)> {
        // Returns (schedule_pending, backfill_pending, campaigns_pending)
        // as this event's *override* of the step-4 defaults; callers OR
        // these into the accumulated flags for the current same-timestamp
        // burst.
        match (kind, target) {
            (EventKind::NewJob, EventTarget::Job(job_id)) => {
                self.pending_new_job_count -= 1;
                self.top_up_new_jobs();

                let resolved = self.staged_new_jobs.remove(&job_id).expect("staged NewJob missing");
                let ResolvedJob { input, time_limit } = resolved;

                if !self.resource_manager.sanity_test(input.proc) {
                    self.diagnostics.record_infeasible();
                    log::warn!(
                        "job {} needs {} cpus, which no cluster configuration can ever satisfy; skipping",
                        input.id,
                        input.proc
                    );
                    return Ok((false, false, false));
                }

                let was_inactive = !self.users[&input.user].active();
                if was_inactive && self.policy.uses_virtual_time() {
                    self.total_active_shares += self.users[&input.user].shares();
                }

                let mut job = Job::new(input.id, input.user, input.submit, input.run_time, input.proc);
                job.set_time_limit(time_limit);
                let estimate = self.estimator.initial_estimate(&job);
                job.estimate = estimate;

                let user = self.users.get_mut(&input.user).unwrap();
                let camp_id = self.selector.select_campaign(user, self.now);
                let is_new_camp = user.campaign(camp_id).job_count() == 0;
                user.campaign_mut(camp_id).add_job(estimate, input.proc);
                job.set_camp(camp_id);
                self.jobs.insert(input.id, job);
                self.pending.push(input.id);

                if is_new_camp {
                    self.emit_camp_start(input.user, camp_id);
                }

                Ok((true, false, true))
            }
            (EventKind::JobEnd, EventTarget::Job(job_id)) => {
                let end_time = self.now;
                let (estimate, run_time, proc, user_id, camp_id) = {
                    let job = &self.jobs[&job_id];
                    assert!(job.estimate >= job.run_time, "job {job_id} ended before its own estimate");
                    (job.estimate, job.run_time, job.proc, job.user, job.camp())
                };

                {
                    let job = self.jobs.get_mut(&job_id).unwrap();
                    job.mark_completed();
                }

                let start_time = self.jobs[&job_id].start_time();
                self.users.get_mut(&user_id).unwrap().job_ended(camp_id, estimate, run_time, proc, end_time);
                self.resource_manager.job_ended(job_id, start_time, self.jobs[&job_id].time_limit(), end_time);
                self.estimator.record_completion(user_id, run_time);
                self.emit_job(job_id);

                Ok((true, false, true))
            }
            (EventKind::EstimateEnd, EventTarget::Job(job_id)) => {
                let (user_id, camp_id, run_time) = {
                    let job = &self.jobs[&job_id];
                    assert!(job.estimate < job.run_time, "EstimateEnd fired for a job already covered");
                    (job.user, job.camp(), job.run_time)
                };

                let user_was_inactive = !self.users[&user_id].active();
                if user_was_inactive && self.policy.uses_virtual_time() {
                    let user = self.users.get_mut(&user_id).unwrap();
                    user.false_inactivity += self.now - user.last_active.unwrap_or(self.now);
                    self.total_active_shares += user.shares();
                }

                let prev = self.jobs[&job_id].estimate;
                let job = self.jobs.get_mut(&job_id).unwrap();
                let new_estimate = self.estimator.next_estimate(job)?;
                job.estimate = new_estimate;
                let start_time = job.start_time();

                self.users.get_mut(&user_id).unwrap().job_next_estimate(camp_id, prev, new_estimate, self.jobs[&job_id].proc);

                if new_estimate < run_time {
                    self.queue.add(start_time + new_estimate, EventKind::EstimateEnd, EventTarget::Job(job_id));
                }

                Ok((false, false, false))
            }
            (EventKind::BfRun, EventTarget::Global) => {
                if self.config.bf_interval > 0 {
                    self.queue.add(self.now + self.config.bf_interval, EventKind::BfRun, EventTarget::Global);
                }
                Ok((false, true, false))
            }
            (EventKind::CampaignEnd, EventTarget::Campaign(user_id, camp_id)) => {
                self.run_virtual_second_stage();

                let user = self.users.get_mut(&user_id).unwrap();
                if user.head_active_camp() != Some(camp_id) {
                    log::debug!("stale CampaignEnd for user {user_id} campaign {camp_id}; dropping");
                    return Ok((false, false, false));
                }

                let retired = user.retire_finished_campaigns();
                for id in &retired {
                    self.emit_camp_end(user_id, *id);
                }

                let user = self.users.get_mut(&user_id).unwrap();
                if !user.active() {
                    user.last_active = Some(self.now);
                    self.total_active_shares = (self.total_active_shares - user.shares()).max(0.0);
                } else {
                    let head = user.head_active_camp().unwrap();
                    let time_left = user.campaign(head).time_left();
                    let share_value = self.share_cpu_value(user);
                    let est_time = self.now + (time_left as f64 / share_value).ceil() as i64;
                    self.queue.add(est_time, EventKind::CampaignEnd, EventTarget::Campaign(user_id, head));
                }

                Ok((false, false, false))
            }
            (EventKind::ForceDecay, EventTarget::Global) => {
                self.diagnostics.record_forced_decay();
                self.queue
                    .add(self.now + FORCE_DECAY_INTERVAL, EventKind::ForceDecay, EventTarget::Global);
                Ok((false, false, true))
            }
            (kind, target) => unreachable!("event kind/target mismatch: {kind:?} / {target:?}"),
        }
    }

    /// Run the simulation to completion.
    pub fn run(mut self) -> Result<RunOutput> {
        let mut schedule_pending = false;
        let mut backfill_pending = false;
        let mut campaigns_pending = false;
        let mut virtual_second_pending = false;

        while !self.queue.is_empty() {
            let (now, kind, target) = self.queue.pop()?;
            let delta = now - self.prev_event_time;
            self.now = now;
            self.apply_delta_stage(delta);
            self.prev_event_time = now;

            // Step 4 defaults, subject to this event's override below.
            virtual_second_pending = true;
            campaigns_pending = true;

            let (sched, bf, camp) = self.dispatch(kind, target)?;
            schedule_pending |= sched;
            backfill_pending |= bf;
            if kind == EventKind::CampaignEnd || kind == EventKind::ForceDecay {
                // These events explicitly manage their own follow-up;
                // the dispatch's returned flags are authoritative.
                campaigns_pending = camp;
            } else {
                campaigns_pending = camp || campaigns_pending;
            }
            if kind == EventKind::CampaignEnd {
                virtual_second_pending = false;
            }

            let burst_continues = matches!(
                self.queue.peek(),
                Ok((t, k, _)) if t == now && k < EventKind::BfRun
            );
            if burst_continues {
                continue;
            }

            if virtual_second_pending {
                self.run_virtual_second_stage();
                virtual_second_pending = false;
            }
            if schedule_pending {
                self.run_scheduling_pass(false);
                schedule_pending = false;
                if self.config.bf_interval == 0 && self.config.bf_depth > 0 {
                    backfill_pending = true;
                }
            }
            if backfill_pending {
                self.run_scheduling_pass(true);
                backfill_pending = false;
            }
            if campaigns_pending {
                self.push_campaign_end_estimates();
                campaigns_pending = false;
            }
        }

        self.finalize()
    }

    fn finalize(mut self) -> Result<RunOutput> {
        let user_ids: Vec<UserId> = {
            let mut ids: Vec<UserId> = self.users.keys().copied().collect();
            ids.sort_unstable();
            ids
        };

        if !self.policy.uses_virtual_time() {
            for &id in &user_ids {
                let retired = self.users.get_mut(&id).unwrap().drain_virtual_at_finish();
                for camp_id in retired {
                    self.emit_camp_end(id, camp_id);
                }
            }
        }

        for &id in &user_ids {
            if self.users[&id].active() {
                return Err(SchedError::Invariant(format!(
                    "user {id} still has active campaigns at finalization"
                )));
            }
            let user = &self.users[&id];
            self.records.push(DiagnosticRecord::User {
                user_id: id,
                completed_jobs: user.completed_jobs(),
                completed_camps: user.completed_camps().len() as u64,
                lost_virtual: user.lost_virtual,
                false_inactivity: user.false_inactivity,
            });
        }

        if self.resource_manager.cpu_used() != 0 {
            return Err(SchedError::Invariant("cpu_used nonzero at finalization".into()));
        }
        for job in self.jobs.values() {
            if !job.completed() {
                return Err(SchedError::Invariant(format!("job {} never completed", job.id)));
            }
        }

        self.diagnostics.wall_clock_span = self.prev_event_time - self.first_event_time;

        Ok(RunOutput {
            records: self.records,
            diagnostics: self.diagnostics,
        })
    }
}
