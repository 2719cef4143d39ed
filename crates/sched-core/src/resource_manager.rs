//! Conservative-backfill resource manager.
//!
//! Owns a [`NodeSpace`] and layers the EASY-style scheduling operations on
//! top of it: an immediate-start fast path (`try_schedule`), a walk-forward
//! backfill search bounded by a backfill window (`try_backfill`), and the
//! session bracket (`start_session`/`end_session`) that lets a caller batch
//! several jobs' worth of backfill attempts against one consistent
//! snapshot of the timeline before committing reservations.

use std::collections::HashMap;

use crate::timeline::{Interval, NodeMap, NodeSpace};
use crate::types::JobId;

pub struct ResourceManager<M: NodeMap> {
    space: NodeSpace<M>,
    /// Static total capacity, for `sanity_test` — independent of how much
    /// is currently available.
    total: M,
    cpu_limit: u32,
    reservations: u32,
    /// `now + bf_window` for the session currently open, i.e. how far
    /// ahead `try_backfill` is willing to look for a reservation slot.
    window: i64,
    bf_window: i64,
    /// Allocation carved out for each currently-running job, so
    /// `job_ended` can release exactly the capacity (and, for `Vector`,
    /// exactly the node) that was consumed.
    allocations: HashMap<JobId, M>,
}

impl<M: NodeMap> ResourceManager<M> {
    pub fn new(total: M, bf_window: i64) -> Self {
        let cpu_limit = total.size();
        Self {
            space: NodeSpace::new(total.clone()),
            total,
            cpu_limit,
            reservations: 0,
            window: 0,
            bf_window,
            allocations: HashMap::new(),
        }
    }

    pub fn cpu_limit(&self) -> u32 {
        self.cpu_limit
    }

    pub fn cpu_used(&self) -> u32 {
        self.cpu_limit - self.space.head_avail().size()
    }

    /// Whether this job could ever run here, independent of current load:
    /// `proc` must fit within the cluster's static per-node capacity.
    pub fn sanity_test(&self, proc: u32) -> bool {
        self.total.fits_job(proc)
    }

    /// Open a scheduling session at `now`: advance the head interval to
    /// `now` and set the backfill window horizon.
    ///
    /// # Panics
    /// If a prior session's reservations were never cleared with
    /// `end_session`, or if a job that should already have ended (per the
    /// timeline) hasn't been removed via `job_ended` yet.
    pub fn start_session(&mut self, now: i64) {
        assert_eq!(self.reservations, 0, "reservations from a prior session still open");
        let head = &mut self.space.intervals[0];
        assert!(head.end - now > 0, "a finished job has not been removed from the timeline");
        head.begin = now;
        self.window = now + self.bf_window;
    }

    /// Split (if needed) and consume capacity across `[first_idx,
    /// last_idx]` for a job running `time_limit` seconds from
    /// `intervals[first_idx].begin`, optionally as a reservation.
    fn allocate(
        &mut self,
        job_id: JobId,
        first_idx: usize,
        last_idx: usize,
        time_limit: i64,
        reservation: bool,
        alloc: M,
    ) {
        let first_begin = self.space.intervals[first_idx].begin;
        let last_end = self.space.intervals[last_idx].end;
        if last_end - first_begin > time_limit {
            let split_at = first_begin + time_limit;
            let tail = self.space.intervals[last_idx].clone();
            let new_tail = Interval {
                begin: split_at,
                end: tail.end,
                avail: tail.avail,
                reserved: tail.reserved,
                job_ends: tail.job_ends,
                rsrv_starts: 0,
            };
            self.space.intervals[last_idx].end = split_at;
            self.space.intervals[last_idx].job_ends = 0;
            self.space.intervals.insert(last_idx + 1, new_tail);
        }

        if reservation {
            self.space.intervals[first_idx].rsrv_starts += 1;
            self.reservations += 1;
        } else {
            self.space.intervals[last_idx].job_ends += 1;
        }

        for idx in first_idx..=last_idx {
            self.space.intervals[idx].avail.remove(&alloc);
            if reservation {
                self.space.intervals[idx].reserved.add(&alloc);
            }
        }

        self.allocations.insert(job_id, alloc);
        self.space.dump(&format!("added resources for job {job_id}"));
    }

    /// EASY fast path: can the job start right now and run undisturbed to
    /// its time limit? Requires no reservations to be outstanding (callers
    /// only try this before any backfill reservations have been made in
    /// the session).
    pub fn try_schedule(&mut self, job_id: JobId, proc: u32, time_limit: i64) -> bool {
        assert_eq!(self.reservations, 0, "try_schedule called with reservations outstanding");
        if !self.space.intervals[0].avail.fits_job(proc) {
            return false;
        }

        let mut elapsed = 0i64;
        let mut last_idx = 0usize;
        for idx in 0..self.space.intervals.len() {
            elapsed += self.space.intervals[idx].length();
            if elapsed >= time_limit {
                last_idx = idx;
                break;
            }
        }

        let mut probe = self.space.intervals[0].avail.clone();
        let alloc = probe.assign_job(proc);
        self.allocate(job_id, 0, last_idx, time_limit, false, alloc);
        true
    }

    /// Walk forward through the timeline looking for the earliest window
    /// of length `time_limit` with `proc` CPUs continuously free, bounded
    /// by the session's backfill window. Returns `true` if the job can run
    /// immediately (found at the head), `false` if it was only reserved
    /// for a later start (or no slot was found within the window).
    pub fn try_backfill(&mut self, job_id: JobId, proc: u32, time_limit: i64) -> bool {
        let mut first_idx = 0usize;
        let mut idx = 0usize;
        let mut avail = self.space.intervals[0].avail.clone();
        let mut must_check = true;
        let mut elapsed = 0i64;

        loop {
            if must_check {
                avail = avail.intersect(&self.space.intervals[idx].avail);
            }

            if !must_check || avail.fits_job(proc) {
                elapsed += self.space.intervals[idx].length();
                if elapsed >= time_limit {
                    let last_idx = idx;
                    let can_run_now = first_idx == 0;
                    let alloc = avail.assign_job(proc);
                    self.allocate(job_id, first_idx, last_idx, time_limit, !can_run_now, alloc);
                    return can_run_now;
                }
                idx += 1;
                must_check = self.space.intervals[idx].rsrv_starts > 0;
            } else {
                elapsed = 0;
                idx += 1;
                first_idx = idx;
                if self.space.intervals[first_idx].begin > self.window {
                    return false;
                }
                avail = self.space.intervals[first_idx].avail.clone();
                must_check = true;
            }
        }
    }

    /// Release every reservation made this session: restore reserved
    /// capacity to `avail` and merge away any interval boundary that only
    /// existed to delimit a reservation (`job_ends == 0`).
    pub fn end_session(&mut self) {
        let before = self.reservations;
        let mut idx = 0usize;
        while idx + 1 < self.space.intervals.len() {
            let rsrv = self.space.intervals[idx].rsrv_starts;
            self.reservations -= rsrv;
            self.space.intervals[idx].rsrv_starts = 0;

            if self.space.intervals[idx].job_ends == 0 {
                let begin = self.space.intervals[idx].begin;
                self.space.intervals.remove(idx);
                self.space.intervals[idx].begin = begin;
            } else {
                let reserved = self.space.intervals[idx].reserved.clone();
                self.space.intervals[idx].avail.add(&reserved);
                self.space.intervals[idx].reserved.clear();
                idx += 1;
            }
        }
        assert_eq!(self.reservations, 0, "reservations not fully released");
        self.space.dump(&format!("cleared {before} reservations"));
    }

    /// Release a job's allocation at its real (possibly early) end time.
    /// Every interval strictly before the job's pessimistic end gets its
    /// capacity credited back immediately; the interval carrying the
    /// `job_ends` boundary either absorbs the credit (if other jobs still
    /// share that boundary) or is merged away (if this was the last one).
    pub fn job_ended(&mut self, job_id: JobId, start_time: i64, time_limit: i64, end_time: i64) {
        assert_eq!(self.reservations, 0, "job_ended called with reservations outstanding");
        self.space.intervals[0].begin = end_time;
        assert!(self.space.intervals[0].length() >= 0, "head interval length went negative");

        let reserved_end = start_time + time_limit;
        let alloc = self
            .allocations
            .remove(&job_id)
            .expect("job_ended called for an unscheduled job");

        let mut idx = 0usize;
        while self.space.intervals[idx].end < reserved_end {
            self.space.intervals[idx].avail.add(&alloc);
            idx += 1;
        }
        assert_eq!(self.space.intervals[idx].end, reserved_end, "missing job's reserved boundary");
        assert!(self.space.intervals[idx].job_ends > 0, "boundary has no job_ends to release");

        if self.space.intervals[idx].job_ends == 1 {
            let next = self.space.intervals.remove(idx + 1).expect("no successor to merge with");
            let cur = &mut self.space.intervals[idx];
            cur.end = next.end;
            cur.avail = next.avail;
            cur.reserved = next.reserved;
            cur.job_ends = next.job_ends;
        } else {
            self.space.intervals[idx].avail.add(&alloc);
            self.space.intervals[idx].job_ends -= 1;
        }
        self.space.dump(&format!("removed resources for job {job_id}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::Scalar;

    fn rm(cpus: u32) -> ResourceManager<Scalar> {
        ResourceManager::new(Scalar(cpus), 24 * 3600)
    }

    #[test]
    fn schedules_into_an_idle_cluster() {
        let mut mgr = rm(8);
        mgr.start_session(0);
        assert!(mgr.try_schedule(1, 4, 100));
        assert_eq!(mgr.cpu_used(), 4);
        mgr.end_session();
        mgr.job_ended(1, 0, 100, 60);
        assert_eq!(mgr.cpu_used(), 0);
    }

    #[test]
    fn backfill_reserves_when_head_is_full() {
        let mut mgr = rm(4);
        mgr.start_session(0);
        assert!(mgr.try_schedule(1, 4, 1000));
        mgr.end_session();

        mgr.start_session(10);
        // Head is full; a job needing 4 cpus can't start now but can be
        // reserved for later.
        let started_now = mgr.try_backfill(2, 4, 50);
        assert!(!started_now);
        mgr.end_session();
    }

    #[test]
    fn job_ending_early_frees_capacity_immediately() {
        let mut mgr = rm(4);
        mgr.start_session(0);
        assert!(mgr.try_schedule(1, 4, 1000));
        mgr.end_session();

        mgr.job_ended(1, 0, 1000, 10);
        assert_eq!(mgr.cpu_used(), 0);
    }

    #[test]
    fn sanity_test_rejects_oversized_jobs() {
        let mgr = rm(4);
        assert!(mgr.sanity_test(4));
        assert!(!mgr.sanity_test(5));
    }
}
