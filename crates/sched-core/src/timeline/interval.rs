//! A single piecewise-constant segment of the resource timeline.

use super::NodeMap;

#[derive(Debug, Clone)]
pub struct Interval<M: NodeMap> {
    pub begin: i64,
    pub end: i64,
    pub avail: M,
    pub reserved: M,
    /// Number of running jobs whose pessimistic (time-limit) end falls
    /// exactly at `end`.
    pub job_ends: u32,
    /// Number of backfill reservations that begin exactly at `begin`.
    pub rsrv_starts: u32,
}

impl<M: NodeMap> Interval<M> {
    pub fn length(&self) -> i64 {
        self.end - self.begin
    }
}
