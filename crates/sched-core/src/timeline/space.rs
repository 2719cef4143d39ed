//! The ordered sequence of [`Interval`]s making up a resource timeline.

use std::collections::VecDeque;

use super::{Interval, NodeMap};

/// Stand-in for "infinity" as the last interval's end. Large enough that
/// no realistic `time_limit` addition overflows `i64`.
pub const FAR_FUTURE: i64 = i64::MAX / 2;

/// An ordered, gapless sequence of intervals starting at some `begin` and
/// extending to `FAR_FUTURE`. Exposed to [`crate::resource_manager`] for
/// the split/merge bookkeeping scheduling and backfilling require.
pub struct NodeSpace<M: NodeMap> {
    pub(crate) intervals: VecDeque<Interval<M>>,
}

impl<M: NodeMap> NodeSpace<M> {
    pub fn new(total: M) -> Self {
        let zero = total.zeroed_like();
        let mut intervals = VecDeque::new();
        intervals.push_back(Interval {
            begin: 0,
            end: FAR_FUTURE,
            avail: total,
            reserved: zero,
            job_ends: 0,
            rsrv_starts: 0,
        });
        Self { intervals }
    }

    pub fn head_begin(&self) -> i64 {
        self.intervals[0].begin
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn head_avail(&self) -> &M {
        &self.intervals[0].avail
    }

    /// Trace-log the current interval sequence, gated the same way the
    /// reference manager's own `_dump_space` checked `isEnabledFor(DEBUG)`
    /// before building the dump: skip walking the timeline entirely unless
    /// tracing is actually enabled.
    pub fn dump(&self, intro: &str) {
        if !log::log_enabled!(log::Level::Trace) {
            return;
        }
        log::trace!("{intro}");
        for interval in &self.intervals {
            log::trace!("{interval:?}");
        }
    }
}
