//! Tie-breaking priority queue with tombstone-based logical removal.
//!
//! Grounded on the reference simulator's own priority queue: a binary heap
//! keyed by `(time, kind, sequence)` plus a side table recording the live
//! sequence number for each `(kind, target)` pair. Re-adding an event for a
//! target that already has one pending doesn't search the heap for it;
//! it just bumps the side table, which makes the old heap entry stale.
//! Stale entries are dropped lazily, on the next `peek`/`pop`/`is_empty`.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::error::{Result, SchedError};
use crate::event::{EventKind, EventTarget};

#[derive(Debug, Clone, Copy)]
struct QueueEntry {
    time: i64,
    kind: EventKind,
    sequence: u64,
    target: EventTarget,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        (self.time, self.kind, self.sequence) == (other.time, other.kind, other.sequence)
    }
}
impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so `BinaryHeap` (a max-heap) pops the smallest
        // (time, kind, sequence) triple first.
        (other.time, other.kind, other.sequence).cmp(&(self.time, self.kind, self.sequence))
    }
}

/// A discrete-event queue with `(event kind, dispatch target)` dedup.
#[derive(Debug, Default)]
pub struct PriorityQueue {
    heap: BinaryHeap<QueueEntry>,
    live: HashMap<(EventKind, EventTarget), u64>,
    counter: u64,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            live: HashMap::new(),
            counter: 0,
        }
    }

    /// Schedule `target` to fire at `time` with kind `kind`. Any event
    /// previously queued for the same `(kind, target)` pair is logically
    /// dropped.
    pub fn add(&mut self, time: i64, kind: EventKind, target: EventTarget) {
        let sequence = self.counter;
        self.counter += 1;
        self.live.insert((kind, target), sequence);
        self.heap.push(QueueEntry {
            time,
            kind,
            sequence,
            target,
        });
    }

    /// Cancel any pending event for `(kind, target)` without scheduling a
    /// replacement.
    pub fn cancel(&mut self, kind: EventKind, target: EventTarget) {
        self.live.remove(&(kind, target));
    }

    fn drop_stale(&mut self) {
        while let Some(top) = self.heap.peek() {
            let is_live = self.live.get(&(top.kind, top.target)) == Some(&top.sequence);
            if is_live {
                break;
            }
            self.heap.pop();
        }
    }

    pub fn peek(&mut self) -> Result<(i64, EventKind, EventTarget)> {
        self.drop_stale();
        self.heap
            .peek()
            .map(|e| (e.time, e.kind, e.target))
            .ok_or(SchedError::EmptyQueue)
    }

    pub fn pop(&mut self) -> Result<(i64, EventKind, EventTarget)> {
        self.drop_stale();
        let entry = self.heap.pop().ok_or(SchedError::EmptyQueue)?;
        self.live.remove(&(entry.kind, entry.target));
        Ok((entry.time, entry.kind, entry.target))
    }

    pub fn is_empty(&mut self) -> bool {
        self.drop_stale();
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_time_then_kind_then_insertion_order() {
        let mut q = PriorityQueue::new();
        q.add(10, EventKind::CampaignEnd, EventTarget::Campaign(1, 0));
        q.add(10, EventKind::JobEnd, EventTarget::Job(1));
        q.add(5, EventKind::NewJob, EventTarget::Job(2));
        q.add(10, EventKind::JobEnd, EventTarget::Job(3));

        assert_eq!(q.pop().unwrap().0, 5);
        let (t, k, _) = q.pop().unwrap();
        assert_eq!((t, k), (10, EventKind::JobEnd));
        let (t, k, target) = q.pop().unwrap();
        assert_eq!((t, k), (10, EventKind::JobEnd));
        assert_eq!(target, EventTarget::Job(3));
        assert_eq!(q.pop().unwrap().1, EventKind::CampaignEnd);
        assert!(q.is_empty());
    }

    #[test]
    fn re_adding_same_target_drops_the_old_entry() {
        let mut q = PriorityQueue::new();
        q.add(100, EventKind::JobEnd, EventTarget::Job(1));
        q.add(50, EventKind::JobEnd, EventTarget::Job(1));

        let (t, _, target) = q.pop().unwrap();
        assert_eq!(t, 50);
        assert_eq!(target, EventTarget::Job(1));
        assert!(q.is_empty());
    }

    #[test]
    fn cancel_removes_without_replacement() {
        let mut q = PriorityQueue::new();
        q.add(1, EventKind::ForceDecay, EventTarget::Global);
        q.cancel(EventKind::ForceDecay, EventTarget::Global);
        assert!(q.is_empty());
    }

    #[test]
    fn empty_queue_errors() {
        let mut q = PriorityQueue::new();
        assert!(matches!(q.pop(), Err(SchedError::EmptyQueue)));
        assert!(matches!(q.peek(), Err(SchedError::EmptyQueue)));
    }
}
