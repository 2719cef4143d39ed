//! The capability-set abstraction a resource timeline is built out of.
//!
//! [`Scalar`] covers the common single-partition cluster (CPU count only).
//! [`Vector`] generalizes to a set of nodes, each with its own CPU count,
//! for the case where a job must land whole on a single node.

use smallvec::SmallVec;
use std::fmt::Debug;

/// A resource capability set closed under the operations the timeline
/// needs: pointwise combination (`intersect`/`add`/`remove`), emptying
/// (`clear`), measuring (`size`), fit-checking, and carving out a job's
/// worth of capacity (`assign_job`).
pub trait NodeMap: Clone + Debug {
    /// A zero-capacity value with the same shape (node count) as `self`.
    fn zeroed_like(&self) -> Self;

    /// Pointwise minimum against another map of the same shape. Used to
    /// fold the running "what's available across this whole window" set
    /// during backfill.
    fn intersect(&self, other: &Self) -> Self;

    /// Pointwise addition; releases `other`'s capacity back into `self`.
    fn add(&mut self, other: &Self);

    /// Pointwise subtraction; consumes `other`'s capacity out of `self`.
    /// Panics on underflow — a sign of a resource-manager bookkeeping bug.
    fn remove(&mut self, other: &Self);

    fn clear(&mut self);

    /// Total capacity across the whole map.
    fn size(&self) -> u32;

    /// Whether a job needing `proc` CPUs can be placed somewhere in this
    /// map.
    fn fits_job(&self, proc: u32) -> bool;

    /// Carve `proc` CPUs worth of capacity out of `self` (mutating it) and
    /// return the allocation as a same-shaped map, so the caller can later
    /// `add`/`remove` it uniformly against other maps (typically `avail`
    /// and `reserved` on every interval a job spans).
    fn assign_job(&mut self, proc: u32) -> Self;
}

/// A single undivided pool of `n` CPUs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scalar(pub u32);

impl NodeMap for Scalar {
    fn zeroed_like(&self) -> Self {
        Scalar(0)
    }

    fn intersect(&self, other: &Self) -> Self {
        Scalar(self.0.min(other.0))
    }

    fn add(&mut self, other: &Self) {
        self.0 += other.0;
    }

    fn remove(&mut self, other: &Self) {
        self.0 = self
            .0
            .checked_sub(other.0)
            .expect("NodeMap capacity underflow");
    }

    fn clear(&mut self) {
        self.0 = 0;
    }

    fn size(&self) -> u32 {
        self.0
    }

    fn fits_job(&self, proc: u32) -> bool {
        self.0 >= proc
    }

    fn assign_job(&mut self, proc: u32) -> Self {
        self.remove(&Scalar(proc));
        Scalar(proc)
    }
}

/// Per-node CPU counts. A job must fit whole on a single node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vector(pub SmallVec<[u32; 8]>);

impl Vector {
    pub fn new(per_node: impl IntoIterator<Item = u32>) -> Self {
        Self(per_node.into_iter().collect())
    }
}

impl NodeMap for Vector {
    fn zeroed_like(&self) -> Self {
        Vector(self.0.iter().map(|_| 0).collect())
    }

    fn intersect(&self, other: &Self) -> Self {
        assert_eq!(self.0.len(), other.0.len(), "NodeMap shape mismatch");
        Vector(self.0.iter().zip(other.0.iter()).map(|(a, b)| *a.min(b)).collect())
    }

    fn add(&mut self, other: &Self) {
        assert_eq!(self.0.len(), other.0.len(), "NodeMap shape mismatch");
        for (a, b) in self.0.iter_mut().zip(other.0.iter()) {
            *a += b;
        }
    }

    fn remove(&mut self, other: &Self) {
        assert_eq!(self.0.len(), other.0.len(), "NodeMap shape mismatch");
        for (a, b) in self.0.iter_mut().zip(other.0.iter()) {
            *a = a.checked_sub(*b).expect("NodeMap capacity underflow");
        }
    }

    fn clear(&mut self) {
        for a in self.0.iter_mut() {
            *a = 0;
        }
    }

    fn size(&self) -> u32 {
        self.0.iter().sum()
    }

    fn fits_job(&self, proc: u32) -> bool {
        self.0.iter().any(|&a| a >= proc)
    }

    fn assign_job(&mut self, proc: u32) -> Self {
        let idx = self
            .0
            .iter()
            .position(|&a| a >= proc)
            .expect("assign_job called without any node having capacity");
        self.0[idx] -= proc;
        let mut alloc = self.zeroed_like();
        alloc.0[idx] = proc;
        alloc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_roundtrips() {
        let mut avail = Scalar(8);
        let alloc = avail.assign_job(3);
        assert_eq!(avail, Scalar(5));
        avail.add(&alloc);
        assert_eq!(avail, Scalar(8));
    }

    #[test]
    fn vector_assigns_the_first_node_that_fits() {
        let mut avail = Vector::new([2, 6, 4]);
        let alloc = avail.assign_job(5);
        assert_eq!(avail, Vector::new([2, 1, 4]));
        assert_eq!(alloc, Vector::new([0, 5, 0]));
        avail.add(&alloc);
        assert_eq!(avail, Vector::new([2, 6, 4]));
    }

    #[test]
    fn vector_intersect_is_pointwise_min() {
        let a = Vector::new([2, 6, 4]);
        let b = Vector::new([5, 1, 9]);
        assert_eq!(a.intersect(&b), Vector::new([2, 1, 4]));
    }
}
