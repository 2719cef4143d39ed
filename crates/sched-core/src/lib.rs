//! Discrete-event replay simulator core for campaign-fairness (OStrich)
//! and decay-fairshare cluster scheduling.
//!
//! This crate owns the four subsystems the host driver composes: the
//! tie-breaking [`queue::PriorityQueue`], the [`resource_manager`] /
//! [`timeline`] conservative-backfill scheduler, the virtual-time
//! [`types::Campaign`]/[`types::User`] accounting, and the
//! [`policy`] pending-queue orderings. Everything else — parsing a
//! workload trace, a command-line surface, output file layout — lives in
//! sibling crates; this one only consumes the resolved inputs `simulator`
//! documents and produces a [`simulator::RunOutput`].

pub mod accounting;
pub mod diagnostics;
pub mod error;
pub mod event;
pub mod output;
pub mod policy;
pub mod queue;
pub mod resource_manager;
pub mod simulator;
pub mod timeline;
pub mod types;

pub use error::{Result, SchedError};
pub use simulator::{AlgoConfig, JobInput, RunOutput, Simulator};
