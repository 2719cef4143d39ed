//! Core entities: jobs, campaigns, users, and the write-once field helper
//! shared by all three.

mod campaign;
mod job;
mod user;
mod write_once;

pub use campaign::Campaign;
pub use job::Job;
pub use user::User;
pub use write_once::WriteOnce;

pub type JobId = u64;
pub type UserId = u64;
/// Dense, per-user index: campaign `k` is always the `k`-th campaign the
/// user ever created, and `completed_camps` is kept ordered by this index.
pub type CampaignId = u32;
