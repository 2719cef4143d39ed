//! Formats the simulator's event stream as line-oriented diagnostic
//! records. Every record is prefixed `CORE` or `MARG` depending on
//! whether the event it describes falls inside the measured "core"
//! window or the surrounding warm-up/cool-down margin (see
//! `block_margin` in the algorithm config); margin records still appear
//! in the stream but are excluded from aggregate statistics.

use std::fmt;

use crate::types::{CampaignId, JobId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    Core,
    Margin,
}

impl fmt::Display for BlockTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BlockTag::Core => "CORE",
            BlockTag::Margin => "MARG",
        })
    }
}

#[derive(Debug, Clone)]
pub enum DiagnosticRecord {
    /// `<camp_id> <user_id> <created_time> <utility:4dp>` — utility is
    /// `cpu_used / cpu_limit` at the moment the campaign was created.
    CampStart {
        tag: BlockTag,
        camp_id: CampaignId,
        user_id: UserId,
        created: i64,
        utility: f64,
    },
    /// `<camp_id> <user_id> <real_end_time> <workload> <job_count>`.
    CampEnd {
        tag: BlockTag,
        camp_id: CampaignId,
        user_id: UserId,
        real_end_time: i64,
        workload: i64,
        job_count: u32,
    },
    /// `<job_id> <camp_id> <user_id> <submit> <start> <end> <final_estimate> <time_limit> <proc>`.
    Job {
        tag: BlockTag,
        job_id: JobId,
        camp_id: CampaignId,
        user_id: UserId,
        submit: i64,
        start: i64,
        end: i64,
        final_estimate: i64,
        time_limit: i64,
        proc: u32,
    },
    /// `<user_id> <completed_jobs> <completed_camps> <lost_virtual> <false_inactivity>`.
    User {
        user_id: UserId,
        completed_jobs: u64,
        completed_camps: u64,
        lost_virtual: f64,
        false_inactivity: i64,
    },
    /// `<period_length> <value:4dp>` — mean utilization over the period
    /// since the previous `UTIL` record.
    Util { period_length: i64, value: f64 },
}

impl fmt::Display for DiagnosticRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticRecord::CampStart {
                tag,
                camp_id,
                user_id,
                created,
                utility,
            } => write!(f, "{tag} CAMP START {camp_id} {user_id} {created} {utility:.4}"),
            DiagnosticRecord::CampEnd {
                tag,
                camp_id,
                user_id,
                real_end_time,
                workload,
                job_count,
            } => write!(f, "{tag} CAMP END {camp_id} {user_id} {real_end_time} {workload} {job_count}"),
            DiagnosticRecord::Job {
                tag,
                job_id,
                camp_id,
                user_id,
                submit,
                start,
                end,
                final_estimate,
                time_limit,
                proc,
            } => write!(
                f,
                "{tag} JOB {job_id} {camp_id} {user_id} {submit} {start} {end} {final_estimate} {time_limit} {proc}"
            ),
            DiagnosticRecord::User {
                user_id,
                completed_jobs,
                completed_camps,
                lost_virtual,
                false_inactivity,
            } => write!(f, "USER {user_id} {completed_jobs} {completed_camps} {lost_virtual:.4} {false_inactivity}"),
            DiagnosticRecord::Util { period_length, value } => write!(f, "UTIL {period_length} {value:.4}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_record_matches_the_stable_format() {
        let rec = DiagnosticRecord::Job {
            tag: BlockTag::Core,
            job_id: 1,
            camp_id: 0,
            user_id: 2,
            submit: 0,
            start: 0,
            end: 10,
            final_estimate: 10,
            time_limit: 10,
            proc: 2,
        };
        assert_eq!(rec.to_string(), "CORE JOB 1 0 2 0 0 10 10 10 2");
    }

    #[test]
    fn camp_start_formats_utility_to_four_places() {
        let rec = DiagnosticRecord::CampStart {
            tag: BlockTag::Core,
            camp_id: 0,
            user_id: 1,
            created: 0,
            utility: 0.0,
        };
        assert_eq!(rec.to_string(), "CORE CAMP START 0 1 0 0.0000");
    }

    #[test]
    fn user_record_has_no_block_tag() {
        let rec = DiagnosticRecord::User {
            user_id: 1,
            completed_jobs: 1,
            completed_camps: 1,
            lost_virtual: 0.0,
            false_inactivity: 0,
        };
        assert_eq!(rec.to_string(), "USER 1 1 1 0.0000 0");
    }
}
