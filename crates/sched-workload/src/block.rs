//! Splits a workload trace into fixed-length blocks, each with its own
//! warm-up/cool-down margin, per the original `block_time`/`block_margin`/
//! `one_block` settings. A block's `core_window` is handed straight to
//! `sched_core::AlgoConfig::core_window` so the simulator tags events
//! CORE/MARG per spec.md's "Margin & core periods".

use crate::job_record::JobRecord;

#[derive(Debug, Clone)]
pub struct Block {
    pub index: usize,
    /// `[start, end)` passed as `AlgoConfig::core_window`.
    pub core_window: (i64, i64),
    /// Every job whose submit time falls within the core window or its
    /// margin on either side.
    pub jobs: Vec<JobRecord>,
}

/// `block_time <= 0` means "one_block": the whole trace is a single
/// core window with no margin, matching the original's `one_block`
/// escape hatch for workloads too short to usefully split.
pub fn tag_block(jobs: &[JobRecord], block_time: i64, block_margin: i64) -> Vec<Block> {
    if jobs.is_empty() {
        return Vec::new();
    }

    if block_time <= 0 {
        let min_submit = jobs.iter().map(|j| j.submit).min().unwrap();
        let max_end = jobs.iter().map(|j| j.submit + j.run_time).max().unwrap();
        return vec![Block {
            index: 0,
            core_window: (min_submit, max_end + 1),
            jobs: jobs.to_vec(),
        }];
    }

    let min_submit = jobs.iter().map(|j| j.submit).min().unwrap();
    let max_submit = jobs.iter().map(|j| j.submit).max().unwrap();
    let first_index = min_submit.div_euclid(block_time);
    let last_index = max_submit.div_euclid(block_time);

    let mut blocks = Vec::new();
    for index in first_index..=last_index {
        let core_start = index * block_time;
        let core_end = core_start + block_time;
        let window_start = core_start - block_margin;
        let window_end = core_end + block_margin;

        let block_jobs: Vec<JobRecord> = jobs
            .iter()
            .filter(|j| j.submit >= window_start && j.submit < window_end)
            .cloned()
            .collect();
        if block_jobs.is_empty() {
            continue;
        }

        blocks.push(Block {
            index: index as usize,
            core_window: (core_start, core_end),
            jobs: block_jobs,
        });
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: u64, submit: i64) -> JobRecord {
        JobRecord {
            id,
            submit,
            run_time: 10,
            proc: 1,
            user_id: 1,
            time_limit: None,
        }
    }

    #[test]
    fn one_block_covers_the_whole_trace() {
        let jobs = vec![job(1, 0), job(2, 500)];
        let blocks = tag_block(&jobs, 0, 0);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].jobs.len(), 2);
    }

    #[test]
    fn splits_into_fixed_length_blocks_with_margin() {
        let jobs = vec![job(1, 5), job(2, 105), job(3, 195)];
        let blocks = tag_block(&jobs, 100, 20);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].core_window, (0, 100));
        // job 3 at t=195 falls within block 1's core [100,200) and also
        // within block 2's margin [180,220); margin windows may overlap.
        assert!(blocks[0].jobs.iter().any(|j| j.id == 1));
        assert!(blocks[1].jobs.iter().any(|j| j.id == 2));
        assert!(blocks[1].jobs.iter().any(|j| j.id == 3));
    }
}
