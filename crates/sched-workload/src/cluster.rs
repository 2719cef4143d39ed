//! Cluster shape: a single fixed CPU pool, a pool sized from the
//! workload's own offered load, or a `node_id -> cpu_count` map for the
//! multi-partition `Vector` NodeMap.

use std::collections::BTreeMap;
use std::fs;

use sched_core::timeline::{Scalar, Vector};
use serde::Deserialize;

use crate::error::WorkloadError;
use crate::job_record::JobRecord;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ClusterConfig {
    /// `cpus = 64`
    Single { cpus: u32 },
    /// `percentile = 95` — size the cluster to the p-th percentile of
    /// concurrent offered load over the workload, per the original
    /// `cpu_percentile` sizing knob (`main.cpu_percent` in the reference
    /// driver), assuming an unbounded cluster.
    Percentile { percentile: f64 },
    /// `[nodes]` / `node0 = 16` ... a map of named nodes to CPU counts.
    Nodes { nodes: BTreeMap<String, u32> },
}

impl ClusterConfig {
    pub fn load(path: &str) -> Result<Self, WorkloadError> {
        let text = fs::read_to_string(path)
            .map_err(|source| WorkloadError::Io { path: path.to_string(), source })?;
        let config: Self = toml::from_str(&text)?;
        Ok(config)
    }

    pub fn as_scalar(&self) -> Option<Scalar> {
        match self {
            ClusterConfig::Single { cpus } => Some(Scalar(*cpus)),
            ClusterConfig::Percentile { .. } | ClusterConfig::Nodes { .. } => None,
        }
    }

    pub fn as_vector(&self) -> Option<Vector> {
        match self {
            ClusterConfig::Single { cpus } => Some(Vector::new([*cpus])),
            ClusterConfig::Nodes { nodes } => Some(Vector::new(nodes.values().copied())),
            ClusterConfig::Percentile { .. } => None,
        }
    }

    /// Resolve a single-pool cluster, computing it from the workload's
    /// own concurrent-demand percentile when the config asked for one.
    /// Errors for a `Nodes` config — a multi-node cluster has no single
    /// CPU count to resolve to.
    pub fn resolve_scalar(&self, jobs: &[JobRecord]) -> Result<Scalar, WorkloadError> {
        match self {
            ClusterConfig::Single { cpus } => Ok(Scalar(*cpus)),
            ClusterConfig::Percentile { percentile } => {
                let cpus = cpu_percentile(jobs, *percentile).ok_or_else(|| WorkloadError::MalformedConfig {
                    path: "<cluster>".into(),
                    reason: "percentile cluster sizing needs at least one job in the workload".into(),
                })?;
                Ok(Scalar(cpus))
            }
            ClusterConfig::Nodes { .. } => Err(WorkloadError::MalformedConfig {
                path: "<cluster>".into(),
                reason: "a node-partitioned cluster has no single CPU count to resolve".into(),
            }),
        }
    }
}

/// The CPU count at the `percentile`-th percentile of concurrent offered
/// load across `jobs`, assuming the cluster has no CPU limit: each job
/// contributes its full `proc` demand for its whole `run_time`, clamped
/// at the last job's submission time (matching the reference
/// implementation's own clamp, which undercounts trailing long jobs but
/// is kept for fidelity). Returns `None` for an empty workload.
pub fn cpu_percentile(jobs: &[JobRecord], percentile: f64) -> Option<u32> {
    if jobs.is_empty() {
        return None;
    }
    let last_submit = jobs.iter().map(|j| j.submit).max().unwrap();

    let mut events: BTreeMap<i64, i64> = BTreeMap::new();
    for j in jobs {
        *events.entry(j.submit).or_insert(0) += i64::from(j.proc);
        let end = (j.submit + j.run_time).min(last_submit);
        *events.entry(end).or_insert(0) -= i64::from(j.proc);
    }

    let mut util: BTreeMap<i64, i64> = BTreeMap::new();
    let mut prev_time = *events.keys().next().expect("events nonempty: at least one job submitted");
    let mut cpus: i64 = 0;
    for (&time, &diff) in &events {
        let period = time - prev_time;
        prev_time = time;
        *util.entry(cpus).or_insert(0) += period;
        cpus += diff;
    }

    let total: i64 = util.values().sum();
    let find = (percentile / 100.0 * total as f64) as i64;

    let mut elements = 0i64;
    for (&cpus, &period) in &util {
        elements += period;
        if elements >= find {
            return Some(cpus.max(0) as u32);
        }
    }
    util.keys().last().map(|&c| c.max(0) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: u64, submit: i64, run_time: i64, proc: u32) -> JobRecord {
        JobRecord {
            id,
            submit,
            run_time,
            proc,
            user_id: 1,
            time_limit: None,
        }
    }

    #[test]
    fn parses_a_single_cpu_pool() {
        let config: ClusterConfig = toml::from_str("cpus = 32").unwrap();
        assert_eq!(config.as_scalar(), Some(Scalar(32)));
    }

    #[test]
    fn parses_a_node_map() {
        let config: ClusterConfig = toml::from_str(
            r#"
            [nodes]
            a = 16
            b = 16
            "#,
        )
        .unwrap();
        assert!(config.as_scalar().is_none());
        assert_eq!(config.as_vector().unwrap().0.iter().sum::<u32>(), 32);
    }

    #[test]
    fn parses_a_percentile_config() {
        let config: ClusterConfig = toml::from_str("percentile = 95").unwrap();
        assert!(matches!(config, ClusterConfig::Percentile { percentile } if percentile == 95.0));
        assert!(config.as_scalar().is_none());
    }

    #[test]
    fn percentile_100_is_the_peak_concurrent_demand() {
        // Two jobs overlap from t=5..10 (4 cpus), then only one runs
        // alone from t=10..20 (3 cpus), nothing after.
        let jobs = vec![job(1, 0, 10, 1), job(2, 5, 5, 3)];
        assert_eq!(cpu_percentile(&jobs, 100.0), Some(4));
    }

    #[test]
    fn percentile_0_is_idle_or_minimum_demand() {
        let jobs = vec![job(1, 0, 10, 1), job(2, 20, 5, 3)];
        // There is an idle gap between the two jobs; the 0th percentile
        // picks up that 0-cpu period first.
        assert_eq!(cpu_percentile(&jobs, 0.0), Some(0));
    }

    #[test]
    fn empty_workload_has_no_percentile() {
        assert_eq!(cpu_percentile(&[], 95.0), None);
    }
}
