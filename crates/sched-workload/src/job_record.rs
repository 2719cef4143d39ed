//! Parses a workload trace into the `JobInput`s `sched_core::Simulator`
//! consumes. Two on-disk shapes are supported: a `serde`-derived JSONL
//! form (one `JobRecord` per line) and a simplified whitespace-delimited
//! form mirroring the field layout of the original `.swf` (Standard
//! Workload Format) traces this simulator's reference implementation
//! was built against.

use std::collections::HashSet;
use std::io::BufRead;

use sched_core::JobInput;
use serde::{Deserialize, Serialize};

use crate::error::WorkloadError;
use crate::io::open_reader;

/// SWF's own sentinel for "field not recorded".
const SWF_MISSING: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadFormat {
    /// One JSON object per line.
    Jsonl,
    /// Whitespace-delimited `job_id submit run_time proc user_id
    /// [time_limit]`, `;`-prefixed lines are comments (as in `.swf`
    /// header blocks), a missing `time_limit` is written `-1`.
    Swf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: u64,
    pub submit: i64,
    pub run_time: i64,
    pub proc: u32,
    pub user_id: u64,
    #[serde(default)]
    pub time_limit: Option<i64>,
}

impl JobRecord {
    pub fn into_job_input(self) -> JobInput {
        JobInput {
            id: self.id,
            submit: self.submit,
            run_time: self.run_time,
            proc: self.proc,
            user: self.user_id,
            declared_time_limit: self.time_limit,
        }
    }
}

pub fn read_jobs(path: &str, format: WorkloadFormat) -> Result<Vec<JobRecord>, WorkloadError> {
    let reader = open_reader(path).map_err(|source| WorkloadError::Io { path: path.to_string(), source })?;
    let records = match format {
        WorkloadFormat::Jsonl => read_jsonl(path, reader)?,
        WorkloadFormat::Swf => read_swf(path, reader)?,
    };
    check_unique_ids(&records)?;
    Ok(records)
}

fn check_unique_ids(records: &[JobRecord]) -> Result<(), WorkloadError> {
    let mut seen = HashSet::with_capacity(records.len());
    for record in records {
        if !seen.insert(record.id) {
            return Err(WorkloadError::DuplicateJobId(record.id));
        }
    }
    Ok(())
}

fn read_jsonl(path: &str, reader: Box<dyn BufRead>) -> Result<Vec<JobRecord>, WorkloadError> {
    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| WorkloadError::Io { path: path.to_string(), source })?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let record: JobRecord = serde_json::from_str(trimmed).map_err(|source| WorkloadError::MalformedRecord {
            path: path.to_string(),
            line: idx + 1,
            reason: source.to_string(),
        })?;
        out.push(record);
    }
    Ok(out)
}

fn read_swf(path: &str, reader: Box<dyn BufRead>) -> Result<Vec<JobRecord>, WorkloadError> {
    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| WorkloadError::Io { path: path.to_string(), source })?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with(';') {
            continue;
        }

        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() < 5 {
            return Err(WorkloadError::MalformedRecord {
                path: path.to_string(),
                line: idx + 1,
                reason: format!("expected at least 5 fields, found {}", fields.len()),
            });
        }

        let parse_field = |field: &str, name: &str| -> Result<i64, WorkloadError> {
            field.parse::<i64>().map_err(|_| WorkloadError::MalformedRecord {
                path: path.to_string(),
                line: idx + 1,
                reason: format!("invalid {name} {field:?}"),
            })
        };

        let id = parse_field(fields[0], "job_id")?;
        let submit = parse_field(fields[1], "submit")?;
        let run_time = parse_field(fields[2], "run_time")?;
        let proc = parse_field(fields[3], "proc")?;
        let user_id = parse_field(fields[4], "user_id")?;
        let time_limit = match fields.get(5) {
            Some(raw) => {
                let value = parse_field(raw, "time_limit")?;
                if value == SWF_MISSING {
                    None
                } else {
                    Some(value)
                }
            }
            None => None,
        };

        out.push(JobRecord {
            id: id as u64,
            submit,
            run_time,
            proc: proc as u32,
            user_id: user_id as u64,
            time_limit,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn jsonl_parses_one_record_per_line() {
        let data = "{\"id\":1,\"submit\":0,\"run_time\":10,\"proc\":2,\"user_id\":5}\n\n{\"id\":2,\"submit\":1,\"run_time\":20,\"proc\":1,\"user_id\":5,\"time_limit\":30}\n";
        let records = read_jsonl("<test>", Box::new(Cursor::new(data.as_bytes().to_vec()))).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, 1);
        assert_eq!(records[0].time_limit, None);
        assert_eq!(records[1].time_limit, Some(30));
    }

    #[test]
    fn swf_skips_comments_and_honors_missing_sentinel() {
        let data = "; this is a header comment\n1 0 10 2 5 -1\n2 1 20 1 5 30\n";
        let records = read_swf("<test>", Box::new(Cursor::new(data.as_bytes().to_vec()))).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].time_limit, None);
        assert_eq!(records[1].time_limit, Some(30));
    }

    #[test]
    fn swf_rejects_too_few_fields() {
        let data = "1 0 10 2\n";
        let err = read_swf("<test>", Box::new(Cursor::new(data.as_bytes().to_vec()))).unwrap_err();
        assert!(matches!(err, WorkloadError::MalformedRecord { .. }));
    }

    #[test]
    fn check_unique_ids_rejects_repeated_job_id() {
        let records = read_jsonl(
            "<test>",
            Box::new(Cursor::new(
                b"{\"id\":1,\"submit\":0,\"run_time\":10,\"proc\":2,\"user_id\":5}\n{\"id\":1,\"submit\":1,\"run_time\":5,\"proc\":1,\"user_id\":6}\n"
                    .to_vec(),
            )),
        )
        .unwrap();
        let err = check_unique_ids(&records).unwrap_err();
        assert!(matches!(err, WorkloadError::DuplicateJobId(1)));
    }
}
