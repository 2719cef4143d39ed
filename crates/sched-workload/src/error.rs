//! Ingress validation errors: malformed traces and config files never
//! panic, they surface as a structured error the CLI can report and exit
//! on (mirroring `sched_core::SchedError`'s own ingress variant, one
//! layer further out).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkloadError {
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} line {line}: {reason}")]
    MalformedRecord { path: String, line: usize, reason: String },

    #[error("{path}: {reason}")]
    MalformedConfig { path: String, reason: String },

    #[error("duplicate job id {0} in workload trace")]
    DuplicateJobId(u64),

    #[error("invalid duration {0:?}: expected an integer optionally suffixed s/m/h/d")]
    InvalidDuration(String),

    #[error("toml parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("json parse error: {0}")]
    Json(#[from] serde_json::Error),
}
