//! Algorithmic knobs (`threshold`, `decay`, `bf_depth`, `bf_window`,
//! `bf_interval`) loaded from TOML, with duration fields accepted either
//! as a bare integer of seconds or a suffixed string (`5m`, `2h`, `1d`)
//! the way the original `Settings`/`Template` mechanism normalized its
//! SEC/MINS/HOURS/DAYS knobs at load time.

use std::fs;

use sched_core::AlgoConfig;
use serde::Deserialize;

use crate::error::WorkloadError;

#[derive(Debug, Clone, Deserialize)]
pub struct AlgoConfigFile {
    threshold: Duration,
    decay: Duration,
    #[serde(default)]
    bf_depth: usize,
    #[serde(default)]
    bf_window: Duration,
    #[serde(default)]
    bf_interval: Duration,
    #[serde(default)]
    core_window: Option<(i64, i64)>,
}

impl AlgoConfigFile {
    pub fn load(path: &str) -> Result<Self, WorkloadError> {
        let text = fs::read_to_string(path)
            .map_err(|source| WorkloadError::Io { path: path.to_string(), source })?;
        let config: Self = toml::from_str(&text)?;
        Ok(config)
    }

    pub fn into_algo_config(self) -> AlgoConfig {
        if self.bf_depth == 0 {
            log::warn!("bf_depth is 0; backfill is disabled for this run");
        }
        AlgoConfig {
            threshold: self.threshold.0,
            decay: self.decay.0,
            bf_depth: self.bf_depth,
            bf_window: self.bf_window.0,
            bf_interval: self.bf_interval.0,
            core_window: self.core_window,
        }
    }
}

/// A duration, in seconds, parsed from either a bare integer or a
/// string suffixed `s`/`m`/`h`/`d`.
#[derive(Debug, Clone, Copy, Default)]
struct Duration(i64);

impl<'de> Deserialize<'de> for Duration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Str(String),
        }

        let raw = Raw::deserialize(deserializer)?;
        let secs = match raw {
            Raw::Int(n) => n,
            Raw::Str(s) => parse_duration_secs(&s).map_err(serde::de::Error::custom)?,
        };
        Ok(Duration(secs))
    }
}

fn parse_duration_secs(raw: &str) -> Result<i64, WorkloadError> {
    let trimmed = raw.trim();
    let invalid = || WorkloadError::InvalidDuration(raw.to_string());

    if let Ok(n) = trimmed.parse::<i64>() {
        return Ok(n);
    }

    let (digits, unit) = trimmed.split_at(trimmed.len() - 1);
    let n: i64 = digits.parse().map_err(|_| invalid())?;
    let multiplier = match unit.to_ascii_lowercase().as_str() {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        _ => return Err(invalid()),
    };
    Ok(n * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_integers_are_seconds() {
        let cfg: AlgoConfigFile = toml::from_str(
            r#"
            threshold = 600
            decay = 3600
            bf_depth = 5
            bf_window = 86400
            bf_interval = 0
            "#,
        )
        .unwrap();
        assert_eq!(cfg.threshold.0, 600);
        assert_eq!(cfg.bf_window.0, 86400);
    }

    #[test]
    fn suffixed_strings_normalize_to_seconds() {
        let cfg: AlgoConfigFile = toml::from_str(
            r#"
            threshold = "10m"
            decay = "1h"
            bf_window = "1d"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.threshold.0, 600);
        assert_eq!(cfg.decay.0, 3600);
        assert_eq!(cfg.bf_window.0, 86400);
    }

    #[test]
    fn defaults_apply_when_fields_are_missing() {
        let cfg: AlgoConfigFile = toml::from_str(
            r#"
            threshold = 600
            decay = 3600
            "#,
        )
        .unwrap();
        assert_eq!(cfg.bf_depth, 0);
        assert_eq!(cfg.bf_window.0, 0);
        assert_eq!(cfg.bf_interval.0, 0);
    }
}
