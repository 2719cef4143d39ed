//! File-driven per-user share weights, grounded on the original
//! `parts/shares.py`: a `user_id -> share` table, defaulting unlisted
//! users to a weight of 1.0. `sched_core::accounting::CustomShare` does
//! the actual assignment; this module only knows how to load the table
//! off disk.

use std::collections::HashMap;
use std::fs;

use sched_core::accounting::CustomShare;
use sched_core::types::UserId;
use serde::Deserialize;

use crate::error::WorkloadError;

#[derive(Debug, Clone, Deserialize)]
pub struct CustomShareFile {
    #[serde(flatten)]
    weights: HashMap<String, f64>,
}

pub fn load_custom_shares(path: &str) -> Result<CustomShare, WorkloadError> {
    let text = fs::read_to_string(path)
        .map_err(|source| WorkloadError::Io { path: path.to_string(), source })?;
    let file: CustomShareFile = toml::from_str(&text)?;

    let mut weights: HashMap<UserId, f64> = HashMap::with_capacity(file.weights.len());
    for (user_id, weight) in file.weights {
        let id: UserId = user_id.parse().map_err(|_| WorkloadError::MalformedConfig {
            path: path.to_string(),
            reason: format!("share table key {user_id:?} is not a user id"),
        })?;
        weights.insert(id, weight);
    }
    Ok(CustomShare::new(weights))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_weights_keyed_by_user_id() {
        let dir = std::env::temp_dir();
        let path = dir.join("sched_workload_shares_test.toml");
        std::fs::write(&path, "1 = 2.5\n2 = 1.0\n").unwrap();

        let shares = load_custom_shares(path.to_str().unwrap()).unwrap();
        use sched_core::accounting::ShareAssigner;
        assert_eq!(shares.user_share(1), 2.5);
        assert_eq!(shares.user_share(3), 1.0);

        std::fs::remove_file(&path).ok();
    }
}
