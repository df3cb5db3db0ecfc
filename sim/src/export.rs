//! Rollout export: serialize diagnostics for offline plotting and comparison.

use anyhow::Context;
use control_core::{DynamicsMode, HistorySummary, RolloutHistory};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// A full recorded rollout.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RolloutLog {
    pub dynamics_mode: DynamicsMode,
    pub seed: u64,
    pub k_d: f64,
    pub gamma_b: f64,
    pub steps: usize,
    pub summary: HistorySummary,
    /// Per-dimension actual / predicted / band traces, one entry per tick
    pub history: RolloutHistory,
}

/// Write any serializable value as pretty-printed JSON.
pub fn save_json<T: Serialize>(value: &T, path: &Path) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .with_context(|| format!("writing JSON to {}", path.display()))?;
    Ok(())
}

/// Read a JSON file into any deserializable value.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing JSON from {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RobotConfig;

    #[test]
    fn json_helpers_handle_any_serde_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("robot.json");
        let config = RobotConfig {
            dt: 0.05,
            noisy: true,
            ..RobotConfig::default()
        };
        save_json(&config, &path).unwrap();
        let loaded: RobotConfig = load_json(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn load_json_names_the_failing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let err = load_json::<RobotConfig>(&path).unwrap_err();
        assert!(err.to_string().contains("missing.json"));
    }
}
