//! Persisted performance baselines: `baseline_<scenario>.json`, mode 0600,
//! loaded/saved via `serde_json` the way the teacher's config persistence
//! does. Retention (`cleanup_old_baselines`) is keyed off the timestamp
//! embedded in the baseline JSON, not file-mtime — chosen because a
//! baseline file can be copied or touched by tooling without its content
//! changing, and the embedded timestamp is what the statistics actually
//! describe.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::baseline::stats::RunStatistics;
use crate::error::{ReplicationError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaselineStatus {
    Provisional,
    Validated,
    Deprecated,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceBaseline {
    pub scenario: String,
    pub statistics: RunStatistics,
    pub runs_completed: usize,
    pub outliers_removed: usize,
    pub is_valid: bool,
    pub status: BaselineStatus,
    /// Unix seconds; recorded by the caller since this crate never calls
    /// `SystemTime::now()` internally (kept deterministic for tests).
    pub recorded_at_unix: u64,
}

impl PerformanceBaseline {
    pub fn establish(
        scenario: impl Into<String>,
        samples: &[f64],
        outliers_removed: usize,
        recorded_at_unix: u64,
        cv_tolerance_pct: f64,
        min_runs: usize,
    ) -> Result<Self> {
        let statistics = RunStatistics::compute(samples)
            .ok_or_else(|| ReplicationError::Validation("cannot establish baseline from zero samples".into()))?;
        let is_valid = statistics.is_statistically_valid(cv_tolerance_pct, min_runs);
        Ok(Self {
            scenario: scenario.into(),
            statistics,
            runs_completed: samples.len(),
            outliers_removed,
            is_valid,
            status: if is_valid { BaselineStatus::Validated } else { BaselineStatus::Provisional },
            recorded_at_unix,
        })
    }

    pub fn file_name(scenario: &str) -> String {
        format!("baseline_{scenario}.json")
    }

    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(Self::file_name(&self.scenario));
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(&path, &json)?;
        set_owner_only(&path)?;
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path)?;
        Ok(serde_json::from_slice(&raw)?)
    }

    pub fn load_scenario(dir: &Path, scenario: &str) -> Result<Self> {
        Self::load(&dir.join(Self::file_name(scenario)))
    }
}

#[cfg(unix)]
fn set_owner_only(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(0o600);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn set_owner_only(_path: &Path) -> Result<()> {
    Ok(())
}

/// Deletes baseline files in `dir` whose embedded `recorded_at_unix` is
/// older than `now_unix - retention_secs`. Returns the paths removed.
pub fn cleanup_old_baselines(dir: &Path, now_unix: u64, retention_secs: u64) -> Result<Vec<PathBuf>> {
    let cutoff = now_unix.saturating_sub(retention_secs);
    let mut removed = Vec::new();
    if !dir.exists() {
        return Ok(removed);
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Ok(baseline) = PerformanceBaseline::load(&path) else {
            continue;
        };
        if baseline.recorded_at_unix < cutoff {
            std::fs::remove_file(&path)?;
            removed.push(path);
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let samples: Vec<f64> = (1..=10).map(|v| v as f64 * 10.0).collect();
        let baseline = PerformanceBaseline::establish("push-1gb", &samples, 0, 1_700_000_000, 15.0, 5).unwrap();
        let path = baseline.save(dir.path()).unwrap();
        let loaded = PerformanceBaseline::load(&path).unwrap();
        assert_eq!(baseline, loaded);
    }

    #[test]
    fn cleanup_removes_only_stale_embedded_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let samples: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        let old = PerformanceBaseline::establish("old", &samples, 0, 1_000, 15.0, 5).unwrap();
        let fresh = PerformanceBaseline::establish("fresh", &samples, 0, 2_000_000, 15.0, 5).unwrap();
        old.save(dir.path()).unwrap();
        fresh.save(dir.path()).unwrap();

        let removed = cleanup_old_baselines(dir.path(), 2_000_000, 500_000).unwrap();
        assert_eq!(removed.len(), 1);
        assert!(PerformanceBaseline::load_scenario(dir.path(), "fresh").is_ok());
        assert!(PerformanceBaseline::load_scenario(dir.path(), "old").is_err());
    }
}
