//! Replication configuration: sizing, timeouts, retry policy and the policy
//! file path, loaded from YAML (tried first) or JSON, with environment
//! variable overrides for the pieces that used to be CLI-only.

use crate::common::RetryConfig;
use crate::error::{ReplicationError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// A single registry this process talks to, resolved once per replication
/// and handed to the injected transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEndpoint {
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub skip_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    #[serde(default = "default_worker_count")]
    pub workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_worker_count() -> usize {
    10
}

fn default_queue_capacity() -> usize {
    256
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: default_worker_count(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionPoolConfig {
    #[serde(default = "default_idle_per_host")]
    pub max_idle_per_host: usize,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

fn default_idle_per_host() -> usize {
    16
}

fn default_idle_timeout_secs() -> u64 {
    90
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: default_idle_per_host(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

impl ConnectionPoolConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_request_timeout_secs")]
    pub request_secs: u64,
    #[serde(default = "default_tag_timeout_secs")]
    pub tag_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_tag_timeout_secs() -> u64 {
    15 * 60
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: default_request_timeout_secs(),
            tag_secs: default_tag_timeout_secs(),
        }
    }
}

impl TimeoutConfig {
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    pub fn tag(&self) -> Duration {
        Duration::from_secs(self.tag_secs)
    }
}

/// Top-level replication config, loaded from YAML/JSON/env.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    #[serde(default)]
    pub worker_pool: WorkerPoolConfig,
    #[serde(default)]
    pub connection_pool: ConnectionPoolConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: usize,
    #[serde(default = "default_intra_tag_concurrency")]
    pub intra_tag_concurrency: usize,
    pub policy_path: Option<String>,
}

fn default_retry_max_attempts() -> usize {
    3
}

fn default_intra_tag_concurrency() -> usize {
    8
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            worker_pool: WorkerPoolConfig::default(),
            connection_pool: ConnectionPoolConfig::default(),
            timeouts: TimeoutConfig::default(),
            retry_max_attempts: default_retry_max_attempts(),
            intra_tag_concurrency: default_intra_tag_concurrency(),
            policy_path: None,
        }
    }
}

impl ReplicationConfig {
    /// Load a config file, trying YAML first and falling back to JSON, per
    /// the same loader convention used for the policy file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match serde_yaml::from_str(raw) {
            Ok(cfg) => Ok(cfg),
            Err(yaml_err) => serde_json::from_str(raw).map_err(|json_err| {
                ReplicationError::Config(format!(
                    "could not parse as YAML ({yaml_err}) or JSON ({json_err})"
                ))
            }),
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry_max_attempts,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(60),
            exponential_backoff: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = ReplicationConfig::default();
        assert_eq!(cfg.worker_pool.workers, 10);
        assert_eq!(cfg.intra_tag_concurrency, 8);
        assert_eq!(cfg.timeouts.tag_secs, 900);
    }

    #[test]
    fn parses_yaml() {
        let yaml = "worker_pool:\n  workers: 4\n  queue_capacity: 50\n";
        let cfg = ReplicationConfig::parse(yaml).unwrap();
        assert_eq!(cfg.worker_pool.workers, 4);
        assert_eq!(cfg.worker_pool.queue_capacity, 50);
    }

    #[test]
    fn parses_json_fallback() {
        let json = r#"{"worker_pool": {"workers": 7, "queue_capacity": 20}}"#;
        let cfg = ReplicationConfig::parse(json).unwrap();
        assert_eq!(cfg.worker_pool.workers, 7);
    }

    #[test]
    fn rejects_garbage() {
        assert!(ReplicationConfig::parse("not: [valid : yaml : or json").is_err());
    }
}
