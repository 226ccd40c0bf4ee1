//! Metrics Sink: absorbs replication/tag/repository lifecycle events and
//! exposes both a plain introspection facet and a Prometheus scrape facet.
//!
//! Two halves: a `Mutex`-guarded struct of running aggregates (plus
//! `AtomicU64` hot counters) for the JSON introspection endpoints, and a
//! `prometheus::Registry`-backed set of `IntCounterVec`/`HistogramVec`/`GaugeVec`
//! for `GET /metrics`. Both are built once at process startup and passed by
//! `Arc` reference — never read from a global.

pub mod server;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use prometheus::{HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry};

use crate::tagcopy::{TagCopyOutcome, TagCopyResult};

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Snapshot {
    pub total_replications: u64,
    pub total_errors: u64,
    pub layers_copied: u64,
    pub bytes_copied: u64,
    pub average_tag_latency_ms: f64,
    pub top_source_repos: Vec<(String, u64)>,
    pub top_dest_repos: Vec<(String, u64)>,
}

#[derive(Default)]
struct Aggregates {
    tag_latencies_ms: Vec<f64>,
    source_repo_counts: HashMap<String, u64>,
    dest_repo_counts: HashMap<String, u64>,
}

pub struct MetricsSink {
    registry: Registry,

    total_replications: AtomicU64,
    total_errors: AtomicU64,
    layers_copied: AtomicU64,
    bytes_copied: AtomicU64,
    aggregates: Mutex<Aggregates>,

    http_requests: IntCounterVec,
    replication_total: IntCounterVec,
    replication_duration: HistogramVec,
    tag_total: IntCounterVec,
    tag_duration: HistogramVec,
    worker_pool_gauge: IntGaugeVec,
    auth_failures: IntCounterVec,
    panics: IntCounterVec,
}

impl Default for MetricsSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink {
    pub fn new() -> Self {
        let registry = Registry::new();

        let http_requests = IntCounterVec::new(
            Opts::new("freightliner_http_requests_total", "HTTP requests issued to registries"),
            &["method", "status_class"],
        )
        .expect("metric registration");
        let replication_total = IntCounterVec::new(
            Opts::new("freightliner_replications_total", "Replications by outcome"),
            &["outcome"],
        )
        .expect("metric registration");
        let replication_duration = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "freightliner_replication_duration_seconds",
                "Replication wall-clock duration",
            ),
            &["source_repo"],
        )
        .expect("metric registration");
        let tag_total = IntCounterVec::new(
            Opts::new("freightliner_tag_copies_total", "Tag copies by outcome"),
            &["outcome"],
        )
        .expect("metric registration");
        let tag_duration = HistogramVec::new(
            prometheus::HistogramOpts::new("freightliner_tag_copy_duration_seconds", "Per-tag copy duration"),
            &["outcome"],
        )
        .expect("metric registration");
        let worker_pool_gauge = IntGaugeVec::new(
            Opts::new("freightliner_worker_pool", "Worker pool size/active/queued"),
            &["state"],
        )
        .expect("metric registration");
        let auth_failures = IntCounterVec::new(
            Opts::new("freightliner_auth_failures_total", "Authentication failures"),
            &["registry"],
        )
        .expect("metric registration");
        let panics = IntCounterVec::new(Opts::new("freightliner_panics_total", "Caught panics"), &["component"])
            .expect("metric registration");

        for collector in [
            Box::new(http_requests.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(replication_total.clone()),
            Box::new(tag_total.clone()),
            Box::new(worker_pool_gauge.clone()),
            Box::new(auth_failures.clone()),
            Box::new(panics.clone()),
        ] {
            let _ = registry.register(collector);
        }
        let _ = registry.register(Box::new(replication_duration.clone()));
        let _ = registry.register(Box::new(tag_duration.clone()));

        Self {
            registry,
            total_replications: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
            layers_copied: AtomicU64::new(0),
            bytes_copied: AtomicU64::new(0),
            aggregates: Mutex::new(Aggregates::default()),
            http_requests,
            replication_total,
            replication_duration,
            tag_total,
            tag_duration,
            worker_pool_gauge,
            auth_failures,
            panics,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_replication_started(&self, source_repo: &str, _dest_repo: &str) {
        tracing::info!(source = source_repo, "replication started");
    }

    pub fn record_replication_completed(&self, source_repo: &str, dest_repo: &str, duration: Duration) {
        self.total_replications.fetch_add(1, Ordering::Relaxed);
        self.replication_total.with_label_values(&["completed"]).inc();
        self.replication_duration
            .with_label_values(&[source_repo])
            .observe(duration.as_secs_f64());

        let mut aggregates = self.aggregates.lock().expect("aggregates mutex poisoned");
        *aggregates.source_repo_counts.entry(source_repo.to_string()).or_insert(0) += 1;
        *aggregates.dest_repo_counts.entry(dest_repo.to_string()).or_insert(0) += 1;
        tracing::info!(source = source_repo, dest = dest_repo, duration_ms = duration.as_millis() as u64, "replication completed");
    }

    pub fn record_tag_started(&self, tag: &str) {
        tracing::debug!(tag, "tag copy started");
    }

    pub fn record_tag_outcome(&self, outcome: &TagCopyOutcome) {
        let (label, error_kind) = match &outcome.result {
            TagCopyResult::Copied { layers, .. } => {
                self.layers_copied.fetch_add(*layers as u64, Ordering::Relaxed);
                ("copied", None)
            }
            TagCopyResult::Skipped { .. } => ("skipped", None),
            TagCopyResult::Failed(msg) => {
                self.total_errors.fetch_add(1, Ordering::Relaxed);
                ("failed", Some(msg.clone()))
            }
            TagCopyResult::Cancelled => ("cancelled", None),
        };
        self.tag_total.with_label_values(&[label]).inc();
        self.tag_duration
            .with_label_values(&[label])
            .observe(outcome.duration.as_secs_f64());

        self.aggregates
            .lock()
            .expect("aggregates mutex poisoned")
            .tag_latencies_ms
            .push(outcome.duration.as_secs_f64() * 1000.0);

        tracing::info!(
            tag = outcome.tag,
            outcome = label,
            error_kind = error_kind.as_deref().unwrap_or(""),
            retries = outcome.retries,
            duration_ms = outcome.duration.as_millis() as u64,
            "tag copy outcome"
        );
    }

    pub fn record_bytes_copied(&self, bytes: u64) {
        self.bytes_copied.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_http_request(&self, method: &str, status_class: &str) {
        self.http_requests.with_label_values(&[method, status_class]).inc();
    }

    pub fn record_auth_failure(&self, registry_host: &str) {
        self.auth_failures.with_label_values(&[registry_host]).inc();
    }

    pub fn record_panic(&self, component: &str) {
        self.panics.with_label_values(&[component]).inc();
    }

    pub fn set_worker_pool_gauge(&self, state: &str, value: i64) {
        self.worker_pool_gauge.with_label_values(&[state]).set(value);
    }

    pub fn snapshot(&self) -> Snapshot {
        let aggregates = self.aggregates.lock().expect("aggregates mutex poisoned");
        let average_tag_latency_ms = if aggregates.tag_latencies_ms.is_empty() {
            0.0
        } else {
            aggregates.tag_latencies_ms.iter().sum::<f64>() / aggregates.tag_latencies_ms.len() as f64
        };

        let mut top_source_repos: Vec<(String, u64)> =
            aggregates.source_repo_counts.iter().map(|(k, v)| (k.clone(), *v)).collect();
        top_source_repos.sort_by(|a, b| b.1.cmp(&a.1));
        top_source_repos.truncate(10);

        let mut top_dest_repos: Vec<(String, u64)> =
            aggregates.dest_repo_counts.iter().map(|(k, v)| (k.clone(), *v)).collect();
        top_dest_repos.sort_by(|a, b| b.1.cmp(&a.1));
        top_dest_repos.truncate(10);

        Snapshot {
            total_replications: self.total_replications.load(Ordering::Relaxed),
            total_errors: self.total_errors.load(Ordering::Relaxed),
            layers_copied: self.layers_copied.load(Ordering::Relaxed),
            bytes_copied: self.bytes_copied.load(Ordering::Relaxed),
            average_tag_latency_ms,
            top_source_repos,
            top_dest_repos,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn records_tag_outcomes_and_snapshots() {
        let sink = MetricsSink::new();
        sink.record_tag_outcome(&TagCopyOutcome {
            tag: "v1".to_string(),
            result: TagCopyResult::Copied { digest: "sha256:a".to_string(), layers: 2 },
            duration: Duration::from_millis(100),
            retries: 0,
        });
        sink.record_tag_outcome(&TagCopyOutcome {
            tag: "v2".to_string(),
            result: TagCopyResult::Failed("boom".to_string()),
            duration: Duration::from_millis(50),
            retries: 1,
        });

        let snap = sink.snapshot();
        assert_eq!(snap.layers_copied, 2);
        assert_eq!(snap.total_errors, 1);
        assert!(snap.average_tag_latency_ms > 0.0);
    }
}
