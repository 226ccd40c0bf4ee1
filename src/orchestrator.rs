//! Replication Orchestrator: enumerates tags for a source repository, fans
//! out one Tag-Copy job per tag to the Worker Pool, and aggregates results.

use std::sync::Arc;
use std::time::Instant;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::config::ReplicationConfig;
use crate::metrics::MetricsSink;
use crate::registry::RegistryTransport;
use crate::tagcopy::{copy_tag, PolicyGate, TagCopyJob, TagCopyOutcome, TagCopyResult};
use crate::worker::WorkerPool;

#[derive(Debug, Clone, Default)]
pub struct ReplicationSummary {
    pub total: usize,
    pub copied: usize,
    pub skipped: usize,
    pub failed: usize,
    pub tags: Vec<TagCopyOutcome>,
}

pub struct ReplicationOptions {
    pub source_repo: String,
    pub dest_repo: String,
    /// When set, every tag's destination manifest upload is gated on
    /// signature verification + policy evaluation of the source manifest.
    pub policy_gate: Option<Arc<PolicyGate>>,
}

pub struct ReplicationOrchestrator {
    config: ReplicationConfig,
    metrics: Arc<MetricsSink>,
}

impl ReplicationOrchestrator {
    pub fn new(config: ReplicationConfig, metrics: Arc<MetricsSink>) -> Self {
        Self { config, metrics }
    }

    /// Enumerates the source repository's tags and copies each to the
    /// destination, aggregating outcomes. A non-zero failed count does not
    /// abort the run; only a failure to list tags at all does.
    pub async fn replicate(
        &self,
        source: Arc<dyn RegistryTransport>,
        dest: Arc<dyn RegistryTransport>,
        options: ReplicationOptions,
        cancel: CancellationToken,
    ) -> crate::error::Result<ReplicationSummary> {
        let start = Instant::now();
        self.metrics.record_replication_started(&options.source_repo, &options.dest_repo);

        let tags = source.list_tags(&options.source_repo).await?;
        if tags.is_empty() {
            self.metrics.record_replication_completed(&options.source_repo, &options.dest_repo, start.elapsed());
            return Ok(ReplicationSummary::default());
        }

        let pool: WorkerPool<crate::error::ReplicationError> =
            WorkerPool::new(self.config.worker_pool.workers, self.config.worker_pool.queue_capacity);
        let mut results_stream = pool.take_results().expect("results stream taken exactly once");

        let outcomes: Arc<tokio::sync::Mutex<Vec<TagCopyOutcome>>> = Arc::new(tokio::sync::Mutex::new(Vec::new()));

        for tag in &tags {
            let job = TagCopyJob {
                source_repo: options.source_repo.clone(),
                dest_repo: options.dest_repo.clone(),
                tag: tag.clone(),
                intra_tag_concurrency: self.config.intra_tag_concurrency,
                max_layer_attempts: self.config.retry_max_attempts,
                policy_gate: options.policy_gate.clone(),
            };
            let source = source.clone();
            let dest = dest.clone();
            let metrics = self.metrics.clone();
            let job_cancel = cancel.child_token();
            let tag_name = tag.clone();
            let outcomes = outcomes.clone();

            let work: crate::worker::Job<crate::error::ReplicationError> = Box::pin(async move {
                metrics.record_tag_started(&tag_name);
                let outcome = copy_tag(source.as_ref(), dest.as_ref(), &job, job_cancel).await;
                metrics.record_tag_outcome(&outcome);
                let result = match &outcome.result {
                    TagCopyResult::Failed(msg) => Err(crate::error::ReplicationError::Registry(msg.clone())),
                    _ => Ok(()),
                };
                outcomes.lock().await.push(outcome);
                result
            });

            if let Err(e) = pool.submit(tag.clone(), work) {
                tracing::warn!(tag = %tag, error = %e, "dropping tag copy submission: queue full");
            }
        }

        let mut summary = ReplicationSummary {
            total: tags.len(),
            ..Default::default()
        };

        let mut received = 0usize;
        while received < tags.len() {
            if results_stream.next().await.is_none() {
                break;
            }
            received += 1;
        }
        pool.wait().await;

        for outcome in outcomes.lock().await.drain(..) {
            match &outcome.result {
                TagCopyResult::Copied { .. } => summary.copied += 1,
                TagCopyResult::Skipped { .. } => summary.skipped += 1,
                TagCopyResult::Failed(_) | TagCopyResult::Cancelled => summary.failed += 1,
            }
            summary.tags.push(outcome);
        }

        self.metrics
            .record_replication_completed(&options.source_repo, &options.dest_repo, start.elapsed());
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::DigestUtils;
    use crate::oci::manifest::OCI_MANIFEST_MEDIA_TYPE;
    use crate::registry::FakeTransport;

    fn manifest_bytes(layer_digest: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "schemaVersion": 2,
            "mediaType": OCI_MANIFEST_MEDIA_TYPE,
            "config": {
                "mediaType": "application/vnd.oci.image.config.v1+json",
                "digest": "sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9",
                "size": 2
            },
            "layers": [{
                "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip",
                "digest": layer_digest,
                "size": 11
            }]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn zero_tags_completes_with_zero_counters() {
        let source = Arc::new(FakeTransport::new());
        let dest = Arc::new(FakeTransport::new());
        let orchestrator = ReplicationOrchestrator::new(ReplicationConfig::default(), Arc::new(MetricsSink::new()));
        let summary = orchestrator
            .replicate(
                source,
                dest,
                ReplicationOptions {
                    source_repo: "empty/repo".to_string(),
                    dest_repo: "empty/repo".to_string(),
                    policy_gate: None,
                },
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(summary.total, 0);
        assert_eq!(summary.copied, 0);
        assert_eq!(summary.failed, 0);
    }

    #[tokio::test]
    async fn single_tag_copies() {
        let source = Arc::new(FakeTransport::new());
        let dest = Arc::new(FakeTransport::new());
        let layer_data = b"hello world".to_vec();
        let layer_digest = DigestUtils::compute_docker_digest(&layer_data);
        source
            .seed(
                "app",
                "v1",
                manifest_bytes(&layer_digest),
                OCI_MANIFEST_MEDIA_TYPE,
                "sha256:whatever",
                vec![(layer_digest, layer_data)],
            )
            .await;

        let orchestrator = ReplicationOrchestrator::new(ReplicationConfig::default(), Arc::new(MetricsSink::new()));
        let summary = orchestrator
            .replicate(
                source,
                dest,
                ReplicationOptions {
                    source_repo: "app".to_string(),
                    dest_repo: "app".to_string(),
                    policy_gate: None,
                },
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(summary.total, 1);
        assert_eq!(summary.copied, 1);
    }
}
