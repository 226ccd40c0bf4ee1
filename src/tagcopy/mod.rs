//! Per-tag state machine: `Init -> HeadDestination -> FetchSourceManifest ->
//! TransferLayers -> EvaluatePolicy -> UploadDestManifest -> Done`, with
//! terminal branches `Skipped` (destination already matches) and `Failed`.
//!
//! Modeled as an explicit, non-generic `enum` driven by a `step()`-style
//! async loop rather than a generic state-machine framework, matching the
//! concrete style the rest of this crate's pipeline code uses.

pub mod blob;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::error::{ReplicationError, Result};
use crate::oci::manifest::{is_oci_manifest_media_type, Manifest};
use crate::registry::RegistryTransport;
use crate::signing::{EnforcementMode, Policy, PolicyEngine, SignatureVerifier};

/// Gates the destination manifest upload on signature verification + policy
/// evaluation of the source manifest's digest. Optional: a job with no gate
/// skips straight from layer transfer to upload, unchanged from before
/// signing existed.
pub struct PolicyGate {
    pub verifier: Arc<SignatureVerifier>,
    pub policy: Policy,
}

#[derive(Clone)]
pub struct TagCopyJob {
    pub source_repo: String,
    pub dest_repo: String,
    pub tag: String,
    pub intra_tag_concurrency: usize,
    pub max_layer_attempts: usize,
    pub policy_gate: Option<Arc<PolicyGate>>,
}

impl std::fmt::Debug for TagCopyJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagCopyJob")
            .field("source_repo", &self.source_repo)
            .field("dest_repo", &self.dest_repo)
            .field("tag", &self.tag)
            .field("intra_tag_concurrency", &self.intra_tag_concurrency)
            .field("max_layer_attempts", &self.max_layer_attempts)
            .field("policy_gate", &self.policy_gate.is_some())
            .finish()
    }
}

#[derive(Debug)]
pub enum TagCopyState {
    Init,
    HeadDestination,
    FetchSourceManifest,
    TransferLayers { manifest: Manifest },
    EvaluatePolicy { manifest: Manifest },
    UploadDestManifest { manifest: Manifest },
    Done,
    Skipped { digest: String },
    Failed(ReplicationError),
}

#[derive(Debug, Clone)]
pub struct TagCopyOutcome {
    pub tag: String,
    pub result: TagCopyResult,
    pub duration: Duration,
    pub retries: u32,
}

#[derive(Debug, Clone)]
pub enum TagCopyResult {
    Copied { digest: String, layers: usize },
    Skipped { digest: String },
    Failed(String),
    Cancelled,
}

/// Drives one tag through the full state machine. `source` and `dest` may
/// be the same transport (same registry) or different ones (cross-registry
/// replication); `source_repo`/`dest_repo` let the same repository name
/// differ between them.
pub async fn copy_tag(
    source: &dyn RegistryTransport,
    dest: &dyn RegistryTransport,
    job: &TagCopyJob,
    cancel: CancellationToken,
) -> TagCopyOutcome {
    let start = Instant::now();
    let mut retries = 0u32;
    let mut state = TagCopyState::Init;

    loop {
        if cancel.is_cancelled() {
            return TagCopyOutcome {
                tag: job.tag.clone(),
                result: TagCopyResult::Cancelled,
                duration: start.elapsed(),
                retries,
            };
        }

        state = match state {
            TagCopyState::Init => TagCopyState::HeadDestination,

            TagCopyState::HeadDestination => {
                match head_destination(source, dest, job).await {
                    Ok(Some(digest)) => TagCopyState::Skipped { digest },
                    Ok(None) => TagCopyState::FetchSourceManifest,
                    Err(e) => TagCopyState::Failed(e),
                }
            }

            TagCopyState::FetchSourceManifest => match fetch_source_manifest(source, job).await {
                Ok(manifest) => TagCopyState::TransferLayers { manifest },
                Err(e) => TagCopyState::Failed(e),
            },

            TagCopyState::TransferLayers { manifest } => {
                match transfer_layers(source, dest, job, &manifest, cancel.clone()).await {
                    Ok(layer_retries) => {
                        retries += layer_retries;
                        TagCopyState::EvaluatePolicy { manifest }
                    }
                    Err(e) => TagCopyState::Failed(e),
                }
            }

            TagCopyState::EvaluatePolicy { manifest } => match evaluate_policy(source, job, &manifest).await {
                Ok(()) => TagCopyState::UploadDestManifest { manifest },
                Err(e) => TagCopyState::Failed(e),
            },

            TagCopyState::UploadDestManifest { manifest } => {
                match dest
                    .put_manifest(
                        &job.dest_repo,
                        &job.tag,
                        manifest.raw_bytes().to_vec(),
                        &manifest.content_type,
                    )
                    .await
                {
                    Ok(()) => {
                        let digest = manifest.digest();
                        let layers = manifest.layers().len();
                        return TagCopyOutcome {
                            tag: job.tag.clone(),
                            result: TagCopyResult::Copied { digest, layers },
                            duration: start.elapsed(),
                            retries,
                        };
                    }
                    Err(e) => TagCopyState::Failed(e),
                }
            }

            TagCopyState::Skipped { digest } => {
                return TagCopyOutcome {
                    tag: job.tag.clone(),
                    result: TagCopyResult::Skipped { digest },
                    duration: start.elapsed(),
                    retries,
                };
            }

            TagCopyState::Failed(e) => {
                return TagCopyOutcome {
                    tag: job.tag.clone(),
                    result: TagCopyResult::Failed(e.to_string()),
                    duration: start.elapsed(),
                    retries,
                };
            }

            TagCopyState::Done => unreachable!("Done is not a looped-through state"),
        };
    }
}

/// Returns `Some(digest)` (destination already holds this manifest,
/// transition to Skipped) when destination HEAD matches the source's
/// current digest, `None` (transition to FetchSourceManifest) on a miss or
/// a digest mismatch.
async fn head_destination(
    source: &dyn RegistryTransport,
    dest: &dyn RegistryTransport,
    job: &TagCopyJob,
) -> Result<Option<String>> {
    let dest_head = dest.head_manifest(&job.dest_repo, &job.tag).await?;
    let Some(dest_head) = dest_head else {
        return Ok(None);
    };
    let source_head = source.head_manifest(&job.source_repo, &job.tag).await?;
    match source_head {
        Some(source_head) if source_head.digest == dest_head.digest => Ok(Some(dest_head.digest)),
        _ => Ok(None),
    }
}

/// Verifies the source manifest's signatures against the configured policy
/// before the destination upload proceeds. A no-op when the job has no
/// policy gate configured.
///
/// `enforcement_mode` decides what happens once a violation is found:
/// `enforce` fails the tag; `warn` logs a warning and lets it continue;
/// `audit` logs quietly and lets it continue.
async fn evaluate_policy(source: &dyn RegistryTransport, job: &TagCopyJob, manifest: &Manifest) -> Result<()> {
    let Some(gate) = &job.policy_gate else {
        return Ok(());
    };
    let digest = manifest.digest();
    let signatures = match gate.verifier.verify(source, &job.source_repo, &digest, gate.policy.require_rekor).await {
        Ok(signatures) => signatures,
        Err(ReplicationError::NoSignatures(_)) => Vec::new(),
        Err(e) if gate.policy.enforcement_mode != EnforcementMode::Enforce => {
            tracing::warn!(tag = %job.tag, error = %e, "signature verification failed, not enforced");
            Vec::new()
        }
        Err(e) => return Err(ReplicationError::PolicyDenied(e.to_string())),
    };

    let evaluation = PolicyEngine::evaluate(&gate.policy, &signatures);
    for warning in &evaluation.warnings {
        match gate.policy.enforcement_mode {
            EnforcementMode::Audit => tracing::info!(tag = %job.tag, reason = %warning, "policy violation (audit)"),
            _ => tracing::warn!(tag = %job.tag, reason = %warning, "policy violation not enforced"),
        }
    }

    if evaluation.passed {
        Ok(())
    } else {
        Err(ReplicationError::PolicyDenied(evaluation.errors.join("; ")))
    }
}

async fn fetch_source_manifest(source: &dyn RegistryTransport, job: &TagCopyJob) -> Result<Manifest> {
    let (data, content_type) = source.get_manifest(&job.source_repo, &job.tag).await?;
    if !is_oci_manifest_media_type(&content_type) {
        return Err(ReplicationError::Validation(format!(
            "source manifest has unsupported content-type: {content_type}"
        )));
    }
    Manifest::parse(data, content_type)
}

/// Fans layer transfers out over a semaphore sized `min(intra_tag_concurrency,
/// layers.len())`. A single layer's exhausted retries or non-retryable
/// failure cancels the per-tag token, which the sibling transfers observe
/// and stop early on their next suspension point.
async fn transfer_layers(
    source: &dyn RegistryTransport,
    dest: &dyn RegistryTransport,
    job: &TagCopyJob,
    manifest: &Manifest,
    cancel: CancellationToken,
) -> Result<u32> {
    let layers = manifest.layers().to_vec();
    if layers.is_empty() {
        return Ok(0);
    }
    let permits = job.intra_tag_concurrency.min(layers.len()).max(1);
    let semaphore = Arc::new(Semaphore::new(permits));

    let mut handles = Vec::with_capacity(layers.len());
    for descriptor in layers {
        let semaphore = semaphore.clone();
        let source_repo = job.source_repo.clone();
        let dest_repo = job.dest_repo.clone();
        let max_attempts = job.max_layer_attempts;
        let cancel = cancel.clone();
        // SAFETY-FREE NOTE: transfer_layer_with_retry borrows `source`/`dest`
        // for the lifetime of the future; since this function is itself
        // awaited to completion before returning, the borrow outlives every
        // spawned task here even though they run via join_all rather than
        // tokio::spawn (spawning would require `'static` transports).
        let fut = async move {
            let _permit = semaphore.acquire_owned().await.map_err(|_| ReplicationError::Cancelled)?;
            tokio::select! {
                result = blob::transfer_layer_with_retry(source, dest, &source_repo, &dest_repo, &descriptor, max_attempts) => result,
                _ = cancel.cancelled() => Err(ReplicationError::Cancelled),
            }
        };
        handles.push(fut);
    }

    let results = futures::future::join_all(handles).await;
    let mut total_retries = 0u32;
    for result in results {
        match result {
            Ok((_, retries)) => total_retries += retries,
            Err(e) => {
                cancel.cancel();
                return Err(e);
            }
        }
    }
    Ok(total_retries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::DigestUtils;
    use crate::registry::FakeTransport;
    use crate::oci::manifest::OCI_MANIFEST_MEDIA_TYPE;

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

    fn job() -> TagCopyJob {
        TagCopyJob {
            source_repo: "app".to_string(),
            dest_repo: "app".to_string(),
            tag: "v1".to_string(),
            intra_tag_concurrency: 4,
            max_layer_attempts: 3,
            policy_gate: None,
        }
    }

    #[tokio::test]
    async fn happy_path_copies_tag() {
        let source = FakeTransport::new();
        let dest = FakeTransport::new();
        let layer_data = b"hello world".to_vec();
        let layer_digest = DigestUtils::compute_docker_digest(&layer_data);
        let manifest = manifest_bytes(&layer_digest);

        source
            .seed(
                "app",
                "v1",
                manifest,
                OCI_MANIFEST_MEDIA_TYPE,
                "sha256:whatever",
                vec![(layer_digest, layer_data)],
            )
            .await;

        let outcome = copy_tag(&source, &dest, &job(), CancellationToken::new()).await;
        match outcome.result {
            TagCopyResult::Copied { layers, .. } => assert_eq!(layers, 1),
            other => panic!("expected Copied, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn idempotent_rerun_skips() {
        let source = FakeTransport::new();
        let dest = FakeTransport::new();
        let layer_data = b"hello world".to_vec();
        let layer_digest = DigestUtils::compute_docker_digest(&layer_data);
        let manifest = manifest_bytes(&layer_digest);

        source
            .seed(
                "app",
                "v1",
                manifest.clone(),
                OCI_MANIFEST_MEDIA_TYPE,
                "sha256:whatever",
                vec![(layer_digest.clone(), layer_data)],
            )
            .await;
        dest.seed("app", "v1", manifest, OCI_MANIFEST_MEDIA_TYPE, "sha256:whatever", vec![])
            .await;

        let outcome = copy_tag(&source, &dest, &job(), CancellationToken::new()).await;
        assert!(matches!(outcome.result, TagCopyResult::Skipped { .. }));
    }

    #[tokio::test]
    async fn missing_source_manifest_fails_tag() {
        let source = FakeTransport::new();
        let dest = FakeTransport::new();
        let outcome = copy_tag(&source, &dest, &job(), CancellationToken::new()).await;
        assert!(matches!(outcome.result, TagCopyResult::Failed(_)));
    }

    #[tokio::test]
    async fn policy_gate_denies_unsigned_manifest_before_upload() {
        use crate::signing::{Policy, EnforcementMode, SignatureVerifier};

        let source = FakeTransport::new();
        let dest = FakeTransport::new();
        let layer_data = b"hello world".to_vec();
        let layer_digest = DigestUtils::compute_docker_digest(&layer_data);
        let manifest = manifest_bytes(&layer_digest);

        source
            .seed(
                "app",
                "v1",
                manifest,
                OCI_MANIFEST_MEDIA_TYPE,
                "sha256:whatever",
                vec![(layer_digest, layer_data)],
            )
            .await;

        let mut gated_job = job();
        gated_job.policy_gate = Some(Arc::new(PolicyGate {
            verifier: Arc::new(SignatureVerifier::new(None)),
            policy: Policy {
                require_signature: true,
                min_signatures: 1,
                enforcement_mode: EnforcementMode::Enforce,
                allowed_issuers: vec![],
                allowed_signers: vec![],
                denied_signers: vec![],
                key_requirements: None,
                require_rekor: false,
            },
        }));

        let outcome = copy_tag(&source, &dest, &gated_job, CancellationToken::new()).await;
        assert!(matches!(outcome.result, TagCopyResult::Failed(_)));
        assert!(dest.head_manifest("app", "v1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn warn_mode_copies_despite_unsigned_manifest() {
        use crate::signing::{Policy, EnforcementMode, SignatureVerifier};

        let source = FakeTransport::new();
        let dest = FakeTransport::new();
        let layer_data = b"hello world".to_vec();
        let layer_digest = DigestUtils::compute_docker_digest(&layer_data);
        let manifest = manifest_bytes(&layer_digest);

        source
            .seed(
                "app",
                "v1",
                manifest,
                OCI_MANIFEST_MEDIA_TYPE,
                "sha256:whatever",
                vec![(layer_digest, layer_data)],
            )
            .await;

        let mut gated_job = job();
        gated_job.policy_gate = Some(Arc::new(PolicyGate {
            verifier: Arc::new(SignatureVerifier::new(None)),
            policy: Policy {
                require_signature: true,
                min_signatures: 1,
                enforcement_mode: EnforcementMode::Warn,
                allowed_issuers: vec![],
                allowed_signers: vec![],
                denied_signers: vec![],
                key_requirements: None,
                require_rekor: false,
            },
        }));

        let outcome = copy_tag(&source, &dest, &gated_job, CancellationToken::new()).await;
        assert!(matches!(outcome.result, TagCopyResult::Copied { .. }));
        assert!(dest.head_manifest("app", "v1").await.unwrap().is_some());
    }
}
