//! Blob Transfer: given (source-ref, dest-ref, layer-descriptor), confirm
//! the blob is already present at destination or stream it across without
//! buffering the whole layer in memory.

use bytes::BytesMut;
use futures_util::StreamExt;
use sha2::{Digest as _, Sha256};

use crate::digest::DigestUtils;
use crate::error::{backoff_delay, ReplicationError, Result};
use crate::oci::manifest::Descriptor;
use crate::registry::RegistryTransport;
use std::time::Duration;

/// Accumulate reads against this boundary before treating a chunk as
/// "transferred" for yield-scheduling purposes.
const CHUNK_BOUNDARY_BYTES: usize = 50 * 1024 * 1024;
/// Yield the scheduler after this many source chunks, so a long blob
/// doesn't monopolize a worker thread between awaits.
const YIELD_EVERY_N_CHUNKS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Blob already existed at destination (mounted or previously pushed).
    Mounted,
    /// Blob was streamed from source to destination.
    Copied,
}

/// One attempt at transferring a single layer, with no retry loop of its
/// own — [`transfer_layer_with_retry`] wraps this for the Tag Copier's
/// retry policy.
pub async fn transfer_layer(
    source: &dyn RegistryTransport,
    dest: &dyn RegistryTransport,
    source_repo: &str,
    dest_repo: &str,
    descriptor: &Descriptor,
) -> Result<TransferOutcome> {
    if dest.head_blob(dest_repo, &descriptor.digest).await? {
        return Ok(TransferOutcome::Mounted);
    }

    if source_repo != dest_repo && source.head_blob(source_repo, &descriptor.digest).await.unwrap_or(false) {
        if dest.mount_blob(dest_repo, source_repo, &descriptor.digest).await? {
            return Ok(TransferOutcome::Mounted);
        }
    }

    let session = dest.start_blob_upload(dest_repo).await?;
    let source_stream = source.get_blob_stream(source_repo, &descriptor.digest).await?;
    let hasher = std::sync::Arc::new(std::sync::Mutex::new(Sha256::new()));

    // Re-chunks the source stream into ~CHUNK_BOUNDARY_BYTES pieces and hands
    // each one to the destination PUT as it is produced, so only one
    // boundary-sized piece is ever held in memory rather than the whole blob.
    let rechunked = futures_util::stream::unfold(
        (source_stream, BytesMut::with_capacity(64 * 1024), 0usize, hasher.clone(), false),
        |(mut src, mut buffered, mut chunk_count, hasher, mut done)| async move {
            if done {
                return None;
            }
            loop {
                match src.next().await {
                    Some(Ok(chunk)) => {
                        hasher.lock().unwrap().update(&chunk);
                        buffered.extend_from_slice(&chunk);
                        chunk_count += 1;
                        if chunk_count % YIELD_EVERY_N_CHUNKS == 0 {
                            tokio::task::yield_now().await;
                        }
                        if buffered.len() >= CHUNK_BOUNDARY_BYTES {
                            let piece = buffered.split().freeze();
                            return Some((Ok(piece), (src, buffered, chunk_count, hasher, done)));
                        }
                    }
                    Some(Err(e)) => {
                        done = true;
                        return Some((Err(e), (src, buffered, chunk_count, hasher, done)));
                    }
                    None => {
                        done = true;
                        if buffered.is_empty() {
                            return None;
                        }
                        let piece = buffered.split().freeze();
                        return Some((Ok(piece), (src, buffered, chunk_count, hasher, done)));
                    }
                }
            }
        },
    );

    let body = Box::pin(rechunked);
    dest.put_blob_stream(&session, &descriptor.digest, body, descriptor.size).await?;

    let final_hasher = hasher.lock().unwrap().clone();
    DigestUtils::verify_stream_digest(&final_hasher, &descriptor.digest)?;

    Ok(TransferOutcome::Copied)
}

/// Wraps [`transfer_layer`] with the layer-level retry policy: transient
/// failures (timeouts, 5xx, resets) retry with exponential backoff (initial
/// 200ms, factor 2, up to `max_attempts` total attempts, jitter +/-25%);
/// everything else (digest mismatch, 4xx) fails immediately.
pub async fn transfer_layer_with_retry(
    source: &dyn RegistryTransport,
    dest: &dyn RegistryTransport,
    source_repo: &str,
    dest_repo: &str,
    descriptor: &Descriptor,
    max_attempts: usize,
) -> Result<(TransferOutcome, u32)> {
    let mut attempt = 0u32;
    loop {
        match transfer_layer(source, dest, source_repo, dest_repo, descriptor).await {
            Ok(outcome) => return Ok((outcome, attempt)),
            Err(e) if e.is_retryable() && (attempt as usize) + 1 < max_attempts => {
                let delay = backoff_delay(attempt, Duration::from_millis(200), 2.0, 0.25);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FakeTransport;

    fn descriptor(digest: &str, size: u64) -> Descriptor {
        Descriptor {
            media_type: "application/vnd.oci.image.layer.v1.tar+gzip".to_string(),
            digest: digest.to_string(),
            size,
            annotations: None,
        }
    }

    #[tokio::test]
    async fn copies_when_absent_at_destination() {
        let source = FakeTransport::new();
        let dest = FakeTransport::new();
        let data = b"hello layer".to_vec();
        let digest = DigestUtils::compute_docker_digest(&data);
        source.seed("app", "v1", vec![], "x", "x", vec![(digest.clone(), data)]).await;

        let outcome = transfer_layer(&source, &dest, "app", "app", &descriptor(&digest, 11))
            .await
            .unwrap();
        assert_eq!(outcome, TransferOutcome::Copied);
        assert!(dest.head_blob("app", &digest).await.unwrap());
    }

    #[tokio::test]
    async fn mounted_when_already_present() {
        let source = FakeTransport::new();
        let dest = FakeTransport::new();
        let data = b"already there".to_vec();
        let digest = DigestUtils::compute_docker_digest(&data);
        dest.seed("app", "v1", vec![], "x", "x", vec![(digest.clone(), data)]).await;

        let outcome = transfer_layer(&source, &dest, "app", "app", &descriptor(&digest, 13))
            .await
            .unwrap();
        assert_eq!(outcome, TransferOutcome::Mounted);
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        use crate::registry::fake::FaultScript;
        use std::sync::atomic::AtomicUsize;
        use std::sync::Arc;

        let source = FakeTransport::new();
        let dest = FakeTransport::new();
        let data = b"retry me".to_vec();
        let digest = DigestUtils::compute_docker_digest(&data);
        source.seed("app", "v1", vec![], "x", "x", vec![(digest.clone(), data)]).await;

        dest.inject_fault(FaultScript {
            op: "put_blob_stream".to_string(),
            key: digest.clone(),
            remaining_failures: Arc::new(AtomicUsize::new(2)),
            error: || ReplicationError::transient("simulated 503", 0),
        })
        .await;

        let (outcome, retries) =
            transfer_layer_with_retry(&source, &dest, "app", "app", &descriptor(&digest, 8), 3)
                .await
                .unwrap();
        assert_eq!(outcome, TransferOutcome::Copied);
        assert_eq!(retries, 2);
    }
}
