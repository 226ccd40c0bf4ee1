//! In-memory [`RegistryTransport`] with scripted responses and fault
//! injection, used by the tag-copier and orchestrator end-to-end tests
//! instead of a live registry.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{ReplicationError, Result};
use crate::registry::transport::{ByteStream, ManifestHead, RegistryTransport, UploadSession};

#[derive(Debug, Clone)]
struct StoredManifest {
    data: Vec<u8>,
    content_type: String,
    digest: String,
}

#[derive(Default)]
struct Store {
    manifests: HashMap<(String, String), StoredManifest>,
    blobs: HashMap<(String, String), Vec<u8>>,
    tags: HashMap<String, Vec<String>>,
}

/// Scripted failure: the Nth call (1-indexed, per `op`/`repo`/`digest` key)
/// returns this error instead of the normal response; after
/// `remaining_failures` hits zero, the call succeeds normally.
#[derive(Clone)]
pub struct FaultScript {
    pub op: String,
    pub key: String,
    pub remaining_failures: Arc<AtomicUsize>,
    pub error: fn() -> ReplicationError,
}

pub struct FakeTransport {
    store: Mutex<Store>,
    faults: Mutex<Vec<FaultScript>>,
    pub blob_puts: AtomicU64,
    pub manifest_puts: AtomicU64,
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(Store::default()),
            faults: Mutex::new(Vec::new()),
            blob_puts: AtomicU64::new(0),
            manifest_puts: AtomicU64::new(0),
        }
    }

    pub async fn inject_fault(&self, fault: FaultScript) {
        self.faults.lock().await.push(fault);
    }

    async fn maybe_fail(&self, op: &str, key: &str) -> Result<()> {
        let faults = self.faults.lock().await;
        for f in faults.iter() {
            if f.op == op && f.key == key {
                let remaining = f.remaining_failures.load(Ordering::SeqCst);
                if remaining > 0 {
                    f.remaining_failures.fetch_sub(1, Ordering::SeqCst);
                    return Err((f.error)());
                }
            }
        }
        Ok(())
    }

    /// Seeds a source-side manifest and its layer blobs, as if pushed there
    /// out of band.
    pub async fn seed(
        &self,
        repo: &str,
        reference: &str,
        data: Vec<u8>,
        content_type: &str,
        digest: &str,
        blobs: Vec<(String, Vec<u8>)>,
    ) {
        let mut store = self.store.lock().await;
        store.manifests.insert(
            (repo.to_string(), reference.to_string()),
            StoredManifest {
                data,
                content_type: content_type.to_string(),
                digest: digest.to_string(),
            },
        );
        store
            .tags
            .entry(repo.to_string())
            .or_default()
            .push(reference.to_string());
        for (d, bytes) in blobs {
            store.blobs.insert((repo.to_string(), d), bytes);
        }
    }

    pub async fn manifest_digest(&self, repo: &str, reference: &str) -> Option<String> {
        self.store
            .lock()
            .await
            .manifests
            .get(&(repo.to_string(), reference.to_string()))
            .map(|m| m.digest.clone())
    }
}

#[async_trait]
impl RegistryTransport for FakeTransport {
    async fn head_manifest(&self, repo: &str, reference: &str) -> Result<Option<ManifestHead>> {
        self.maybe_fail("head_manifest", reference).await?;
        let store = self.store.lock().await;
        Ok(store
            .manifests
            .get(&(repo.to_string(), reference.to_string()))
            .map(|m| ManifestHead {
                digest: m.digest.clone(),
                content_type: m.content_type.clone(),
            }))
    }

    async fn get_manifest(&self, repo: &str, reference: &str) -> Result<(Vec<u8>, String)> {
        self.maybe_fail("get_manifest", reference).await?;
        let store = self.store.lock().await;
        store
            .manifests
            .get(&(repo.to_string(), reference.to_string()))
            .map(|m| (m.data.clone(), m.content_type.clone()))
            .ok_or_else(|| ReplicationError::NotFound(format!("{repo}:{reference}")))
    }

    async fn put_manifest(
        &self,
        repo: &str,
        reference: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        self.maybe_fail("put_manifest", reference).await?;
        self.manifest_puts.fetch_add(1, Ordering::Relaxed);
        let digest = crate::digest::DigestUtils::compute_docker_digest(&data);
        let mut store = self.store.lock().await;
        store.manifests.insert(
            (repo.to_string(), reference.to_string()),
            StoredManifest {
                data,
                content_type: content_type.to_string(),
                digest,
            },
        );
        store
            .tags
            .entry(repo.to_string())
            .or_default()
            .push(reference.to_string());
        Ok(())
    }

    async fn head_blob(&self, repo: &str, digest: &str) -> Result<bool> {
        self.maybe_fail("head_blob", digest).await?;
        let store = self.store.lock().await;
        Ok(store.blobs.contains_key(&(repo.to_string(), digest.to_string())))
    }

    async fn get_blob_stream(&self, repo: &str, digest: &str) -> Result<ByteStream> {
        self.maybe_fail("get_blob_stream", digest).await?;
        let store = self.store.lock().await;
        let data = store
            .blobs
            .get(&(repo.to_string(), digest.to_string()))
            .cloned()
            .ok_or_else(|| ReplicationError::NotFound(format!("blob {digest}")))?;
        let chunks: Vec<Result<Bytes>> = data
            .chunks(64 * 1024)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }

    async fn start_blob_upload(&self, repo: &str) -> Result<UploadSession> {
        Ok(UploadSession {
            location: format!("fake://{repo}/uploads/{}", uuid::Uuid::new_v4()),
        })
    }

    async fn put_blob_stream(
        &self,
        session: &UploadSession,
        digest: &str,
        mut body: ByteStream,
        _content_length: u64,
    ) -> Result<()> {
        use futures_util::StreamExt;
        self.maybe_fail("put_blob_stream", digest).await?;
        self.blob_puts.fetch_add(1, Ordering::Relaxed);

        let mut buf = Vec::new();
        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        crate::digest::DigestUtils::verify_data_integrity(&buf, digest)?;

        let repo = session
            .location
            .strip_prefix("fake://")
            .and_then(|s| s.split("/uploads/").next())
            .unwrap_or_default()
            .to_string();
        let mut store = self.store.lock().await;
        store.blobs.insert((repo, digest.to_string()), buf);
        Ok(())
    }

    async fn mount_blob(&self, target_repo: &str, source_repo: &str, digest: &str) -> Result<bool> {
        let mut store = self.store.lock().await;
        if let Some(bytes) = store
            .blobs
            .get(&(source_repo.to_string(), digest.to_string()))
            .cloned()
        {
            store.blobs.insert((target_repo.to_string(), digest.to_string()), bytes);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn list_tags(&self, repo: &str) -> Result<Vec<String>> {
        let store = self.store.lock().await;
        Ok(store.tags.get(repo).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeded_manifest_roundtrips() {
        let fake = FakeTransport::new();
        fake.seed(
            "app",
            "v1",
            b"{}".to_vec(),
            "application/vnd.oci.image.manifest.v1+json",
            "sha256:deadbeef",
            vec![],
        )
        .await;
        let head = fake.head_manifest("app", "v1").await.unwrap();
        assert!(head.is_some());
        assert_eq!(fake.list_tags("app").await.unwrap(), vec!["v1".to_string()]);
    }

    #[tokio::test]
    async fn fault_injection_fails_then_succeeds() {
        let fake = FakeTransport::new();
        fake.inject_fault(FaultScript {
            op: "head_manifest".to_string(),
            key: "v1".to_string(),
            remaining_failures: Arc::new(AtomicUsize::new(1)),
            error: || ReplicationError::transient("simulated 503", 0),
        })
        .await;

        assert!(fake.head_manifest("app", "v1").await.is_err());
        assert!(fake.head_manifest("app", "v1").await.unwrap().is_none());
    }
}
