//! The injected registry transport capability: `{head, get, post, put,
//! stream-copy}` over the OCI Distribution endpoints this crate relies on.
//!
//! Concrete implementations never leak into the engine: the Tag Copier and
//! Blob Transfer only ever see `&dyn RegistryTransport`. [`http::HttpTransport`]
//! is the production implementation; [`fake::FakeTransport`] is an in-memory
//! stand-in with scripted responses and fault injection, used by the
//! end-to-end tests in `tagcopy`/`orchestrator`.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

use crate::error::Result;

/// Result of a manifest HEAD: present if the destination already has a
/// manifest under that reference.
#[derive(Debug, Clone)]
pub struct ManifestHead {
    pub digest: String,
    pub content_type: String,
}

/// An upload location returned by `start_blob_upload`, opaque to callers
/// beyond being echoed back into `put_blob_stream`.
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub location: String,
}

/// A source blob body as a stream of chunks, so `stream_copy` never has to
/// buffer a whole layer in memory.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

#[async_trait]
pub trait RegistryTransport: Send + Sync {
    /// `HEAD /v2/{repo}/manifests/{reference}`. `Ok(None)` on 404.
    async fn head_manifest(&self, repo: &str, reference: &str) -> Result<Option<ManifestHead>>;

    /// `GET /v2/{repo}/manifests/{reference}`. Returns the raw bytes and the
    /// `Content-Type` header unchanged, so the digest invariant can be
    /// checked against exactly what was received.
    async fn get_manifest(&self, repo: &str, reference: &str) -> Result<(Vec<u8>, String)>;

    /// `PUT /v2/{repo}/manifests/{reference}`. `data` must be the untouched
    /// bytes from `get_manifest` on the source side.
    async fn put_manifest(
        &self,
        repo: &str,
        reference: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<()>;

    /// `HEAD /v2/{repo}/blobs/{digest}`.
    async fn head_blob(&self, repo: &str, digest: &str) -> Result<bool>;

    /// `GET /v2/{repo}/blobs/{digest}` as a chunked stream, for source-side
    /// reads during a Blob Transfer.
    async fn get_blob_stream(&self, repo: &str, digest: &str) -> Result<ByteStream>;

    /// `POST /v2/{repo}/blobs/uploads/`. Returns the `Location` to PUT to.
    async fn start_blob_upload(&self, repo: &str) -> Result<UploadSession>;

    /// `PUT {location}&digest={sha256}`. `content_length` lets the
    /// implementation set `Content-Length` instead of chunked
    /// transfer-encoding, which some registries require.
    async fn put_blob_stream(
        &self,
        session: &UploadSession,
        digest: &str,
        body: ByteStream,
        content_length: u64,
    ) -> Result<()>;

    /// Cross-repository blob mount: `POST /v2/{target}/blobs/uploads/?mount={digest}&from={source}`.
    /// `Ok(true)` on 201 (mounted), `Ok(false)` on 202 (upload required).
    async fn mount_blob(&self, target_repo: &str, source_repo: &str, digest: &str) -> Result<bool>;

    /// `GET /v2/{repo}/tags/list`.
    async fn list_tags(&self, repo: &str) -> Result<Vec<String>>;
}
