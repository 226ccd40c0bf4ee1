//! Production [`RegistryTransport`] over `reqwest`, wired through the
//! connection pool's reuse accounting and the shared HTTP status
//! classifier.

use async_trait::async_trait;
use futures_util::StreamExt;

use crate::error::handlers::HttpErrorClassifier;
use crate::error::{ReplicationError, Result};
use crate::pool::ConnectionPool;
use crate::registry::transport::{ByteStream, ManifestHead, RegistryTransport, UploadSession};

const MANIFEST_ACCEPT: &str = "application/vnd.oci.image.manifest.v1+json, application/vnd.oci.image.index.v1+json, application/vnd.docker.distribution.manifest.v2+json, application/vnd.docker.distribution.manifest.list.v2+json";

pub struct HttpTransport {
    base_url: String,
    skip_tls: bool,
    pool: ConnectionPool,
    token: Option<String>,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, skip_tls: bool, pool: ConnectionPool) -> Self {
        Self {
            base_url: base_url.into(),
            skip_tls,
            pool,
            token: None,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Acquires a pooled client scoped to this transport's host. The
    /// `skip_tls` builder option only matters the first time a host's pool
    /// builds a fresh client; reused clients already carry it.
    async fn client(&self) -> crate::pool::PooledConnection {
        let _ = self.skip_tls; // accounted for by the pool's client construction
        self.pool.acquire(&self.base_url).await
    }

    fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }
}

#[async_trait]
impl RegistryTransport for HttpTransport {
    async fn head_manifest(&self, repo: &str, reference: &str) -> Result<Option<ManifestHead>> {
        let url = self.url(&format!("/v2/{repo}/manifests/{reference}"));
        let conn = self.client().await;
        let result = self
            .auth(conn.client.head(&url).header("Accept", MANIFEST_ACCEPT))
            .send()
            .await;
        self.pool.release(conn).await;
        let resp = result?;

        if resp.status().as_u16() == 404 {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(HttpErrorClassifier::classify(resp.status(), "manifest HEAD", ""));
        }
        let content_type = header_str(&resp, "content-type").unwrap_or_default();
        let digest = header_str(&resp, "docker-content-digest").ok_or_else(|| {
            ReplicationError::Registry("manifest HEAD missing Docker-Content-Digest".to_string())
        })?;
        Ok(Some(ManifestHead { digest, content_type }))
    }

    async fn get_manifest(&self, repo: &str, reference: &str) -> Result<(Vec<u8>, String)> {
        let url = self.url(&format!("/v2/{repo}/manifests/{reference}"));
        let conn = self.client().await;
        let result = self
            .auth(conn.client.get(&url).header("Accept", MANIFEST_ACCEPT))
            .send()
            .await;
        self.pool.release(conn).await;
        let resp = result?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(HttpErrorClassifier::classify(status, "manifest GET", &body));
        }
        let content_type = header_str(&resp, "content-type").unwrap_or_default();
        let bytes = resp.bytes().await?;
        Ok((bytes.to_vec(), content_type))
    }

    async fn put_manifest(
        &self,
        repo: &str,
        reference: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        let url = self.url(&format!("/v2/{repo}/manifests/{reference}"));
        let conn = self.client().await;
        let result = self
            .auth(
                conn.client
                    .put(&url)
                    .header("Content-Type", content_type)
                    .body(data),
            )
            .send()
            .await;
        self.pool.release(conn).await;
        let resp = result?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(HttpErrorClassifier::classify(status, "manifest PUT", &body))
        }
    }

    async fn head_blob(&self, repo: &str, digest: &str) -> Result<bool> {
        let url = self.url(&format!("/v2/{repo}/blobs/{digest}"));
        let conn = self.client().await;
        let result = self.auth(conn.client.head(&url)).send().await;
        self.pool.release(conn).await;
        Ok(result?.status().is_success())
    }

    async fn get_blob_stream(&self, repo: &str, digest: &str) -> Result<ByteStream> {
        let url = self.url(&format!("/v2/{repo}/blobs/{digest}"));
        let conn = self.client().await;
        let result = self.auth(conn.client.get(&url)).send().await;
        self.pool.release(conn).await;
        let resp = result?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(HttpErrorClassifier::classify(status, "blob GET", ""));
        }
        let stream = resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(ReplicationError::from));
        Ok(Box::pin(stream))
    }

    async fn start_blob_upload(&self, repo: &str) -> Result<UploadSession> {
        let url = self.url(&format!("/v2/{repo}/blobs/uploads/"));
        let conn = self.client().await;
        let result = self.auth(conn.client.post(&url)).send().await;
        self.pool.release(conn).await;
        let resp = result?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(HttpErrorClassifier::classify(status, "blob upload start", ""));
        }
        let location = header_str(&resp, "location")
            .ok_or_else(|| ReplicationError::Registry("upload response missing Location".to_string()))?;
        let location = if location.starts_with("http") {
            location
        } else {
            format!("{}{}", self.base_url, location)
        };
        Ok(UploadSession { location })
    }

    async fn put_blob_stream(
        &self,
        session: &UploadSession,
        digest: &str,
        body: ByteStream,
        content_length: u64,
    ) -> Result<()> {
        let sep = if session.location.contains('?') { "&" } else { "?" };
        let url = format!("{}{}digest={}", session.location, sep, digest);
        let body = reqwest::Body::wrap_stream(body);

        let conn = self.client().await;
        let result = self
            .auth(
                conn.client
                    .put(&url)
                    .header("Content-Type", "application/octet-stream")
                    .header("Content-Length", content_length.to_string())
                    .body(body),
            )
            .send()
            .await;
        self.pool.release(conn).await;
        let resp = result?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(HttpErrorClassifier::classify(status, "blob PUT", &body))
        }
    }

    async fn mount_blob(&self, target_repo: &str, source_repo: &str, digest: &str) -> Result<bool> {
        let url = self.url(&format!(
            "/v2/{target_repo}/blobs/uploads/?mount={digest}&from={source_repo}"
        ));
        let conn = self.client().await;
        let result = self.auth(conn.client.post(&url)).send().await;
        self.pool.release(conn).await;
        let resp = result?;

        match resp.status().as_u16() {
            201 => Ok(true),
            202 => Ok(false),
            _ => Err(HttpErrorClassifier::classify(resp.status(), "blob mount", "")),
        }
    }

    async fn list_tags(&self, repo: &str) -> Result<Vec<String>> {
        let url = self.url(&format!("/v2/{repo}/tags/list"));
        let conn = self.client().await;
        let result = self.auth(conn.client.get(&url)).send().await;
        self.pool.release(conn).await;
        let resp = result?;

        if resp.status().as_u16() == 404 {
            return Ok(Vec::new());
        }
        if !resp.status().is_success() {
            let status = resp.status();
            return Err(HttpErrorClassifier::classify(status, "tag list", ""));
        }
        let value: serde_json::Value = resp.json().await?;
        Ok(value
            .get("tags")
            .and_then(|t| t.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }
}

fn header_str(resp: &reqwest::Response, name: &str) -> Option<String> {
    resp.headers().get(name)?.to_str().ok().map(str::to_string)
}
