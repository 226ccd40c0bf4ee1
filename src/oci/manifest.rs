//! OCI manifest and descriptor types.
//!
//! Invariant enforced here: the manifest's own digest equals the SHA-256 of
//! its canonical bytes, i.e. the exact bytes received on the wire. We never
//! re-serialize a manifest to compute its digest — `Manifest::digest` hashes
//! the bytes it was parsed from, and `UploadDestManifest` re-sends those same
//! bytes unchanged.

use crate::digest::DigestUtils;
use crate::error::{ReplicationError, Result};
use serde::{Deserialize, Serialize};

pub const OCI_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";
pub const DOCKER_MANIFEST_MEDIA_TYPE: &str =
    "application/vnd.docker.distribution.manifest.v2+json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    #[serde(rename = "mediaType")]
    pub media_type: String,
    pub digest: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<std::collections::BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestBody {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    #[serde(rename = "mediaType", skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub config: Descriptor,
    pub layers: Vec<Descriptor>,
}

/// A manifest together with the exact bytes it was parsed from, so the
/// canonical-digest invariant can be checked and the bytes re-sent verbatim.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub body: ManifestBody,
    pub content_type: String,
    raw: Vec<u8>,
}

impl Manifest {
    pub fn parse(raw: Vec<u8>, content_type: impl Into<String>) -> Result<Self> {
        let content_type = content_type.into();
        if !is_oci_manifest_media_type(&content_type) {
            return Err(ReplicationError::Validation(format!(
                "unsupported manifest content-type: {content_type}"
            )));
        }
        let body: ManifestBody = serde_json::from_slice(&raw)?;
        Ok(Self {
            body,
            content_type,
            raw,
        })
    }

    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// SHA-256 of the exact bytes this manifest was parsed from.
    pub fn digest(&self) -> String {
        DigestUtils::compute_docker_digest(&self.raw)
    }

    pub fn layers(&self) -> &[Descriptor] {
        &self.body.layers
    }
}

pub fn is_oci_manifest_media_type(content_type: &str) -> bool {
    let base = content_type.split(';').next().unwrap_or(content_type).trim();
    matches!(
        base,
        OCI_MANIFEST_MEDIA_TYPE
            | DOCKER_MANIFEST_MEDIA_TYPE
            | "application/vnd.oci.image.index.v1+json"
            | "application/vnd.docker.distribution.manifest.list.v2+json"
    )
}
