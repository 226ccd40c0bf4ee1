//! SHA-256 digest utilities for OCI manifests and blobs.
//!
//! Centralizes digest computation, validation and formatting so the wire
//! format (`sha256:<64 lowercase hex chars>`) is checked in exactly one
//! place. The manifest digest invariant (the manifest's own digest equals
//! the SHA-256 of its canonical bytes) and the blob digest invariant (the
//! descriptor digest equals the SHA-256 of the bytes actually received) both
//! go through [`DigestUtils::verify_data_integrity`] /
//! [`DigestUtils::verify_stream_digest`].

use crate::error::{ReplicationError, Result};
use sha2::Digest;

/// Standard SHA-256 digest for an empty byte string.
pub const EMPTY_DIGEST_HEX: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

pub const EMPTY_DIGEST: &str =
    "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

pub struct DigestUtils;

impl DigestUtils {
    pub fn compute_sha256(data: &[u8]) -> String {
        let mut hasher = sha2::Sha256::new();
        hasher.update(data);
        format!("{:x}", hasher.finalize())
    }

    pub fn compute_docker_digest(data: &[u8]) -> String {
        format!("sha256:{}", Self::compute_sha256(data))
    }

    pub fn is_valid_sha256_hex(digest: &str) -> bool {
        digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit())
    }

    pub fn is_valid_docker_digest(digest: &str) -> bool {
        digest
            .strip_prefix("sha256:")
            .is_some_and(Self::is_valid_sha256_hex)
    }

    /// Normalize a digest to `sha256:<hex>` form, adding the prefix if absent.
    pub fn normalize_digest(digest: &str) -> Result<String> {
        if let Some(hex_part) = digest.strip_prefix("sha256:") {
            if !Self::is_valid_sha256_hex(hex_part) {
                return Err(ReplicationError::Validation(format!(
                    "invalid sha256 digest: {digest}"
                )));
            }
            Ok(digest.to_string())
        } else {
            if !Self::is_valid_sha256_hex(digest) {
                return Err(ReplicationError::Validation(format!(
                    "invalid sha256 digest: expected 64 hex chars, got '{digest}'"
                )));
            }
            Ok(format!("sha256:{digest}"))
        }
    }

    pub fn extract_hex_part(digest: &str) -> Result<&str> {
        digest
            .strip_prefix("sha256:")
            .filter(|hex| Self::is_valid_sha256_hex(hex))
            .ok_or_else(|| ReplicationError::Validation(format!("malformed digest: {digest}")))
    }

    /// Verify that `data` hashes to `expected_digest`. Used on the receive
    /// side of a Blob Transfer; a mismatch is never retried.
    pub fn verify_data_integrity(data: &[u8], expected_digest: &str) -> Result<()> {
        let computed = Self::compute_sha256(data);
        let expected_hex = Self::extract_hex_part(expected_digest)?;
        if computed != expected_hex {
            return Err(ReplicationError::DigestMismatch {
                expected: expected_digest.to_string(),
                actual: format!("sha256:{computed}"),
            });
        }
        Ok(())
    }

    /// Stream-verify by hashing chunks as they are copied, without buffering
    /// the whole blob. Returns the running digest so a caller doing
    /// chunk-at-a-time I/O can check it once the stream is exhausted.
    pub fn verify_stream_digest(hasher: &sha2::Sha256, expected_digest: &str) -> Result<()> {
        let computed = format!("{:x}", hasher.clone().finalize());
        let expected_hex = Self::extract_hex_part(expected_digest)?;
        if computed != expected_hex {
            return Err(ReplicationError::DigestMismatch {
                expected: expected_digest.to_string(),
                actual: format!("sha256:{computed}"),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_sha256_matches_known_vector() {
        let digest = DigestUtils::compute_sha256(b"hello world");
        assert_eq!(
            digest,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn empty_digest_constant_is_correct() {
        assert_eq!(DigestUtils::compute_sha256(b""), EMPTY_DIGEST_HEX);
    }

    #[test]
    fn normalize_accepts_bare_hex_and_prefixed() {
        let hex = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";
        assert_eq!(
            DigestUtils::normalize_digest(hex).unwrap(),
            format!("sha256:{hex}")
        );
        assert_eq!(
            DigestUtils::normalize_digest(&format!("sha256:{hex}")).unwrap(),
            format!("sha256:{hex}")
        );
    }

    #[test]
    fn rejects_malformed_digest() {
        assert!(DigestUtils::normalize_digest("not-a-digest").is_err());
        assert!(!DigestUtils::is_valid_docker_digest("sha256:short"));
    }

    #[test]
    fn verify_data_integrity_detects_mismatch() {
        let data = b"hello world";
        let good = "sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";
        assert!(DigestUtils::verify_data_integrity(data, good).is_ok());

        let bad = "sha256:0000000000000000000000000000000000000000000000000000000000000000";
        match DigestUtils::verify_data_integrity(data, bad) {
            Err(ReplicationError::DigestMismatch { .. }) => {}
            other => panic!("expected DigestMismatch, got {other:?}"),
        }
    }
}
