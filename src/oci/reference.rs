//! Image reference parsing: (registry-host, repository-path, tag or digest).
//!
//! A reference is either tag-qualified or digest-qualified, never both;
//! digests are content-addressable and immutable, so a digest-qualified
//! reference never needs a HeadDestination round trip to know whether it
//! has changed.

use crate::common::utils::ValidationUtils;
use crate::digest::DigestUtils;
use crate::error::{ReplicationError, Result};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Qualifier {
    Tag(String),
    Digest(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    pub registry_host: String,
    pub repository: String,
    pub qualifier: Qualifier,
}

impl ImageReference {
    pub fn new(
        registry_host: impl Into<String>,
        repository: impl Into<String>,
        qualifier: Qualifier,
    ) -> Result<Self> {
        let repository = repository.into();
        ValidationUtils::validate_repository(&repository)?;
        if let Qualifier::Digest(ref d) = qualifier {
            DigestUtils::normalize_digest(d)?;
        }
        Ok(Self {
            registry_host: registry_host.into(),
            repository,
            qualifier,
        })
    }

    pub fn with_tag(registry_host: impl Into<String>, repository: impl Into<String>, tag: impl Into<String>) -> Result<Self> {
        let tag = tag.into();
        ValidationUtils::validate_reference(&tag)?;
        Self::new(registry_host, repository, Qualifier::Tag(tag))
    }

    /// Parses `host/repo:tag` or `host/repo@sha256:...`. A bare `host/repo`
    /// with no qualifier defaults the tag to `latest`, matching the
    /// teacher's `RegistryConfig::parse_url` convention.
    pub fn parse(s: &str) -> Result<Self> {
        let (host, rest) = s.split_once('/').ok_or_else(|| {
            ReplicationError::Validation(format!("reference missing '/': {s}"))
        })?;

        if let Some((repo, digest)) = rest.split_once('@') {
            return Self::new(host, repo, Qualifier::Digest(digest.to_string()));
        }

        match rest.rfind(':') {
            Some(pos) => {
                let (repo, tag) = (&rest[..pos], &rest[pos + 1..]);
                Self::with_tag(host, repo, tag)
            }
            None => Self::with_tag(host, rest, "latest"),
        }
    }

    pub fn is_digest_qualified(&self) -> bool {
        matches!(self.qualifier, Qualifier::Digest(_))
    }

    /// The path segment of the OCI Distribution endpoint for this reference,
    /// e.g. `manifests/v1` or `manifests/sha256:abc...`.
    pub fn manifest_path_segment(&self) -> String {
        match &self.qualifier {
            Qualifier::Tag(t) => t.clone(),
            Qualifier::Digest(d) => d.clone(),
        }
    }

    pub fn with_qualifier(&self, qualifier: Qualifier) -> Self {
        Self {
            registry_host: self.registry_host.clone(),
            repository: self.repository.clone(),
            qualifier,
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Qualifier::Tag(t) => write!(f, "{}/{}:{}", self.registry_host, self.repository, t),
            Qualifier::Digest(d) => write!(f, "{}/{}@{}", self.registry_host, self.repository, d),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tag_qualified() {
        let r = ImageReference::parse("registry.example.com/library/app:v1").unwrap();
        assert_eq!(r.registry_host, "registry.example.com");
        assert_eq!(r.repository, "library/app");
        assert_eq!(r.qualifier, Qualifier::Tag("v1".to_string()));
        assert!(!r.is_digest_qualified());
    }

    #[test]
    fn defaults_to_latest() {
        let r = ImageReference::parse("registry.example.com/app").unwrap();
        assert_eq!(r.qualifier, Qualifier::Tag("latest".to_string()));
    }

    #[test]
    fn parses_digest_qualified() {
        let digest = "sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";
        let r = ImageReference::parse(&format!("registry.example.com/app@{digest}")).unwrap();
        assert!(r.is_digest_qualified());
        assert_eq!(r.qualifier, Qualifier::Digest(digest.to_string()));
    }

    #[test]
    fn rejects_bad_digest() {
        let err = ImageReference::parse("registry.example.com/app@sha256:short");
        assert!(err.is_err());
    }

    #[test]
    fn display_round_trips() {
        let r = ImageReference::parse("registry.example.com/app:v2").unwrap();
        assert_eq!(r.to_string(), "registry.example.com/app:v2");
    }
}
