//! Signature retrieval and verification against the Sigstore convention:
//! the image digest determines a sibling tag (`sha256-<hex>.sig`) carrying
//! one manifest layer per signature, with the signature bytes, leaf
//! certificate, and chain attached as layer annotations.

use ecdsa::signature::Verifier as _;
use p256::ecdsa::{Signature as P256Signature, VerifyingKey as P256VerifyingKey};

use crate::digest::DigestUtils;
use crate::error::{ReplicationError, Result};
use crate::oci::manifest::Manifest;
use crate::registry::RegistryTransport;
use crate::signing::cert;
use crate::signing::rekor::{self, RekorClient};

pub const SIGNATURE_ANNOTATION: &str = "dev.cosignproject.cosign/signature";
pub const CERTIFICATE_ANNOTATION: &str = "dev.sigstore.cosign/certificate";
pub const CHAIN_ANNOTATION: &str = "dev.sigstore.cosign/chain";

#[derive(Debug, Clone)]
pub struct VerifiedSignature {
    pub issuer: Option<String>,
    pub subject: Option<String>,
    pub key_fingerprint: Option<String>,
    pub key_bits: Option<u32>,
    pub algorithm: String,
    pub hardware_backed: bool,
    pub rekor_verified: bool,
}

pub struct SignatureVerifier {
    rekor: Option<RekorClient>,
}

impl SignatureVerifier {
    pub fn new(rekor: Option<RekorClient>) -> Self {
        Self { rekor }
    }

    /// Retrieves and verifies every signature attached to `digest` in
    /// `repo`, via the sibling-tag convention. `require_rekor` gates
    /// whether a missing or failing Rekor entry fails the whole signature
    /// (vs. simply leaving `rekor_verified: false`).
    pub async fn verify(
        &self,
        transport: &dyn RegistryTransport,
        repo: &str,
        digest: &str,
        require_rekor: bool,
    ) -> Result<Vec<VerifiedSignature>> {
        let hex = DigestUtils::extract_hex_part(digest)?;
        let sig_tag = format!("sha256-{hex}.sig");

        if transport.head_manifest(repo, &sig_tag).await?.is_none() {
            return Err(ReplicationError::NoSignatures(format!("no signature tag {sig_tag} in {repo}")));
        }

        let (data, content_type) = transport.get_manifest(repo, &sig_tag).await?;
        let manifest = Manifest::parse(data, content_type)?;

        let mut verified = Vec::new();
        for layer in manifest.layers() {
            let annotations = layer.annotations.clone().unwrap_or_default();
            let signature_b64 = annotations
                .get(SIGNATURE_ANNOTATION)
                .ok_or_else(|| ReplicationError::Validation("signature layer missing signature annotation".into()))?;
            let cert_pem = annotations.get(CERTIFICATE_ANNOTATION);
            let chain_pem = annotations.get(CHAIN_ANNOTATION);

            let payload = read_payload(transport, repo, &layer.digest).await?;
            let one = self
                .verify_one(&payload, signature_b64, cert_pem, chain_pem, require_rekor)
                .await?;
            verified.push(one);
        }
        Ok(verified)
    }

    async fn verify_one(
        &self,
        payload: &[u8],
        signature_b64: &str,
        cert_pem: Option<&String>,
        chain_pem: Option<&String>,
        require_rekor: bool,
    ) -> Result<VerifiedSignature> {
        use base64::Engine as _;
        let sig_bytes = base64::engine::general_purpose::STANDARD
            .decode(signature_b64.as_bytes())
            .map_err(|e| ReplicationError::Validation(format!("malformed signature encoding: {e}")))?;

        let cert_pem = cert_pem.ok_or_else(|| {
            ReplicationError::Validation("key-based (non-keyless) verification is not supported".into())
        })?;
        let leaf = pem::parse(cert_pem)
            .map_err(|e| ReplicationError::Validation(format!("malformed certificate PEM: {e}")))?;
        let identity = cert::extract_identity(leaf.contents())?;

        if let Some(chain_pem) = chain_pem {
            let mut der_chain = vec![leaf.contents().to_vec()];
            for block in pem::parse_many(chain_pem)
                .map_err(|e| ReplicationError::Validation(format!("malformed chain PEM: {e}")))?
            {
                der_chain.push(block.contents().to_vec());
            }
            cert::verify_chain(&der_chain)?;
        }

        let (_, leaf_x509) = x509_parser::certificate::X509Certificate::from_der(leaf.contents())
            .map_err(|e| ReplicationError::Validation(format!("malformed leaf certificate: {e}")))?;
        let point = leaf_x509.tbs_certificate.subject_pki.subject_public_key.as_ref();
        let verifying_key = P256VerifyingKey::from_sec1_bytes(point)
            .map_err(|e| ReplicationError::Validation(format!("unsupported signing key: {e}")))?;
        let signature = P256Signature::from_der(&sig_bytes)
            .map_err(|e| ReplicationError::Validation(format!("malformed signature: {e}")))?;
        verifying_key
            .verify(payload, &signature)
            .map_err(|_| ReplicationError::Validation("signature did not verify against certificate".into()))?;

        let rekor_verified = if let Some(client) = &self.rekor {
            match self.verify_rekor_entry(client, payload).await {
                Ok(()) => true,
                Err(e) if require_rekor => return Err(e),
                Err(_) => false,
            }
        } else if require_rekor {
            return Err(ReplicationError::RekorVerificationFailed("rekor required but no client configured".into()));
        } else {
            false
        };

        Ok(VerifiedSignature {
            issuer: Some(identity.issuer),
            subject: Some(identity.subject),
            key_fingerprint: Some(DigestUtils::compute_sha256(point)),
            key_bits: Some(256),
            algorithm: "ecdsa-p256".to_string(),
            hardware_backed: false,
            rekor_verified,
        })
    }

    async fn verify_rekor_entry(&self, client: &RekorClient, payload: &[u8]) -> Result<()> {
        let hash = DigestUtils::compute_sha256(payload);
        let uuids = client.retrieve_uuids_by_hash(&hash).await?;
        let uuid = uuids
            .first()
            .ok_or_else(|| ReplicationError::RekorVerificationFailed("no rekor entry found for payload".into()))?;
        let entry = client.get_entry(uuid).await?;
        let public_key_pem = client.get_public_key_pem().await?;
        rekor::verify_set(&entry, &public_key_pem)?;
        if let Some(proof) = &entry.verification.inclusion_proof {
            rekor::verify_inclusion_proof(&entry.body.clone().into_bytes(), proof)?;
        }
        Ok(())
    }
}

async fn read_payload(transport: &dyn RegistryTransport, repo: &str, digest: &str) -> Result<Vec<u8>> {
    use futures_util::StreamExt;
    let mut stream = transport.get_blob_stream(repo, digest).await?;
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
    }
    DigestUtils::verify_data_integrity(&buf, digest)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FakeTransport;

    #[tokio::test]
    async fn no_signature_manifest_returns_no_signatures_error() {
        let transport = FakeTransport::new();
        let verifier = SignatureVerifier::new(None);
        let err = verifier.verify(&transport, "app", "sha256:abc", false).await;
        assert!(err.is_err());
    }
}
