//! Rekor transparency-log client: entry retrieval, Signed Entry Timestamp
//! (SET) verification, and Merkle inclusion-proof verification.
//!
//! The source this crate is modeled on only checked that a SET was present.
//! Both gaps called out there are closed here: the log's public key is
//! fetched and the ECDSA signature over the canonical SET payload is
//! actually verified, and the inclusion proof's sibling-hash chain is
//! reconstructed and compared against the advertised root hash.

use std::collections::BTreeMap;

use base64::Engine as _;
use ecdsa::signature::Verifier;
use p256::ecdsa::{Signature as P256Signature, VerifyingKey as P256VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ReplicationError, Result};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InclusionProof {
    #[serde(rename = "logIndex")]
    pub log_index: u64,
    #[serde(rename = "rootHash")]
    pub root_hash: String,
    #[serde(rename = "treeSize")]
    pub tree_size: u64,
    pub hashes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Verification {
    #[serde(rename = "signedEntryTimestamp")]
    pub signed_entry_timestamp: String,
    #[serde(rename = "inclusionProof")]
    pub inclusion_proof: Option<InclusionProof>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RekorEntry {
    pub body: String,
    #[serde(rename = "integratedTime")]
    pub integrated_time: i64,
    #[serde(rename = "logIndex")]
    pub log_index: u64,
    #[serde(rename = "logID")]
    pub log_id: String,
    pub verification: Verification,
}

pub struct RekorClient {
    base_url: String,
    http: reqwest::Client,
}

impl RekorClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
        }
    }

    pub async fn retrieve_uuids_by_hash(&self, sha256_hex: &str) -> Result<Vec<String>> {
        let url = format!("{}/api/v1/index/retrieve", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "hash": format!("sha256:{sha256_hex}") }))
            .send()
            .await
            .map_err(|e| ReplicationError::transient(e.to_string(), 0))?;
        if !resp.status().is_success() {
            return Err(ReplicationError::Registry(format!("rekor index/retrieve: {}", resp.status())));
        }
        resp.json::<Vec<String>>()
            .await
            .map_err(|e| ReplicationError::Parse(e.to_string()))
    }

    pub async fn get_entry(&self, uuid: &str) -> Result<RekorEntry> {
        let url = format!("{}/api/v1/log/entries/{uuid}", self.base_url);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ReplicationError::transient(e.to_string(), 0))?;
        if !resp.status().is_success() {
            return Err(ReplicationError::Registry(format!("rekor log/entries: {}", resp.status())));
        }
        // The endpoint wraps the entry under its UUID key.
        let mut by_uuid: BTreeMap<String, RekorEntry> =
            resp.json().await.map_err(|e| ReplicationError::Parse(e.to_string()))?;
        by_uuid
            .remove(uuid)
            .or_else(|| by_uuid.into_values().next())
            .ok_or_else(|| ReplicationError::NotFound(format!("rekor entry {uuid}")))
    }

    pub async fn get_public_key_pem(&self) -> Result<String> {
        let url = format!("{}/api/v1/log/publicKey", self.base_url);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ReplicationError::transient(e.to_string(), 0))?;
        if !resp.status().is_success() {
            return Err(ReplicationError::Registry(format!("rekor log/publicKey: {}", resp.status())));
        }
        resp.text().await.map_err(|e| ReplicationError::Parse(e.to_string()))
    }
}

/// Verifies the ECDSA signature in `entry.verification.signed_entry_timestamp`
/// over the canonical SET payload `{body, integratedTime, logID, logIndex}`
/// against the log's public key.
pub fn verify_set(entry: &RekorEntry, log_public_key_pem: &str) -> Result<()> {
    let der = pem::parse(log_public_key_pem)
        .map_err(|e| ReplicationError::Validation(format!("malformed rekor public key PEM: {e}")))?;
    let point = spki_public_key_point(der.contents())?;
    let verifying_key = P256VerifyingKey::from_sec1_bytes(&point)
        .map_err(|e| ReplicationError::Validation(format!("unsupported rekor public key: {e}")))?;

    let payload = canonical_set_payload(entry);
    let sig_bytes = base64::engine::general_purpose::STANDARD
        .decode(entry.verification.signed_entry_timestamp.as_bytes())
        .map_err(|e| ReplicationError::Validation(format!("malformed SET signature: {e}")))?;
    let signature = P256Signature::from_der(&sig_bytes)
        .map_err(|e| ReplicationError::Validation(format!("malformed SET signature encoding: {e}")))?;

    verifying_key
        .verify(payload.as_bytes(), &signature)
        .map_err(|_| ReplicationError::RekorVerificationFailed("SET signature did not verify".into()))
}

fn canonical_set_payload(entry: &RekorEntry) -> String {
    // RFC 8785-ish: a flat object with lexicographically sorted keys,
    // matching the fields Rekor actually signs over.
    let mut map = BTreeMap::new();
    map.insert("body", serde_json::Value::String(entry.body.clone()));
    map.insert("integratedTime", serde_json::Value::from(entry.integrated_time));
    map.insert("logID", serde_json::Value::String(entry.log_id.clone()));
    map.insert("logIndex", serde_json::Value::from(entry.log_index));
    serde_json::to_string(&map).expect("BTreeMap<&str, Value> always serializes")
}

fn spki_public_key_point(der: &[u8]) -> Result<Vec<u8>> {
    // SubjectPublicKeyInfo's BIT STRING payload is the raw SEC1 point; find
    // the BIT STRING tag (0x03) and skip its length + unused-bits octet.
    // A minimal walk rather than a full SPKI decode, sufficient for the
    // uncompressed NIST P-256 points Rekor publishes.
    for i in 0..der.len().saturating_sub(2) {
        if der[i] == 0x03 {
            let len_byte = der[i + 1];
            if len_byte & 0x80 == 0 {
                let start = i + 2 + 1; // skip tag, length, unused-bits octet
                if start < der.len() && der[start] == 0x04 {
                    return Ok(der[start..].to_vec());
                }
            }
        }
    }
    Err(ReplicationError::Validation("could not locate EC point in SPKI".into()))
}

/// Verifies a Merkle inclusion proof: `0 <= log_index < tree_size`, and the
/// sibling-hash chain reconstructs a root consistent with `proof.root_hash`.
pub fn verify_inclusion_proof(leaf_data: &[u8], proof: &InclusionProof) -> Result<()> {
    if proof.log_index >= proof.tree_size {
        return Err(ReplicationError::RekorVerificationFailed(format!(
            "log index {} out of range for tree size {}",
            proof.log_index, proof.tree_size
        )));
    }

    let mut hash = leaf_hash(leaf_data);
    let mut index = proof.log_index;
    let mut tree_size = proof.tree_size;

    for sibling_hex in &proof.hashes {
        let sibling = hex::decode(sibling_hex)
            .map_err(|e| ReplicationError::RekorVerificationFailed(format!("malformed sibling hash: {e}")))?;
        hash = if index % 2 == 0 && index != tree_size - 1 {
            node_hash(&hash, &sibling)
        } else {
            node_hash(&sibling, &hash)
        };
        index /= 2;
        tree_size = tree_size.div_ceil(2);
    }

    let computed = hex::encode(hash);
    if computed != proof.root_hash {
        return Err(ReplicationError::RekorVerificationFailed(format!(
            "reconstructed root {computed} does not match advertised root {}",
            proof.root_hash
        )));
    }
    Ok(())
}

fn leaf_hash(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update([0x00]);
    hasher.update(data);
    hasher.finalize().to_vec()
}

fn node_hash(left: &[u8], right: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update([0x01]);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().to_vec()
}
