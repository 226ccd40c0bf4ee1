//! In-toto attestation statement parsing.
//!
//! The source this crate is modeled on hard-coded a placeholder predicate
//! type; here the statement JSON is parsed properly instead of guessed at.

use serde::{Deserialize, Serialize};

pub const STATEMENT_TYPE: &str = "https://in-toto.io/Statement/v0.1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InTotoStatement {
    #[serde(rename = "_type")]
    pub statement_type: String,
    #[serde(rename = "predicateType")]
    pub predicate_type: String,
    pub subject: Vec<InTotoSubject>,
    pub predicate: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InTotoSubject {
    pub name: String,
    pub digest: std::collections::BTreeMap<String, String>,
}

impl InTotoStatement {
    pub fn parse(payload: &[u8]) -> crate::error::Result<Self> {
        let statement: InTotoStatement = serde_json::from_slice(payload)
            .map_err(|e| crate::error::ReplicationError::Parse(format!("in-toto statement: {e}")))?;
        if statement.statement_type != STATEMENT_TYPE {
            return Err(crate::error::ReplicationError::Validation(format!(
                "unsupported in-toto statement type: {}",
                statement.statement_type
            )));
        }
        Ok(statement)
    }

    pub fn subject_matches_digest(&self, digest_hex: &str) -> bool {
        self.subject
            .iter()
            .any(|s| s.digest.get("sha256").map(|d| d == digest_hex).unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_statement() {
        let payload = serde_json::json!({
            "_type": STATEMENT_TYPE,
            "predicateType": "cosign.sigstore.dev/attestation/v1",
            "subject": [{"name": "app", "digest": {"sha256": "abc123"}}],
            "predicate": {"builder": {"id": "ci"}}
        });
        let statement = InTotoStatement::parse(&serde_json::to_vec(&payload).unwrap()).unwrap();
        assert_eq!(statement.predicate_type, "cosign.sigstore.dev/attestation/v1");
        assert!(statement.subject_matches_digest("abc123"));
    }

    #[test]
    fn rejects_unknown_statement_type() {
        let payload = serde_json::json!({
            "_type": "https://example.com/NotInToto",
            "predicateType": "x",
            "subject": [],
            "predicate": {}
        });
        assert!(InTotoStatement::parse(&serde_json::to_vec(&payload).unwrap()).is_err());
    }
}
