//! Policy evaluation: a pure function over a verified-signature set and a
//! policy document. No I/O — trivially unit-testable for determinism.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::signing::verifier::VerifiedSignature;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnforcementMode {
    Enforce,
    Warn,
    Audit,
}

impl Default for EnforcementMode {
    fn default() -> Self {
        EnforcementMode::Enforce
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignerRule {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_regex: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub uri_regex: Option<String>,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub key_fingerprint: Option<String>,
}

impl SignerRule {
    /// A conjunction of every non-empty field in the rule.
    fn matches(&self, sig: &VerifiedSignature) -> bool {
        let mut any_field = false;
        let mut ok = true;

        if let Some(email) = &self.email {
            any_field = true;
            ok &= sig.subject.as_deref() == Some(email.as_str());
        }
        if let Some(pattern) = &self.email_regex {
            any_field = true;
            ok &= Regex::new(pattern)
                .map(|re| sig.subject.as_deref().map(|s| re.is_match(s)).unwrap_or(false))
                .unwrap_or(false);
        }
        if let Some(uri) = &self.uri {
            any_field = true;
            ok &= sig.subject.as_deref() == Some(uri.as_str());
        }
        if let Some(pattern) = &self.uri_regex {
            any_field = true;
            ok &= Regex::new(pattern)
                .map(|re| sig.subject.as_deref().map(|s| re.is_match(s)).unwrap_or(false))
                .unwrap_or(false);
        }
        if let Some(issuer) = &self.issuer {
            any_field = true;
            ok &= sig.issuer.as_deref() == Some(issuer.as_str());
        }
        if let Some(subject) = &self.subject {
            any_field = true;
            ok &= sig.subject.as_deref() == Some(subject.as_str());
        }
        if let Some(fingerprint) = &self.key_fingerprint {
            any_field = true;
            ok &= sig.key_fingerprint.as_deref() == Some(fingerprint.as_str());
        }

        any_field && ok
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyRequirements {
    #[serde(default)]
    pub min_bits: Option<u32>,
    #[serde(default)]
    pub allowed_algorithms: Vec<String>,
    #[serde(default)]
    pub require_hardware_backed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default = "default_require_signature")]
    pub require_signature: bool,
    #[serde(default = "default_min_signatures")]
    pub min_signatures: usize,
    #[serde(default)]
    pub enforcement_mode: EnforcementMode,
    #[serde(default)]
    pub allowed_issuers: Vec<String>,
    #[serde(default)]
    pub allowed_signers: Vec<SignerRule>,
    #[serde(default)]
    pub denied_signers: Vec<SignerRule>,
    #[serde(default)]
    pub key_requirements: Option<KeyRequirements>,
    #[serde(default)]
    pub require_rekor: bool,
}

fn default_require_signature() -> bool {
    true
}
fn default_min_signatures() -> usize {
    1
}

impl Policy {
    pub fn load(path: &std::path::Path) -> crate::error::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> crate::error::Result<Self> {
        serde_yaml::from_str(raw)
            .or_else(|yaml_err| {
                serde_json::from_str(raw)
                    .map_err(|json_err| crate::error::ReplicationError::Config(format!(
                        "policy is neither valid YAML ({yaml_err}) nor valid JSON ({json_err})"
                    )))
            })
    }
}

#[derive(Debug, Clone, Default)]
pub struct PolicyEvaluation {
    pub passed: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub valid_count: usize,
    pub evaluated_count: usize,
}

pub struct PolicyEngine;

impl PolicyEngine {
    /// Evaluates `signatures` against `policy`. Pure function, no I/O.
    ///
    /// `enforcement_mode` decides what a violation turns into: `Enforce`
    /// fails (`passed: false`, reasons in `errors`); `Warn` and `Audit` both
    /// let the tag proceed (`passed: true`) but record the same reasons in
    /// `warnings` so the caller can log them at whatever level fits the mode.
    pub fn evaluate(policy: &Policy, signatures: &[VerifiedSignature]) -> PolicyEvaluation {
        let evaluated_count = signatures.len();
        let mut violations = Vec::new();

        if policy.require_signature && signatures.is_empty() {
            violations.push("no signatures present".to_string());
            return Self::finish(policy, violations, 0, evaluated_count);
        }

        let valid: Vec<&VerifiedSignature> = signatures
            .iter()
            .filter(|sig| Self::passes_signer_checks(policy, sig))
            .collect();
        let valid_count = valid.len();

        if policy.require_rekor && valid.iter().any(|s| !s.rekor_verified) {
            violations.push("rekor verification required but missing on at least one signature".to_string());
        }

        if valid_count < policy.min_signatures {
            violations.push(format!(
                "only {valid_count} valid signature(s), policy requires at least {}",
                policy.min_signatures
            ));
        }

        Self::finish(policy, violations, valid_count, evaluated_count)
    }

    fn finish(policy: &Policy, violations: Vec<String>, valid_count: usize, evaluated_count: usize) -> PolicyEvaluation {
        if violations.is_empty() {
            return PolicyEvaluation {
                passed: true,
                errors: Vec::new(),
                warnings: Vec::new(),
                valid_count,
                evaluated_count,
            };
        }

        match policy.enforcement_mode {
            EnforcementMode::Enforce => PolicyEvaluation {
                passed: false,
                errors: violations,
                warnings: Vec::new(),
                valid_count,
                evaluated_count,
            },
            EnforcementMode::Warn | EnforcementMode::Audit => PolicyEvaluation {
                passed: true,
                errors: Vec::new(),
                warnings: violations,
                valid_count,
                evaluated_count,
            },
        }
    }

    fn passes_signer_checks(policy: &Policy, sig: &VerifiedSignature) -> bool {
        if !policy.allowed_issuers.is_empty() {
            if !sig.issuer.as_deref().map(|i| policy.allowed_issuers.iter().any(|a| a == i)).unwrap_or(false) {
                return false;
            }
        }

        // A signer matching both allow and deny lists is denied.
        if policy.denied_signers.iter().any(|rule| rule.matches(sig)) {
            return false;
        }

        if !policy.allowed_signers.is_empty() && !policy.allowed_signers.iter().any(|rule| rule.matches(sig)) {
            return false;
        }

        if let Some(reqs) = &policy.key_requirements {
            if let Some(min_bits) = reqs.min_bits {
                if sig.key_bits.map(|bits| bits < min_bits).unwrap_or(true) {
                    return false;
                }
            }
            if !reqs.allowed_algorithms.is_empty()
                && !reqs.allowed_algorithms.iter().any(|a| a == &sig.algorithm)
            {
                return false;
            }
            if reqs.require_hardware_backed && !sig.hardware_backed {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(issuer: &str, subject: &str, rekor_verified: bool) -> VerifiedSignature {
        VerifiedSignature {
            issuer: Some(issuer.to_string()),
            subject: Some(subject.to_string()),
            key_fingerprint: None,
            key_bits: Some(256),
            algorithm: "ecdsa-p256".to_string(),
            hardware_backed: false,
            rekor_verified,
        }
    }

    #[test]
    fn denies_when_no_signatures_and_required() {
        let policy = Policy {
            require_signature: true,
            min_signatures: 1,
            enforcement_mode: EnforcementMode::Enforce,
            allowed_issuers: vec![],
            allowed_signers: vec![],
            denied_signers: vec![],
            key_requirements: None,
            require_rekor: false,
        };
        let eval = PolicyEngine::evaluate(&policy, &[]);
        assert!(!eval.passed);
        assert_eq!(eval.valid_count, 0);
    }

    #[test]
    fn deny_list_wins_over_allow_list() {
        let rule = SignerRule { email: Some("ci@example.com".to_string()), ..Default::default() };
        let policy = Policy {
            require_signature: true,
            min_signatures: 1,
            enforcement_mode: EnforcementMode::Enforce,
            allowed_issuers: vec![],
            allowed_signers: vec![rule.clone()],
            denied_signers: vec![rule],
            key_requirements: None,
            require_rekor: false,
        };
        let eval = PolicyEngine::evaluate(&policy, &[sig("https://accounts.example.com", "ci@example.com", true)]);
        assert!(!eval.passed);
        assert_eq!(eval.valid_count, 0);
    }

    #[test]
    fn warn_mode_passes_but_records_warning() {
        let policy = Policy {
            require_signature: true,
            min_signatures: 1,
            enforcement_mode: EnforcementMode::Warn,
            allowed_issuers: vec![],
            allowed_signers: vec![],
            denied_signers: vec![],
            key_requirements: None,
            require_rekor: false,
        };
        let eval = PolicyEngine::evaluate(&policy, &[]);
        assert!(eval.passed);
        assert!(eval.errors.is_empty());
        assert_eq!(eval.warnings.len(), 1);
    }

    #[test]
    fn audit_mode_passes_and_records_warning() {
        let policy = Policy {
            require_signature: true,
            min_signatures: 1,
            enforcement_mode: EnforcementMode::Audit,
            allowed_issuers: vec![],
            allowed_signers: vec![],
            denied_signers: vec![],
            key_requirements: None,
            require_rekor: false,
        };
        let eval = PolicyEngine::evaluate(&policy, &[]);
        assert!(eval.passed);
        assert!(eval.errors.is_empty());
        assert_eq!(eval.warnings.len(), 1);
    }

    #[test]
    fn passes_with_sufficient_valid_signatures() {
        let policy = Policy {
            require_signature: true,
            min_signatures: 1,
            enforcement_mode: EnforcementMode::Enforce,
            allowed_issuers: vec!["https://accounts.example.com".to_string()],
            allowed_signers: vec![],
            denied_signers: vec![],
            key_requirements: None,
            require_rekor: false,
        };
        let eval = PolicyEngine::evaluate(&policy, &[sig("https://accounts.example.com", "ci@example.com", true)]);
        assert!(eval.passed);
        assert_eq!(eval.valid_count, 1);
    }
}
