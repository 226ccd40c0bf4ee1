//! Fulcio-issued certificate parsing: OIDC issuer extension, SAN subject,
//! Code-Signing EKU check, and a minimal chain verification (each
//! certificate's signature checked against the next issuer's public key).

use ecdsa::signature::Verifier;
use p256::ecdsa::{Signature as P256Signature, VerifyingKey as P256VerifyingKey};
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::ParsedExtension;
use x509_parser::prelude::FromDer;

use crate::error::{ReplicationError, Result};

/// Fulcio's "OIDC Issuer" X.509 extension OID.
pub const FULCIO_ISSUER_OID: &str = "1.3.6.1.4.1.57264.1.1";
const CODE_SIGNING_EKU: &str = "1.3.6.1.5.5.7.3.3";

#[derive(Debug, Clone)]
pub struct CertificateIdentity {
    pub issuer: String,
    pub subject: String,
}

/// Parses the leaf certificate, extracts the Fulcio issuer extension and
/// the SAN subject (email or URI, whichever is present), and confirms the
/// Code-Signing extended key usage bit is set.
pub fn extract_identity(leaf_der: &[u8]) -> Result<CertificateIdentity> {
    let (_, cert) = X509Certificate::from_der(leaf_der)
        .map_err(|e| ReplicationError::Validation(format!("malformed leaf certificate: {e}")))?;

    let issuer = find_extension(&cert, FULCIO_ISSUER_OID)
        .ok_or_else(|| ReplicationError::Validation("certificate missing Fulcio OIDC issuer extension".into()))?;

    let subject = subject_alt_name(&cert)
        .ok_or_else(|| ReplicationError::Validation("certificate missing usable SAN subject".into()))?;

    if !has_code_signing_eku(&cert) {
        return Err(ReplicationError::Validation(
            "certificate lacks Code-Signing extended key usage".into(),
        ));
    }

    Ok(CertificateIdentity { issuer, subject })
}

fn find_extension(cert: &X509Certificate, oid: &str) -> Option<String> {
    cert.tbs_certificate.extensions().iter().find_map(|ext| {
        if ext.oid.to_id_string() == oid {
            // Fulcio encodes the issuer as a UTF8String/IA5String; the raw
            // extension value carries a short ASN.1 tag+length header we
            // strip heuristically rather than fully parsing the string type.
            std::str::from_utf8(ext.value)
                .ok()
                .map(|s| s.trim_matches(|c: char| !c.is_ascii_graphic()).to_string())
        } else {
            None
        }
    })
}

fn subject_alt_name(cert: &X509Certificate) -> Option<String> {
    cert.tbs_certificate.extensions().iter().find_map(|ext| match ext.parsed_extension() {
        ParsedExtension::SubjectAlternativeName(san) => san.general_names.iter().find_map(|name| match name {
            x509_parser::extensions::GeneralName::RFC822Name(email) => Some(email.to_string()),
            x509_parser::extensions::GeneralName::URI(uri) => Some(uri.to_string()),
            _ => None,
        }),
        _ => None,
    })
}

fn has_code_signing_eku(cert: &X509Certificate) -> bool {
    cert.tbs_certificate.extensions().iter().any(|ext| match ext.parsed_extension() {
        ParsedExtension::ExtendedKeyUsage(eku) => eku.code_signing,
        _ => ext.oid.to_id_string() == CODE_SIGNING_EKU,
    })
}

/// Verifies each certificate's signature against the next certificate's
/// public key (leaf -> intermediate -> ... -> root), returning an error at
/// the first link that doesn't verify. The root is trusted implicitly once
/// the chain up to it verifies; full trust-store pinning is out of scope.
pub fn verify_chain(chain_der: &[Vec<u8>]) -> Result<()> {
    if chain_der.len() < 2 {
        return Err(ReplicationError::Validation(
            "certificate chain must include at least leaf and issuer".into(),
        ));
    }
    for pair in chain_der.windows(2) {
        let (_, subject) = X509Certificate::from_der(&pair[0])
            .map_err(|e| ReplicationError::Validation(format!("malformed chain certificate: {e}")))?;
        let (_, issuer) = X509Certificate::from_der(&pair[1])
            .map_err(|e| ReplicationError::Validation(format!("malformed chain certificate: {e}")))?;
        verify_signed_by(&subject, &issuer)?;
    }
    Ok(())
}

fn verify_signed_by(subject: &X509Certificate, issuer: &X509Certificate) -> Result<()> {
    let issuer_point = issuer.tbs_certificate.subject_pki.subject_public_key.as_ref();
    let verifying_key = P256VerifyingKey::from_sec1_bytes(issuer_point)
        .map_err(|e| ReplicationError::Validation(format!("unsupported issuer public key: {e}")))?;
    let signature = P256Signature::from_der(subject.signature_value.as_ref())
        .map_err(|e| ReplicationError::Validation(format!("malformed certificate signature: {e}")))?;
    verifying_key
        .verify(subject.tbs_certificate.as_ref(), &signature)
        .map_err(|_| ReplicationError::Validation("certificate chain signature verification failed".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_der() {
        assert!(extract_identity(b"not a certificate").is_err());
    }

    #[test]
    fn rejects_short_chain() {
        assert!(verify_chain(&[vec![1, 2, 3]]).is_err());
    }
}
