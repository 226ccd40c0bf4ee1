//! Standardized HTTP status classification, generalizing the teacher's
//! per-context error-message tables into the replication error taxonomy.

use super::ReplicationError;
use reqwest::StatusCode;

/// Classifies an HTTP response status into the replication error taxonomy.
/// `context` is a short operation label used only in the error message
/// (e.g. "manifest HEAD", "blob PUT").
pub struct HttpErrorClassifier;

impl HttpErrorClassifier {
    pub fn classify(status: StatusCode, context: &str, body: &str) -> ReplicationError {
        match status.as_u16() {
            401 | 403 => ReplicationError::Auth(format!("{context}: {status} {body}")),
            404 => ReplicationError::NotFound(format!("{context}: {body}")),
            400 | 409 | 413 | 422 => {
                ReplicationError::Registry(format!("{context} failed ({status}): {body}"))
            }
            500..=599 => ReplicationError::Transient {
                message: format!("{context} failed ({status}): {body}"),
                retries: 0,
            },
            _ => ReplicationError::Registry(format!("{context} failed ({status}): {body}")),
        }
    }

    /// Whether a status code belongs to the transient-failure class that the
    /// Tag Copier's layer-level retry loop should act on (timeouts,
    /// connection resets and 5xx; 400/401/403/404 are non-retryable).
    pub fn is_transient_status(status: StatusCode) -> bool {
        status.is_server_error()
    }
}
