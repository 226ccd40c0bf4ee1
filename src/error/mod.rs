//! Error taxonomy for the replication engine.
//!
//! One enum per subsystem, in the style the rest of this crate inherited
//! from its upload pipeline: `thiserror`-derived variants with a `From` impl
//! at each I/O boundary. [`ReplicationError`] is the top-level error type and
//! carries the failure-kind taxonomy from the error handling design: network
//! errors are retried upstream and only surface once retries are exhausted,
//! `DigestMismatch` and `NotFound` are never retried, and `PolicyDenied`'s
//! severity is governed by the policy's enforcement mode rather than by this
//! type.

pub mod handlers;

use std::time::Duration;

pub type Result<T> = std::result::Result<T, ReplicationError>;

#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    /// Timeout, connection reset, or 5xx. Retried at blob- or request-level;
    /// this variant is only returned once retries are exhausted.
    #[error("transient network error after {retries} retries: {message}")]
    Transient { message: String, retries: u32 },

    /// 401/403. Not retried; orchestrator records and continues with other tags.
    #[error("unauthorized: {0}")]
    Auth(String),

    /// 404 on source. Fatal for the tag that triggered it only.
    #[error("not found: {0}")]
    NotFound(String),

    /// Digest recomputed on receipt did not match the descriptor. Never
    /// retried: it implies corruption or tampering, not a transient fault.
    #[error("digest mismatch: expected {expected}, computed {actual}")]
    DigestMismatch { expected: String, actual: String },

    /// Policy evaluation failed under `enforce` mode.
    #[error("policy denied: {0}")]
    PolicyDenied(String),

    /// No signature manifest exists for a digest at all, distinct from a
    /// signature that exists but fails verification.
    #[error("no signatures present: {0}")]
    NoSignatures(String),

    /// Rekor transparency-log verification failed. Escalated to
    /// `PolicyDenied` by the verifier when the policy requires Rekor.
    #[error("rekor verification failed: {0}")]
    RekorVerificationFailed(String),

    /// Worker pool queue was full at submission time.
    #[error("queue full: {0}")]
    QueueFull(String),

    /// Propagated unchanged from a cancelled cancellation token.
    #[error("cancelled")]
    Cancelled,

    /// Programming invariant violated (impossible state transition, etc).
    /// Aborts the entire replication rather than failing a single tag.
    #[error("fatal invariant violation: {0}")]
    Fatal(String),

    #[error("registry error: {0}")]
    Registry(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ReplicationError {
    /// Whether this error kind is eligible for the layer/request-level retry
    /// loop described in the Tag Copier's failure semantics.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReplicationError::Transient { .. })
    }

    /// Whether this error should abort the entire replication, as opposed to
    /// being captured as a single tag's outcome.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ReplicationError::Fatal(_))
    }

    pub fn transient(message: impl Into<String>, retries: u32) -> Self {
        ReplicationError::Transient {
            message: message.into(),
            retries,
        }
    }
}

impl From<std::io::Error> for ReplicationError {
    fn from(err: std::io::Error) -> Self {
        ReplicationError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ReplicationError {
    fn from(err: serde_json::Error) -> Self {
        ReplicationError::Parse(err.to_string())
    }
}

impl From<serde_yaml::Error> for ReplicationError {
    fn from(err: serde_yaml::Error) -> Self {
        ReplicationError::Parse(err.to_string())
    }
}

impl From<reqwest::Error> for ReplicationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            ReplicationError::Transient {
                message: err.to_string(),
                retries: 0,
            }
        } else {
            ReplicationError::Registry(err.to_string())
        }
    }
}

impl From<url::ParseError> for ReplicationError {
    fn from(err: url::ParseError) -> Self {
        ReplicationError::Validation(err.to_string())
    }
}

impl From<crate::worker::WorkerError> for ReplicationError {
    fn from(err: crate::worker::WorkerError) -> Self {
        match err {
            crate::worker::WorkerError::QueueFull(msg) => ReplicationError::QueueFull(msg),
            crate::worker::WorkerError::Cancelled => ReplicationError::Cancelled,
        }
    }
}

/// Helper for computing the jittered exponential backoff schedule described
/// in the Tag Copier's failure semantics (initial 200ms, factor 2, max 3
/// retries, jitter +/-25%).
pub fn backoff_delay(attempt: u32, initial: Duration, factor: f64, jitter_fraction: f64) -> Duration {
    let base = initial.as_secs_f64() * factor.powi(attempt as i32);
    let jitter = base * jitter_fraction * (2.0 * rand_unit() - 1.0);
    Duration::from_secs_f64((base + jitter).max(0.0))
}

/// A small indirection so tests can pin the "random" jitter deterministically
/// if needed; in production this draws from the `rand` crate's thread RNG.
fn rand_unit() -> f64 {
    use rand::Rng;
    rand::thread_rng().r#gen::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(ReplicationError::transient("x", 1).is_retryable());
        assert!(!ReplicationError::NotFound("x".into()).is_retryable());
        assert!(!ReplicationError::DigestMismatch {
            expected: "a".into(),
            actual: "b".into()
        }
        .is_retryable());
    }

    #[test]
    fn fatal_classification() {
        assert!(ReplicationError::Fatal("bad state".into()).is_fatal());
        assert!(!ReplicationError::Auth("no".into()).is_fatal());
    }

    #[test]
    fn backoff_schedule_matches_initial_200ms_factor_2() {
        let d0 = backoff_delay(0, Duration::from_millis(200), 2.0, 0.0);
        let d1 = backoff_delay(1, Duration::from_millis(200), 2.0, 0.0);
        assert_eq!(d0, Duration::from_millis(200));
        assert_eq!(d1, Duration::from_millis(400));
    }

    #[test]
    fn backoff_jitter_stays_within_25_percent() {
        for attempt in 0..3 {
            let base_ms = 200.0 * 2f64.powi(attempt as i32);
            for _ in 0..50 {
                let d = backoff_delay(attempt, Duration::from_millis(200), 2.0, 0.25);
                let ms = d.as_secs_f64() * 1000.0;
                assert!(ms >= base_ms * 0.75 - 1.0 && ms <= base_ms * 1.25 + 1.0);
            }
        }
    }
}
