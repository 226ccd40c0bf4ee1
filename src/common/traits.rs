//! Small cross-cutting traits shared by a few subsystems.
//!
//! Most of the teacher's generic trait zoo (`ProgressReporter`, `Cacheable`,
//! `ResourceManager`, `MetricsCollector`) doesn't survive here: this crate's
//! pool, worker and metrics types have concrete, purpose-built APIs instead
//! of a generic interface layer. What's left is genuinely reused in more
//! than one place.

use std::time::Duration;

/// Shared retry policy shape, consumed by the tag copier's layer-level retry
/// loop and by [`crate::error::backoff_delay`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential_backoff: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(60),
            exponential_backoff: true,
        }
    }
}

/// Consistent validation interface for config and data-model types.
pub trait Validatable {
    type Error;

    fn validate(&self) -> std::result::Result<(), Self::Error>;
}
