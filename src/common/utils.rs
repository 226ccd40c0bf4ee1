//! Small reusable helpers that don't warrant their own module.

use crate::error::{ReplicationError, Result};
use crate::logging::Logger;
use std::time::{Duration, Instant};

/// Timing utility for logging how long a named step took.
pub struct Timer {
    start: Instant,
    description: String,
}

impl Timer {
    pub fn start(description: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            description: description.into(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn stop(self) -> Duration {
        self.elapsed()
    }

    pub fn log_elapsed(&self, logger: &Logger) {
        logger.info(&format!(
            "{} completed in {:.2}s",
            self.description,
            self.elapsed().as_secs_f64()
        ));
    }
}

/// Human-readable formatting, shared by the CLI logger and the metrics
/// dashboard summary.
pub struct FormatUtils;

impl FormatUtils {
    pub fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

        if bytes == 0 {
            return "0 B".to_string();
        }

        let mut size = bytes as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    pub fn format_speed(bytes_per_sec: u64) -> String {
        format!("{}/s", Self::format_bytes(bytes_per_sec))
    }

    pub fn format_duration(duration: Duration) -> String {
        let total_secs = duration.as_secs();
        let hours = total_secs / 3600;
        let minutes = (total_secs % 3600) / 60;
        let seconds = total_secs % 60;

        if hours > 0 {
            format!("{hours}h{minutes}m{seconds}s")
        } else if minutes > 0 {
            format!("{minutes}m{seconds}s")
        } else {
            format!("{seconds}s")
        }
    }

    pub fn format_percentage(value: f64) -> String {
        format!("{value:.1}%")
    }

    pub fn truncate_digest(digest: &str, len: usize) -> String {
        if let Some(hash_part) = digest.strip_prefix("sha256:") {
            if hash_part.len() > len {
                format!("sha256:{}...", &hash_part[..len])
            } else {
                digest.to_string()
            }
        } else if digest.len() > len {
            format!("{}...", &digest[..len])
        } else {
            digest.to_string()
        }
    }
}

/// Validation shared by the `oci::reference` parser and the CLI argument
/// layer, kept independent of any particular registry transport.
pub struct ValidationUtils;

impl ValidationUtils {
    pub fn validate_repository(repository: &str) -> Result<()> {
        if repository.is_empty() {
            return Err(ReplicationError::Validation(
                "repository cannot be empty".to_string(),
            ));
        }
        if repository.contains("//") || repository.starts_with('/') || repository.ends_with('/') {
            return Err(ReplicationError::Validation(
                "invalid repository format".to_string(),
            ));
        }
        Ok(())
    }

    pub fn validate_reference(reference: &str) -> Result<()> {
        if reference.is_empty() {
            return Err(ReplicationError::Validation(
                "reference cannot be empty".to_string(),
            ));
        }
        if reference.contains([' ', '\t', '\n']) {
            return Err(ReplicationError::Validation(
                "reference cannot contain whitespace".to_string(),
            ));
        }
        Ok(())
    }

    pub fn validate_digest(digest: &str) -> Result<()> {
        let hash_part = digest.strip_prefix("sha256:").ok_or_else(|| {
            ReplicationError::Validation("digest must start with 'sha256:'".to_string())
        })?;
        if hash_part.len() != 64 {
            return Err(ReplicationError::Validation(
                "sha256 digest must be 64 characters".to_string(),
            ));
        }
        if !hash_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ReplicationError::Validation(
                "digest must contain only hexadecimal characters".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(FormatUtils::format_bytes(0), "0 B");
        assert_eq!(FormatUtils::format_bytes(1024), "1.00 KB");
        assert_eq!(FormatUtils::format_bytes(1536), "1.50 KB");
        assert_eq!(FormatUtils::format_bytes(1048576), "1.00 MB");
    }

    #[test]
    fn test_validate_repository() {
        assert!(ValidationUtils::validate_repository("valid/repo").is_ok());
        assert!(ValidationUtils::validate_repository("").is_err());
        assert!(ValidationUtils::validate_repository("//invalid").is_err());
        assert!(ValidationUtils::validate_repository("/invalid").is_err());
    }

    #[test]
    fn test_validate_digest() {
        let valid_digest =
            "sha256:abcdef1234567890abcdef1234567890abcdef1234567890abcdef1234567890";
        assert!(ValidationUtils::validate_digest(valid_digest).is_ok());
        assert!(ValidationUtils::validate_digest("invalid").is_err());
        assert!(ValidationUtils::validate_digest("sha256:invalid").is_err());
    }

    #[test]
    fn test_timer() {
        let timer = Timer::start("test operation");
        std::thread::sleep(Duration::from_millis(10));
        assert!(timer.elapsed() >= Duration::from_millis(10));
    }
}
