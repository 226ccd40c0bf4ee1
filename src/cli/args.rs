//! Command line argument definitions.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::error::{ReplicationError, Result};

#[derive(Parser, Debug)]
#[command(name = "freightliner")]
#[command(about = "Replicates OCI container images between registries")]
#[command(version)]
pub struct Args {
    /// Emit structured JSON logs instead of the compact human formatter.
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Verbose human-readable output (in addition to structured logs).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress human-readable output entirely.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replicate every tag of a source repository to a destination repository.
    Replicate(ReplicateArgs),

    /// Serve the Prometheus scrape endpoint and JSON introspection routes
    /// standalone, without running a replication.
    ServeMetrics(ServeMetricsArgs),

    /// Verify the signatures attached to a single image reference against a
    /// policy file and print the resulting verdict.
    Verify(VerifyArgs),
}

#[derive(Parser, Debug)]
pub struct ReplicateArgs {
    /// Source image reference, `registry-host/repository`.
    pub source: String,

    /// Destination image reference, `registry-host/repository`.
    pub destination: String,

    /// Path to a replication config file (YAML or JSON). Falls back to
    /// built-in defaults when omitted.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Path to a signing policy file. When set, every tag's destination
    /// manifest upload is gated on policy evaluation.
    #[arg(long)]
    pub policy_file: Option<PathBuf>,

    /// Overrides the configured worker pool size.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Overrides the configured per-tag layer concurrency.
    #[arg(long)]
    pub intra_tag_concurrency: Option<usize>,

    /// Skip TLS certificate verification against the source registry.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub source_skip_tls: bool,

    /// Skip TLS certificate verification against the destination registry.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub dest_skip_tls: bool,
}

impl ReplicateArgs {
    pub fn validate(&self) -> Result<()> {
        if !self.source.contains('/') {
            return Err(ReplicationError::Validation(format!(
                "source '{}' must be in registry-host/repository form",
                self.source
            )));
        }
        if !self.destination.contains('/') {
            return Err(ReplicationError::Validation(format!(
                "destination '{}' must be in registry-host/repository form",
                self.destination
            )));
        }
        if let Some(workers) = self.workers {
            if workers == 0 {
                return Err(ReplicationError::Validation("--workers must be at least 1".into()));
            }
        }
        if let Some(concurrency) = self.intra_tag_concurrency {
            if concurrency == 0 {
                return Err(ReplicationError::Validation("--intra-tag-concurrency must be at least 1".into()));
            }
        }
        Ok(())
    }

    /// Splits a `registry-host/repository` reference into its two halves.
    pub fn split_ref(reference: &str) -> Result<(&str, &str)> {
        reference
            .split_once('/')
            .ok_or_else(|| ReplicationError::Validation(format!("'{reference}' must be in registry-host/repository form")))
    }
}

#[derive(Parser, Debug)]
pub struct ServeMetricsArgs {
    /// Address to bind the scrape server to.
    #[arg(long, default_value = "0.0.0.0:9090")]
    pub bind: SocketAddr,
}

#[derive(Parser, Debug)]
pub struct VerifyArgs {
    /// Image reference to verify, `registry-host/repository@sha256:<hex>`.
    pub image: String,

    /// Path to the signing policy file to evaluate against.
    pub policy_file: PathBuf,

    /// Rekor transparency-log base URL. Omit to skip Rekor verification.
    #[arg(long)]
    pub rekor_url: Option<String>,

    /// Skip TLS certificate verification against the registry.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub skip_tls: bool,
}

impl VerifyArgs {
    pub fn validate(&self) -> Result<()> {
        if !self.image.contains('@') {
            return Err(ReplicationError::Validation(format!(
                "image '{}' must include a digest (registry-host/repository@sha256:<hex>)",
                self.image
            )));
        }
        ReplicateArgs::split_ref(self.image.split('@').next().unwrap_or(&self.image))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replicate_requires_slash_in_source_and_dest() {
        let args = ReplicateArgs {
            source: "no-slash".to_string(),
            destination: "registry.example.com/app".to_string(),
            config: None,
            policy_file: None,
            workers: None,
            intra_tag_concurrency: None,
            source_skip_tls: false,
            dest_skip_tls: false,
        };
        assert!(args.validate().is_err());
    }

    #[test]
    fn replicate_rejects_zero_workers() {
        let args = ReplicateArgs {
            source: "registry.example.com/app".to_string(),
            destination: "registry.example.com/app2".to_string(),
            config: None,
            policy_file: None,
            workers: Some(0),
            intra_tag_concurrency: None,
            source_skip_tls: false,
            dest_skip_tls: false,
        };
        assert!(args.validate().is_err());
    }

    #[test]
    fn replicate_accepts_well_formed_refs() {
        let args = ReplicateArgs {
            source: "registry.example.com/app".to_string(),
            destination: "other.example.com/app".to_string(),
            config: None,
            policy_file: None,
            workers: Some(4),
            intra_tag_concurrency: Some(8),
            source_skip_tls: false,
            dest_skip_tls: false,
        };
        assert!(args.validate().is_ok());
    }

    #[test]
    fn verify_requires_digest() {
        let args = VerifyArgs {
            image: "registry.example.com/app:latest".to_string(),
            policy_file: PathBuf::from("policy.yaml"),
            rekor_url: None,
            skip_tls: false,
        };
        assert!(args.validate().is_err());
    }

    #[test]
    fn verify_accepts_digest_reference() {
        let args = VerifyArgs {
            image: "registry.example.com/app@sha256:abc".to_string(),
            policy_file: PathBuf::from("policy.yaml"),
            rekor_url: None,
            skip_tls: false,
        };
        assert!(args.validate().is_ok());
    }
}
