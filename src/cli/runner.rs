//! Subcommand dispatch: turns parsed [`Args`] into registry transports,
//! an orchestrator run, a standalone metrics server, or a signature
//! verification, and maps the result onto a process exit code.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::cli::args::{Args, Commands, ReplicateArgs, ServeMetricsArgs, VerifyArgs};
use crate::config::ReplicationConfig;
use crate::error::{ReplicationError, Result};
use crate::logging::Logger;
use crate::metrics::MetricsSink;
use crate::orchestrator::{ReplicationOptions, ReplicationOrchestrator};
use crate::pool::ConnectionPool;
use crate::registry::{EnvTokenProvider, HttpTransport, RegistryTransport, TokenProvider};
use crate::signing::rekor::RekorClient;
use crate::signing::{EnforcementMode, Policy, PolicyEngine, SignatureVerifier};
use crate::tagcopy::PolicyGate;

/// Process exit codes per the CLI's external interface: 0 on success, a
/// distinct non-zero code for a policy-enforced denial, and 1 for any other
/// initialization or execution failure.
pub const EXIT_OK: i32 = 0;
pub const EXIT_POLICY_DENIED: i32 = 2;
pub const EXIT_FAILURE: i32 = 1;

pub struct Runner {
    logger: Logger,
}

impl Runner {
    pub fn new(verbose: bool, quiet: bool) -> Self {
        let logger = if quiet { Logger::new_quiet() } else { Logger::new(verbose) };
        Self { logger }
    }

    pub async fn run(args: Args) -> i32 {
        crate::logging::init_tracing(args.json_logs);
        let runner = Self::new(args.verbose, args.quiet);
        match args.command {
            Commands::Replicate(replicate_args) => runner.run_replicate(replicate_args).await,
            Commands::ServeMetrics(serve_args) => runner.run_serve_metrics(serve_args).await,
            Commands::Verify(verify_args) => runner.run_verify(verify_args).await,
        }
    }

    async fn run_replicate(&self, args: ReplicateArgs) -> i32 {
        if let Err(e) = args.validate() {
            self.logger.error(&e.to_string());
            return EXIT_FAILURE;
        }

        match self.do_replicate(&args).await {
            Ok(summary) => {
                self.logger.summary_kv(
                    "Replication complete",
                    &[
                        ("total", summary.total.to_string()),
                        ("copied", summary.copied.to_string()),
                        ("skipped", summary.skipped.to_string()),
                        ("failed", summary.failed.to_string()),
                    ],
                );
                if summary.failed > 0 {
                    EXIT_FAILURE
                } else {
                    EXIT_OK
                }
            }
            Err(e @ ReplicationError::PolicyDenied(_)) => {
                self.logger.error(&e.to_string());
                EXIT_POLICY_DENIED
            }
            Err(e) => {
                self.logger.error(&e.to_string());
                EXIT_FAILURE
            }
        }
    }

    async fn do_replicate(&self, args: &ReplicateArgs) -> Result<crate::orchestrator::ReplicationSummary> {
        let config = match &args.config {
            Some(path) => ReplicationConfig::load(path)?,
            None => ReplicationConfig::default(),
        };
        let mut config = config;
        if let Some(workers) = args.workers {
            config.worker_pool.workers = workers;
        }
        if let Some(concurrency) = args.intra_tag_concurrency {
            config.intra_tag_concurrency = concurrency;
        }

        let (source_host, source_repo) = ReplicateArgs::split_ref(&args.source)?;
        let (dest_host, dest_repo) = ReplicateArgs::split_ref(&args.destination)?;

        let token_provider = EnvTokenProvider;
        let source = Arc::new(build_transport(source_host, args.source_skip_tls, &config, &token_provider).await?)
            as Arc<dyn RegistryTransport>;
        let dest = Arc::new(build_transport(dest_host, args.dest_skip_tls, &config, &token_provider).await?)
            as Arc<dyn RegistryTransport>;

        let policy_gate = match &args.policy_file {
            Some(path) => {
                let policy = Policy::load(path)?;
                Some(Arc::new(PolicyGate { verifier: Arc::new(SignatureVerifier::new(None)), policy }))
            }
            None => None,
        };

        let metrics = Arc::new(MetricsSink::new());
        let orchestrator = ReplicationOrchestrator::new(config, metrics);

        self.logger.section("Replicating");
        self.logger.step(&format!("{} -> {}", args.source, args.destination));

        orchestrator
            .replicate(
                source,
                dest,
                ReplicationOptions {
                    source_repo: source_repo.to_string(),
                    dest_repo: dest_repo.to_string(),
                    policy_gate,
                },
                CancellationToken::new(),
            )
            .await
    }

    async fn run_serve_metrics(&self, args: ServeMetricsArgs) -> i32 {
        let metrics = Arc::new(MetricsSink::new());
        let router = crate::metrics::server::router(metrics);
        self.logger.info(&format!("serving metrics on {}", args.bind));

        let listener = match tokio::net::TcpListener::bind(args.bind).await {
            Ok(listener) => listener,
            Err(e) => {
                self.logger.error(&format!("failed to bind {}: {e}", args.bind));
                return EXIT_FAILURE;
            }
        };
        if let Err(e) = axum::serve(listener, router).await {
            self.logger.error(&format!("metrics server exited: {e}"));
            return EXIT_FAILURE;
        }
        EXIT_OK
    }

    async fn run_verify(&self, args: VerifyArgs) -> i32 {
        if let Err(e) = args.validate() {
            self.logger.error(&e.to_string());
            return EXIT_FAILURE;
        }

        match self.do_verify(&args).await {
            Ok(true) => {
                self.logger.success("signature policy satisfied");
                EXIT_OK
            }
            Ok(false) => {
                self.logger.error("signature policy not satisfied");
                EXIT_POLICY_DENIED
            }
            Err(e) => {
                self.logger.error(&e.to_string());
                EXIT_FAILURE
            }
        }
    }

    async fn do_verify(&self, args: &VerifyArgs) -> Result<bool> {
        let (reference, digest) = args
            .image
            .split_once('@')
            .ok_or_else(|| ReplicationError::Validation("image reference must include a digest".into()))?;
        let (host, repo) = ReplicateArgs::split_ref(reference)?;

        let policy = Policy::load(&args.policy_file)?;
        let token_provider = EnvTokenProvider;
        let transport = build_transport(host, args.skip_tls, &ReplicationConfig::default(), &token_provider).await?;

        let rekor = args.rekor_url.as_ref().map(|url| RekorClient::new(url.clone()));
        let verifier = SignatureVerifier::new(rekor);
        let signatures = match verifier.verify(&transport, repo, digest, policy.require_rekor).await {
            Ok(signatures) => signatures,
            Err(ReplicationError::NoSignatures(_)) => Vec::new(),
            Err(e) if policy.enforcement_mode != EnforcementMode::Enforce => {
                self.logger.warning(&format!("signature verification failed, not enforced: {e}"));
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        let evaluation = PolicyEngine::evaluate(&policy, &signatures);
        for warning in &evaluation.warnings {
            self.logger.warning(warning);
        }
        for error in &evaluation.errors {
            self.logger.detail(error);
        }
        self.logger.summary_kv(
            "Verification",
            &[
                ("evaluated", evaluation.evaluated_count.to_string()),
                ("valid", evaluation.valid_count.to_string()),
                ("passed", evaluation.passed.to_string()),
            ],
        );
        Ok(evaluation.passed)
    }
}

async fn build_transport(
    host: &str,
    skip_tls: bool,
    config: &ReplicationConfig,
    token_provider: &dyn TokenProvider,
) -> Result<HttpTransport> {
    let pool = ConnectionPool::new(config.connection_pool.max_idle_per_host, config.connection_pool.idle_timeout());
    let token = token_provider.token_for(host).await;
    Ok(HttpTransport::new(format!("https://{host}"), skip_tls, pool).with_token(token))
}
