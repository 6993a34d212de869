use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use futures::stream::{self, StreamExt};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use callgate::admission::{AdmissionController, GuardError, RejectReason};
use callgate::call::{CallContext, DeclaredLimit};
use callgate::config::{CallgateConfig, LoggingConfig};
use callgate::key::TemplateKeyResolver;
use callgate::options::{RetryPolicy, RuleOptionsResolver, RulesConfig};
use callgate::ratelimit::FixedWindowOracle;

/// Drive calls through Callgate admission control.
#[derive(Debug, Parser)]
#[command(name = "callgate", version, about)]
struct Cli {
    /// Path to the Callgate configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run simulated calls through a fixed-window limiter
    Simulate(SimulateArgs),
    /// Validate a rules file
    CheckRules {
        /// Rules YAML file
        path: PathBuf,
    },
}

#[derive(Debug, Args)]
struct SimulateArgs {
    /// Name of the simulated operation
    #[arg(long, default_value = "simulated::operation")]
    target: String,

    /// Static rate limit key (defaults to the target)
    #[arg(long)]
    key: Option<String>,

    /// Number of calls to make
    #[arg(long, default_value_t = 20)]
    calls: usize,

    /// Calls in flight at once
    #[arg(long, default_value_t = 1)]
    concurrency: usize,

    /// Requests allowed per interval
    #[arg(long, default_value_t = 5)]
    max_requests: u64,

    /// Quota interval in milliseconds
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,

    /// Retries after a rejected attempt (no retry when omitted)
    #[arg(long)]
    retry_count: Option<u32>,

    /// Pause between attempts in milliseconds
    #[arg(long, default_value_t = 100)]
    retry_interval_ms: u64,

    /// Rules file, overriding the configured one
    #[arg(long)]
    rules: Option<PathBuf>,
}

#[derive(Debug, Default)]
struct Tally {
    proceeded: usize,
    blocked: usize,
    limit_exceeded: usize,
    interrupted: usize,
    unresolved: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = CallgateConfig::load(cli.config.as_deref())?;

    init_tracing(&config.logging);
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Simulate(args) => simulate(&config, args).await,
        Command::CheckRules { path } => check_rules(path),
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn check_rules(path: PathBuf) -> anyhow::Result<()> {
    let rules = RulesConfig::from_file(&path)?;
    for rule in &rules.rules {
        info!(
            key = %rule.key,
            enabled = ?rule.enabled,
            blocked = ?rule.blocked,
            max_requests = ?rule.max_requests,
            "Rule"
        );
    }
    info!(path = %path.display(), rule_count = rules.rules.len(), "Rules are valid");
    Ok(())
}

async fn simulate(config: &CallgateConfig, args: SimulateArgs) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();

    let rules_path = args.rules.clone().or_else(|| config.rules.path.clone());
    let resolver = Arc::new(match &rules_path {
        Some(path) => RuleOptionsResolver::new(RulesConfig::from_file(path)?),
        None => RuleOptionsResolver::default(),
    });
    if let (Some(path), Some(every)) = (rules_path, config.rules.reload_interval()) {
        resolver.clone().spawn_reload(path, every, shutdown.clone());
    }

    let oracle = Arc::new(FixedWindowOracle::new());
    oracle
        .clone()
        .spawn_cleanup(config.cleanup.interval(), shutdown.clone());

    let gate = AdmissionController::new(Arc::new(TemplateKeyResolver::new()), resolver, oracle)
        .with_shutdown(shutdown.clone());

    let mut declared =
        DeclaredLimit::new(args.max_requests, Duration::from_millis(args.interval_ms));
    if let Some(key) = &args.key {
        declared = declared.with_key(key.clone());
    }
    if let Some(count) = args.retry_count {
        declared = declared.with_retry(RetryPolicy::new(
            count,
            Duration::from_millis(args.retry_interval_ms),
        ));
    }

    tokio::spawn({
        let shutdown = gate.shutdown_token().clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    info!(
        target_op = %args.target,
        calls = args.calls,
        concurrency = args.concurrency,
        "Starting simulation"
    );

    let gate = &gate;
    let results: Vec<_> = stream::iter(0..args.calls)
        .map(|i| {
            let call = CallContext::new(args.target.clone(), declared.clone()).with_arg("seq", i);
            async move {
                gate.guard(&call, || async { Ok::<_, Infallible>(()) })
                    .await
            }
        })
        .buffer_unordered(args.concurrency.max(1))
        .collect()
        .await;

    let mut tally = Tally::default();
    for result in results {
        match result {
            Ok(()) => tally.proceeded += 1,
            Err(GuardError::Rejected(rejection)) => match rejection.reason() {
                RejectReason::Blocked => tally.blocked += 1,
                RejectReason::LimitExceeded => tally.limit_exceeded += 1,
                RejectReason::Interrupted => tally.interrupted += 1,
            },
            Err(GuardError::Resolve(e)) => {
                warn!(error = %e, "Could not evaluate rate limiting");
                tally.unresolved += 1;
            }
            Err(GuardError::Operation(never)) => match never {},
        }
    }

    gate.shutdown_token().cancel();
    info!(
        proceeded = tally.proceeded,
        blocked = tally.blocked,
        limit_exceeded = tally.limit_exceeded,
        interrupted = tally.interrupted,
        unresolved = tally.unresolved,
        "Simulation finished"
    );
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, interrupting pending retries");
        }
        () = terminate => {
            info!("Received SIGTERM, interrupting pending retries");
        }
    }
}
