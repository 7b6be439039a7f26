//! terrabotd - pull request driven Terraform automation daemon
//!
//! Reads normalized pull request events as newline-delimited JSON on stdin
//! and runs them through the terrabot engine against GitHub and a local
//! data directory.
//!
//! ## Lifecycle
//!
//! - load `--config` (TOML) and apply CLI overrides
//! - connect the pull status store and build the engine
//! - read events until EOF or Ctrl-C
//! - drain in-flight commands, flush metrics, exit

mod config;
mod intake;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use pull_state::SurrealPullStatusStore;
use terrabot_core::telemetry::{init_tracing, install_panic_hook};
use terrabot_core::{
    Collaborators, CommandRunner, DispatchMode, Drainer, EventDispatcher, Metrics,
};
use terrabot_exec::{
    ConfiguredUnitBuilder, PlanFileCleaner, ShellHookRunner, StepProjectExecutor, WorkspaceLocker,
};
use terrabot_github::GitHubClient;
use tokio::io::BufReader;
use tracing::{info, warn, Level};

use crate::config::{DaemonConfig, Overrides};

#[derive(Parser, Debug)]
#[command(name = "terrabotd")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Pull request driven Terraform plan/apply daemon", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "TERRABOT_CONFIG")]
    config: Option<PathBuf>,

    /// Emit JSON-formatted log lines
    #[arg(long, env = "TERRABOT_LOG_JSON")]
    json: bool,

    /// Default log level when RUST_LOG is unset
    #[arg(long, env = "TERRABOT_LOG_LEVEL", default_value = "info")]
    log_level: Level,

    /// Handle each event before reading the next one
    #[arg(long)]
    sync: bool,

    /// Pull status store URL, overriding `[store] url`
    #[arg(long, env = "TERRABOT_DB")]
    db: Option<String>,

    /// Ignore pull request open/update events
    #[arg(long, env = "TERRABOT_DISABLE_AUTOPLAN")]
    disable_autoplan: bool,

    /// Reject `apply` comments that don't name a dir, workspace or project
    #[arg(long, env = "TERRABOT_DISABLE_APPLY_ALL")]
    disable_apply_all: bool,

    /// Merge pull requests once every project is applied
    #[arg(long, env = "TERRABOT_AUTOMERGE")]
    automerge: bool,

    /// Worker pool size for parallel plan/apply
    #[arg(long, env = "TERRABOT_PARALLEL_POOL_SIZE")]
    parallel_pool_size: Option<usize>,

    /// Users allowed to approve failing policies (comma separated)
    #[arg(long, env = "TERRABOT_POLICY_APPROVERS", value_delimiter = ',')]
    policy_approvers: Vec<String>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            db: self.db.clone(),
            disable_autoplan: self.disable_autoplan,
            disable_apply_all: self.disable_apply_all,
            automerge: self.automerge,
            parallel_pool_size: self.parallel_pool_size,
            policy_approvers: self.policy_approvers.clone(),
        }
    }
}

/// Wire every collaborator and build the engine.
async fn build_runner(
    cfg: &DaemonConfig,
    drainer: Arc<Drainer>,
    metrics: Arc<Metrics>,
) -> Result<CommandRunner> {
    let store = SurrealPullStatusStore::connect(&cfg.store.url)
        .await
        .with_context(|| format!("Failed to connect to pull status store at {}", cfg.store.url))?;

    let github = Arc::new(
        GitHubClient::new(cfg.github.clone().with_env_token(), cfg.engine.status_name.clone())
            .context("Failed to create GitHub client")?,
    );

    let exec = Arc::new(cfg.exec.clone());
    tokio::fs::create_dir_all(&exec.data_dir)
        .await
        .with_context(|| format!("Failed to create data dir {}", exec.data_dir.display()))?;
    let hooks = Arc::new(ShellHookRunner::from_config(&exec));

    let collaborators = Collaborators {
        vcs: github.clone(),
        status: github,
        builder: Arc::new(ConfiguredUnitBuilder::new(Arc::clone(&exec))),
        executor: Arc::new(StepProjectExecutor::new(
            Arc::clone(&exec),
            WorkspaceLocker::new(),
        )),
        store: Arc::new(store),
        pre_hooks: hooks.clone(),
        post_hooks: hooks,
        plan_cleaner: Arc::new(PlanFileCleaner::new(exec.data_dir.clone())),
    };

    CommandRunner::new(collaborators, cfg.engine.clone(), drainer, metrics)
        .context("Invalid engine configuration")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "unable to listen for Ctrl-C; relying on EOF");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json, cli.log_level);
    install_panic_hook();

    let mut cfg = DaemonConfig::load(cli.config.as_deref())?;
    cfg.apply(cli.overrides());

    let drainer = Arc::new(Drainer::new());
    let metrics = Arc::new(Metrics::new());
    let runner = build_runner(&cfg, Arc::clone(&drainer), Arc::clone(&metrics)).await?;

    let mode = if cli.sync {
        DispatchMode::Inline
    } else {
        DispatchMode::Background
    };
    let dispatcher = EventDispatcher::new(Arc::new(runner), mode);
    info!(?mode, store = %cfg.store.url, "terrabotd started");

    let stats = intake::run_intake(
        BufReader::new(tokio::io::stdin()),
        &dispatcher,
        shutdown_signal(),
    )
    .await?;
    info!(
        lines = stats.lines,
        submitted = stats.submitted,
        malformed = stats.malformed,
        "event intake finished"
    );

    drainer.shutdown().await;
    let outcomes = dispatcher.join_all().await;
    info!(
        background_events = outcomes.len(),
        status = ?drainer.status(),
        "drained"
    );
    metrics.flush();
    Ok(())
}
