//! nufeed CLI - administrative front end for the feed engine.
//!
//! Command implementations live in the `commands` module; this crate root
//! wires up argument parsing, logging, the repository instance, and
//! ctrl-c-driven cancellation.

use anyhow::{Context, Result, bail};
use clap::Parser;
use nufeed_core::{FeedConfig, Repository};
use tokio_util::sync::CancellationToken;

mod cli;
mod commands;

use cli::{Cli, Commands};

/// Execute the nufeed CLI with the currently configured environment.
///
/// # Errors
///
/// Returns an error when configuration is missing or a command fails.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    initialize_logging(cli.verbose);

    let config = resolve_config(&cli)?;
    let repo = Repository::new(config).context("failed to open feed repository")?;

    let cancel = CancellationToken::new();
    spawn_ctrl_c_handler(cancel.clone());

    let result = match &cli.command {
        Commands::Push { file } => commands::push::execute(&repo, file, cli.json, &cancel).await,
        Commands::Remove { id, version } => {
            commands::remove::execute(&repo, id, version, &cancel).await
        },
        Commands::List { id, semver2 } => {
            commands::list::execute(&repo, id.as_deref(), *semver2, cli.json, &cancel).await
        },
        Commands::Search {
            term,
            prerelease,
            frameworks,
        } => commands::search::execute(&repo, term, *prerelease, frameworks, cli.json, &cancel).await,
        Commands::Rebuild => commands::rebuild::execute(&repo, &cancel).await,
    };

    repo.shutdown().await;
    result
}

/// Resolve the feed configuration from `--config`, `--root`, or both.
fn resolve_config(cli: &Cli) -> Result<FeedConfig> {
    let mut config = match &cli.config {
        Some(path) => FeedConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => match &cli.root {
            Some(root) => {
                let mut config = FeedConfig::new(root.clone());
                config.apply_env_overrides();
                config
            },
            None => bail!("no feed root: pass --root, --config, or set NUFEED_ROOT"),
        },
    };
    if let Some(root) = &cli.root {
        config.package_root = root.clone();
    }
    // A one-shot CLI has no use for timers; the watcher would be unbound
    // before it could fire.
    config.enable_background_tasks = false;
    config.enable_file_system_monitoring = false;
    Ok(config)
}

fn initialize_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn spawn_ctrl_c_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });
}
