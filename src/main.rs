//! refsync
//!
//! Recomputes the derived reference counters and link arrays of the entity
//! datastore and prunes entities left without referents. Meant to be run
//! periodically by an external scheduler while no other writer is active.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use common::EntityStore;
use common::SqlStore;
use common::cli::utils;
use common::cli::{Commands, CommonArgs};
use common::config::Configuration;
use reconciler::{ConsistencyChecker, Orchestrator, ReconcileMetrics};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Waits for a shutdown signal (SIGINT or SIGTERM)
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

        tokio::select! {
            _ = sigint.recv() => log::info!("Received SIGINT"),
            _ = sigterm.recv() => log::info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for shutdown signal")?;
        log::info!("Received Ctrl+C");
    }

    Ok(())
}

fn version_info() -> String {
    format!(
        "{} {} (rust {})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        env!("CARGO_PKG_RUST_VERSION")
    )
}

async fn connect(config: &Configuration) -> Result<Arc<dyn EntityStore>> {
    let store = SqlStore::connect(&config.database)
        .await
        .context("Failed to connect to entity datastore")?;
    Ok(Arc::new(store))
}

async fn run(config: &Configuration, json: bool) -> Result<ExitCode> {
    let store = connect(config).await?;
    let metrics = ReconcileMetrics::new();
    let orchestrator = Orchestrator::new(store, config.reconciler.clone(), metrics.clone());

    let report = tokio::select! {
        result = orchestrator.run() => result.context("Reconciliation run failed")?,
        signal = wait_for_shutdown_signal() => {
            signal?;
            log::warn!("Reconciliation interrupted; re-run the job to restore consistency");
            return Ok(ExitCode::FAILURE);
        }
    };

    for notice in report.notices() {
        println!("{notice}");
    }
    if json {
        let json =
            serde_json::to_string_pretty(&report).context("Failed to serialize run report")?;
        println!("{json}");
    }
    report.log();
    metrics.summary().log();

    let consistent = report
        .verification
        .as_ref()
        .is_none_or(|verification| verification.is_consistent());
    Ok(if consistent {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn verify(config: &Configuration) -> Result<ExitCode> {
    let store = connect(config).await?;
    let report = ConsistencyChecker::new(store)
        .check()
        .await
        .context("Consistency check failed")?;

    for violation in &report.violations {
        println!("{}", serde_json::to_string(violation)?);
    }
    report.log();

    Ok(if report.is_consistent() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    utils::init_logging(&cli.common);

    let command = cli.command.unwrap_or_default();
    if command == Commands::Version {
        println!("{}", version_info());
        return Ok(ExitCode::SUCCESS);
    }

    let config = utils::load_config(cli.common.config.as_ref())?;
    if utils::handle_common_command(&command, &config)? {
        return Ok(ExitCode::SUCCESS);
    }
    config.validate().context("Invalid configuration")?;

    match command {
        Commands::Run { json } => run(&config, json).await,
        Commands::Verify => verify(&config).await,
        Commands::Config { .. } | Commands::Validate | Commands::Version => Ok(ExitCode::SUCCESS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_is_the_default_command() {
        let cli = Cli::parse_from(["refsync", "--config", "custom.toml", "-v"]);
        assert!(cli.command.is_none());
        assert!(cli.common.verbose);
        assert_eq!(
            cli.common.config.as_deref(),
            Some(std::path::Path::new("custom.toml"))
        );
    }

    #[test]
    fn test_run_json_flag() {
        let cli = Cli::parse_from(["refsync", "run", "--json", "-q"]);
        assert_eq!(cli.command, Some(Commands::Run { json: true }));
        assert!(cli.common.quiet);
    }

    #[test]
    fn test_version_info_names_the_binary() {
        assert!(version_info().starts_with(concat!("refsync ", env!("CARGO_PKG_VERSION"))));
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["refsync", "-q", "-v"]).is_err());
    }
}
