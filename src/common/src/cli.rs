use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Arguments shared by every subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    #[arg(long, global = true, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(
        short,
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Enable quiet mode (minimal output)"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run every reconciliation pass once (default behavior)
    Run {
        #[arg(long, help = "Print the run report as JSON")]
        json: bool,
    },
    /// Check the integrity invariants without modifying the datastore
    Verify,
    /// Show current configuration and exit
    Config {
        #[arg(long, help = "Show configuration in JSON format")]
        json: bool,
    },
    /// Validate configuration and exit
    Validate,
    /// Show version information and exit
    Version,
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Run { json: false }
    }
}

pub mod utils {
    use super::*;
    use crate::config::Configuration;
    use anyhow::{Context, Result};
    use tracing_subscriber::EnvFilter;

    /// Level used when `RUST_LOG` is not set.
    pub fn default_level(args: &CommonArgs) -> &'static str {
        if args.quiet {
            "warn"
        } else if args.verbose {
            "debug"
        } else {
            "info"
        }
    }

    /// Initialize logging based on CLI arguments; `RUST_LOG` takes precedence.
    ///
    /// Logs go to stderr. Stdout is reserved for command output.
    pub fn init_logging(args: &CommonArgs) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_level(args)));

        // A subscriber may already be installed when running under a test harness.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .try_init();
    }

    /// Load configuration with optional override from CLI
    pub fn load_config(config_path: Option<&PathBuf>) -> Result<Configuration> {
        let config = match config_path {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Configuration::load_from_path(path).context("Failed to load configuration")?
            }
            None => Configuration::load().context("Failed to load configuration")?,
        };
        Ok(config)
    }

    /// Display configuration in human-readable or JSON format
    pub fn display_config(config: &Configuration, json: bool) -> Result<()> {
        if json {
            let json = serde_json::to_string_pretty(config)
                .context("Failed to serialize configuration to JSON")?;
            println!("{json}");
        } else {
            println!("refsync configuration:");
            println!("======================");
            println!("Database DSN: {}", config.database.dsn);
            println!("Max connections: {}", config.database.max_connections);
            println!("Acquire timeout: {:?}", config.database.acquire_timeout);
            println!("Apply batch size: {}", config.reconciler.apply_batch_size);
            println!("Verify after run: {}", config.reconciler.verify_after_run);
        }
        Ok(())
    }

    /// Validate configuration and report any issues
    pub fn validate_config(config: &Configuration) -> Result<()> {
        log::info!("Validating configuration...");
        config.validate()?;
        log::info!("Configuration validation passed");
        Ok(())
    }

    /// Handle commands that read the configuration but never touch the datastore.
    ///
    /// Returns `true` when the command was handled. `version` needs no
    /// configuration and is answered by the binary itself.
    pub fn handle_common_command(command: &Commands, config: &Configuration) -> Result<bool> {
        match command {
            Commands::Config { json } => {
                display_config(config, *json)?;
                Ok(true)
            }
            Commands::Validate => {
                validate_config(config)?;
                Ok(true)
            }
            Commands::Run { .. } | Commands::Verify | Commands::Version => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;

    #[test]
    fn test_default_command_is_run() {
        assert_eq!(Commands::default(), Commands::Run { json: false });
    }

    #[test]
    fn test_log_level_follows_flags() {
        let mut args = CommonArgs::default();
        assert_eq!(utils::default_level(&args), "info");
        args.verbose = true;
        assert_eq!(utils::default_level(&args), "debug");
        args.verbose = false;
        args.quiet = true;
        assert_eq!(utils::default_level(&args), "warn");
    }

    #[test]
    fn test_offline_commands_are_handled() {
        let config = Configuration::default();
        assert!(utils::handle_common_command(&Commands::Validate, &config).unwrap());
        assert!(!utils::handle_common_command(&Commands::Version, &config).unwrap());
        assert!(!utils::handle_common_command(&Commands::Verify, &config).unwrap());
        assert!(!utils::handle_common_command(&Commands::default(), &config).unwrap());
    }

    #[test]
    fn test_invalid_configuration_fails_validation() {
        let mut config = Configuration::default();
        config.database.max_connections = 0;
        assert!(utils::handle_common_command(&Commands::Validate, &config).is_err());
    }
}
