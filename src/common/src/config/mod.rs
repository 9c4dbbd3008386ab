use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

/// Prefix of environment variables overriding configuration values.
pub const ENV_PREFIX: &str = "REFSYNC__";

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "refsync.toml";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Data source name of the entity datastore (SQLite DSN)
    pub dsn: String,
    /// Maximum number of pooled connections
    pub max_connections: u32,
    /// Maximum time to wait for a pooled connection
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dsn: String::from("sqlite://.data/nerd.db"),
            max_connections: 4,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

impl DatabaseConfig {
    /// Create an in-memory database configuration
    pub fn in_memory() -> Self {
        Self {
            dsn: String::from("sqlite::memory:"),
            ..Self::default()
        }
    }

    /// Whether the DSN points at a private in-memory database.
    pub fn is_in_memory(&self) -> bool {
        self.dsn.contains(":memory:") || self.dsn.contains("mode=memory")
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Number of groups written per committed apply call.
    ///
    /// Env: REFSYNC__RECONCILER__APPLY_BATCH_SIZE
    #[serde(default = "default_apply_batch_size")]
    pub apply_batch_size: usize,

    /// Run the consistency checker after a successful run.
    ///
    /// Env: REFSYNC__RECONCILER__VERIFY_AFTER_RUN
    #[serde(default)]
    pub verify_after_run: bool,
}

fn default_apply_batch_size() -> usize {
    1000
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            apply_batch_size: default_apply_batch_size(),
            verify_after_run: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Configuration {
    /// Entity datastore connection
    pub database: DatabaseConfig,
    /// Reconciliation job tuning
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
}

impl Configuration {
    fn figment() -> Figment {
        Figment::from(Serialized::defaults(Configuration::default()))
    }

    /// Load defaults, then `refsync.toml`, then `REFSYNC__*` environment variables.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::figment()
            .merge(Toml::file(DEFAULT_CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)
    }

    /// Like [`Configuration::load`] but reading the given file.
    pub fn load_from_path(path: &Path) -> Result<Self, Box<figment::Error>> {
        Self::figment()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)
    }

    /// Reject values the job cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.dsn.trim().is_empty() {
            anyhow::bail!("Database DSN cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!(
                "max_connections must be positive, got {}",
                self.database.max_connections
            );
        }

        if self.reconciler.apply_batch_size == 0 {
            anyhow::bail!(
                "apply_batch_size must be positive, got {}",
                self.reconciler.apply_batch_size
            );
        }

        Ok(())
    }
}
