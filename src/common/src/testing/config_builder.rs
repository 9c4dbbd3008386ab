//! Test configuration builder.

use std::path::Path;

use crate::config::{Configuration, DatabaseConfig};

/// Fluent builder for configurations used by tests.
///
/// ```rust,ignore
/// use common::testing::TestConfigBuilder;
///
/// let config = TestConfigBuilder::new()
///     .in_memory()
///     .with_apply_batch_size(2)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct TestConfigBuilder {
    config: Configuration,
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Configuration::default(),
        }
    }

    /// Use a private in-memory SQLite database.
    pub fn in_memory(mut self) -> Self {
        self.config.database = DatabaseConfig::in_memory();
        self
    }

    /// Use a SQLite database file at the given path, created on connect.
    pub fn with_sqlite_file(mut self, path: &Path) -> Self {
        self.config.database.dsn = format!("sqlite://{}", path.display());
        self
    }

    pub fn with_database_dsn(mut self, dsn: &str) -> Self {
        self.config.database.dsn = dsn.to_string();
        self
    }

    pub fn with_apply_batch_size(mut self, size: usize) -> Self {
        self.config.reconciler.apply_batch_size = size;
        self
    }

    pub fn with_verify_after_run(mut self) -> Self {
        self.config.reconciler.verify_after_run = true;
        self
    }

    pub fn build(self) -> Configuration {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_builder() {
        let config = TestConfigBuilder::new().in_memory().build();
        assert!(config.database.is_in_memory());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sqlite_file_dsn() {
        let config = TestConfigBuilder::new()
            .with_sqlite_file(Path::new("/tmp/refsync/nerd.db"))
            .build();
        assert_eq!(config.database.dsn, "sqlite:///tmp/refsync/nerd.db");
        assert!(!config.database.is_in_memory());
    }

    #[test]
    fn test_reconciler_overrides() {
        let config = TestConfigBuilder::new()
            .with_apply_batch_size(2)
            .with_verify_after_run()
            .build();
        assert_eq!(config.reconciler.apply_batch_size, 2);
        assert!(config.reconciler.verify_after_run);
    }
}
