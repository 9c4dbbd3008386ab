//! Test utilities for the reconciliation workspace.
//!
//! Provides configuration builders, seed graphs and the mockall-generated
//! [`MockEntityStore`].
//!
//! # Feature Flag
//!
//! This module is only available when the `testing` feature is enabled or during tests:
//!
//! ```toml
//! [dev-dependencies]
//! common = { path = "../common", features = ["testing"] }
//! ```

mod config_builder;
pub mod fixtures;

pub use crate::store::MockEntityStore;
pub use config_builder::TestConfigBuilder;
pub use fixtures::seed;
