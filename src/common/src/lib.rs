pub mod cli;
pub mod config;
pub mod model;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::Configuration;
pub use model::{Collection, Counter, DocId, KeyKind, LinkArray, Record, RefValue, Reference};
pub use store::{EntityStore, MemoryStore, SqlStore, StoreError};
