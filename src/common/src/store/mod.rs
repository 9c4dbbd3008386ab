//! Datastore access for the entity graph.
//!
//! [`EntityStore`] exposes the typed bulk operations the reconciliation passes
//! are built from. Every operation is a finite bulk statement; there is no
//! transaction spanning several calls. Apply operations (`set_*`,
//! `increment_*`) commit atomically per call and silently skip ids that do
//! not exist.

mod memory;
mod sql;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Collection, Counter, DocId, LinkArray, Record, RefValue, Reference};

pub use memory::MemoryStore;
pub use sql::SqlStore;

/// Errors raised by datastore backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("failed to encode or decode a stored array: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{collection} document has a malformed key: {detail}")]
    InvalidKey {
        collection: Collection,
        detail: String,
    },
}

/// Typed bulk operations over the entity collections.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Insert a document, replacing any document with the same key.
    async fn insert(&self, record: Record) -> Result<(), StoreError>;

    async fn fetch(&self, collection: Collection, id: &DocId)
    -> Result<Option<Record>, StoreError>;

    async fn count_documents(&self, collection: Collection) -> Result<u64, StoreError>;

    /// Keys of all documents of a collection, in ascending order.
    async fn list_ids(&self, collection: Collection) -> Result<Vec<DocId>, StoreError>;

    /// Set the counter to 0 on every document. Returns the documents touched.
    async fn reset_counter(&self, counter: Counter) -> Result<u64, StoreError>;

    /// Group source documents that carry the reference field by its value.
    ///
    /// Documents lacking the field are excluded, never grouped under a null key.
    async fn group_references(
        &self,
        reference: Reference,
    ) -> Result<Vec<(DocId, u64)>, StoreError>;

    /// Overwrite the counter of each listed document. Returns the documents matched.
    async fn set_counters(
        &self,
        counter: Counter,
        counts: &[(DocId, u64)],
    ) -> Result<u64, StoreError>;

    /// Add to the counter of each listed document. Returns the documents matched.
    async fn increment_counters(
        &self,
        counter: Counter,
        counts: &[(DocId, u64)],
    ) -> Result<u64, StoreError>;

    async fn load_counters(&self, counter: Counter) -> Result<Vec<(DocId, i64)>, StoreError>;

    /// Set the array to `[]` on every document. Returns the documents touched.
    async fn reset_array(&self, array: LinkArray) -> Result<u64, StoreError>;

    /// The raw array of every document of the owner collection.
    async fn array_entries(
        &self,
        array: LinkArray,
    ) -> Result<Vec<(DocId, Vec<RefValue>)>, StoreError>;

    /// Overwrite the array of each listed document. Returns the documents matched.
    async fn set_arrays(
        &self,
        array: LinkArray,
        links: &[(DocId, Vec<DocId>)],
    ) -> Result<u64, StoreError>;

    /// Delete documents whose counter is 0. Returns the documents removed.
    async fn delete_zero_counter(&self, counter: Counter) -> Result<u64, StoreError>;

    /// Delete documents whose array is empty. Returns the documents removed.
    async fn delete_empty_array(&self, array: LinkArray) -> Result<u64, StoreError>;
}
