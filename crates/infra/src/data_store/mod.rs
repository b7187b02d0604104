//! Document store used as the backup holding area.
//!
//! Objects are JSON documents grouped by schema (collection) and addressed by
//! key. Only the write path is retried (see [`RetryableCloudDataStore`]);
//! reads and deletes go straight through.

pub mod in_memory;
pub mod retryable;

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use thiserror::Error;

pub use in_memory::InMemoryDataStore;
pub use retryable::RetryableCloudDataStore;

/// Backend status reported with a store failure.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum StatusCode {
    ResourceExhausted,
    Aborted,
    DeadlineExceeded,
    Unavailable,
    InvalidArgument,
    NotFound,
    PermissionDenied,
    Internal,
}

impl StatusCode {
    /// Transient contention: worth retrying after a pause.
    pub fn is_contention(&self) -> bool {
        matches!(
            self,
            StatusCode::ResourceExhausted
                | StatusCode::Aborted
                | StatusCode::DeadlineExceeded
                | StatusCode::Unavailable
        )
    }
}

#[derive(Debug, Error)]
pub enum DataStoreError {
    #[error("datastore error ({code:?}): {message}")]
    Backend { code: StatusCode, message: String },

    #[error("document could not be (de)serialised: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("retries exhausted for storage of {diagnostic_id} after {attempts} attempts")]
    RetriesExhausted {
        diagnostic_id: String,
        attempts: u32,
        #[source]
        last: Box<DataStoreError>,
    },
}

impl DataStoreError {
    pub fn backend(code: StatusCode, message: impl Into<String>) -> Self {
        Self::Backend {
            code,
            message: message.into(),
        }
    }

    pub fn is_contention(&self) -> bool {
        matches!(self, DataStoreError::Backend { code, .. } if code.is_contention())
    }
}

/// Schema-partitioned JSON document store.
pub trait CloudDataStore: Send + Sync {
    /// Create or replace the document at `schema/key`.
    fn store_object(&self, schema: &str, key: &str, value: &JsonValue) -> Result<(), DataStoreError>;

    fn retrieve_object(&self, schema: &str, key: &str) -> Result<Option<JsonValue>, DataStoreError>;

    /// Documents in `schema` whose top-level `field` equals `value`.
    fn search(&self, schema: &str, field: &str, value: &JsonValue) -> Result<Vec<JsonValue>, DataStoreError>;

    /// All documents in `schema`.
    fn list(&self, schema: &str) -> Result<Vec<JsonValue>, DataStoreError>;

    /// Deleting a missing document is not an error.
    fn delete_object(&self, schema: &str, key: &str) -> Result<(), DataStoreError>;

    fn collection_names(&self) -> Result<BTreeSet<String>, DataStoreError>;
}

impl<S> CloudDataStore for Arc<S>
where
    S: CloudDataStore + ?Sized,
{
    fn store_object(&self, schema: &str, key: &str, value: &JsonValue) -> Result<(), DataStoreError> {
        (**self).store_object(schema, key, value)
    }

    fn retrieve_object(&self, schema: &str, key: &str) -> Result<Option<JsonValue>, DataStoreError> {
        (**self).retrieve_object(schema, key)
    }

    fn search(&self, schema: &str, field: &str, value: &JsonValue) -> Result<Vec<JsonValue>, DataStoreError> {
        (**self).search(schema, field, value)
    }

    fn list(&self, schema: &str) -> Result<Vec<JsonValue>, DataStoreError> {
        (**self).list(schema)
    }

    fn delete_object(&self, schema: &str, key: &str) -> Result<(), DataStoreError> {
        (**self).delete_object(schema, key)
    }

    fn collection_names(&self) -> Result<BTreeSet<String>, DataStoreError> {
        (**self).collection_names()
    }
}
