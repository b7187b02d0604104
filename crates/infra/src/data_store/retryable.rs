use std::collections::BTreeSet;

use serde_json::Value as JsonValue;
use tracing::{instrument, warn};

use super::{CloudDataStore, DataStoreError};
use crate::retry::{RetryCommand, RetryError};

/// Wraps a [`CloudDataStore`] so writes are retried on contention.
///
/// Only `store_object` retries, and only for contention status codes
/// (see [`DataStoreError::is_contention`]). Any other failure is returned
/// after the first attempt. Reads and deletes are passed through unchanged.
#[derive(Debug)]
pub struct RetryableCloudDataStore<S> {
    inner: S,
    retry: RetryCommand,
}

impl<S: CloudDataStore> RetryableCloudDataStore<S> {
    pub fn new(inner: S, retry: RetryCommand) -> Self {
        Self { inner, retry }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn retry_command(&self) -> &RetryCommand {
        &self.retry
    }

    /// Store `value`, retrying on contention.
    ///
    /// `diagnostic_id` only identifies the object in logs and errors.
    #[instrument(skip(self, value), err)]
    pub fn store_object(
        &self,
        schema: &str,
        key: &str,
        value: &JsonValue,
        diagnostic_id: &str,
    ) -> Result<(), DataStoreError> {
        self.retry
            .run_while(|| self.inner.store_object(schema, key, value), DataStoreError::is_contention)
            .map_err(|err| match err {
                RetryError::MaxRetriesExceeded { attempts, last } => {
                    warn!(diagnostic_id, attempts, error = %last, "giving up on storing object");
                    DataStoreError::RetriesExhausted {
                        diagnostic_id: diagnostic_id.to_string(),
                        attempts,
                        last: Box::new(last),
                    }
                }
                RetryError::NotRetryable(err) => err,
            })
    }

    pub fn retrieve_object(&self, schema: &str, key: &str) -> Result<Option<JsonValue>, DataStoreError> {
        self.inner.retrieve_object(schema, key)
    }

    pub fn search(&self, schema: &str, field: &str, value: &JsonValue) -> Result<Vec<JsonValue>, DataStoreError> {
        self.inner.search(schema, field, value)
    }

    pub fn list(&self, schema: &str) -> Result<Vec<JsonValue>, DataStoreError> {
        self.inner.list(schema)
    }

    pub fn delete_object(&self, schema: &str, key: &str) -> Result<(), DataStoreError> {
        self.inner.delete_object(schema, key)
    }

    pub fn collection_names(&self) -> Result<BTreeSet<String>, DataStoreError> {
        self.inner.collection_names()
    }
}
