use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use serde_json::Value as JsonValue;

use super::{CloudDataStore, DataStoreError, StatusCode};

type Collections = BTreeMap<String, BTreeMap<String, JsonValue>>;

/// In-memory document store.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryDataStore {
    collections: RwLock<Collections>,
}

fn poisoned() -> DataStoreError {
    DataStoreError::backend(StatusCode::Internal, "lock poisoned")
}

impl InMemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CloudDataStore for InMemoryDataStore {
    fn store_object(&self, schema: &str, key: &str, value: &JsonValue) -> Result<(), DataStoreError> {
        let mut collections = self.collections.write().map_err(|_| poisoned())?;
        collections
            .entry(schema.to_string())
            .or_default()
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    fn retrieve_object(&self, schema: &str, key: &str) -> Result<Option<JsonValue>, DataStoreError> {
        let collections = self.collections.read().map_err(|_| poisoned())?;
        Ok(collections.get(schema).and_then(|c| c.get(key)).cloned())
    }

    fn search(&self, schema: &str, field: &str, value: &JsonValue) -> Result<Vec<JsonValue>, DataStoreError> {
        let collections = self.collections.read().map_err(|_| poisoned())?;
        let matches = collections
            .get(schema)
            .map(|c| {
                c.values()
                    .filter(|doc| doc.get(field).unwrap_or(&JsonValue::Null) == value)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(matches)
    }

    fn list(&self, schema: &str) -> Result<Vec<JsonValue>, DataStoreError> {
        let collections = self.collections.read().map_err(|_| poisoned())?;
        Ok(collections
            .get(schema)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default())
    }

    fn delete_object(&self, schema: &str, key: &str) -> Result<(), DataStoreError> {
        let mut collections = self.collections.write().map_err(|_| poisoned())?;
        if let Some(c) = collections.get_mut(schema) {
            c.remove(key);
        }
        Ok(())
    }

    fn collection_names(&self) -> Result<BTreeSet<String>, DataStoreError> {
        let collections = self.collections.read().map_err(|_| poisoned())?;
        Ok(collections.keys().cloned().collect())
    }
}
