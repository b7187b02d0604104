//! Backup storage for events the transport refused, on top of a [`CloudDataStore`].
//!
//! Each record is an [`EventBackupData`] document keyed by the message id of
//! the envelope that failed, in a single schema (`event-backup` unless
//! configured otherwise). Records are never deleted here; a successful replay
//! only stamps `messageSentTimeMillis`.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::debug;

use census_events::{EventBackupData, EventEnvelope, EventPersistence, EventType};

use crate::data_store::{CloudDataStore, DataStoreError, RetryableCloudDataStore};

pub const DEFAULT_BACKUP_SCHEMA: &str = "event-backup";

const MESSAGE_ID_FIELD: &str = "messageId";

/// A stored document that is not a valid backup record.
#[derive(Debug)]
pub struct UndecodableBackup {
    /// `messageId` of the document, when it has a string one.
    pub message_id: Option<String>,
    pub error: DataStoreError,
}

/// Backup schema contents, split by replay state.
#[derive(Debug, Default)]
pub struct BackupScan {
    /// Oldest failure first.
    pub unsent: Vec<EventBackupData>,
    /// Records already stamped as sent.
    pub sent: usize,
    pub undecodable: Vec<UndecodableBackup>,
}

#[derive(Debug)]
pub struct DataStoreEventPersistence<S> {
    store: RetryableCloudDataStore<S>,
    schema: String,
}

impl<S: CloudDataStore> DataStoreEventPersistence<S> {
    pub fn new(store: RetryableCloudDataStore<S>) -> Self {
        Self::with_schema(store, DEFAULT_BACKUP_SCHEMA)
    }

    pub fn with_schema(store: RetryableCloudDataStore<S>, schema: impl Into<String>) -> Self {
        Self {
            store,
            schema: schema.into(),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn store(&self) -> &RetryableCloudDataStore<S> {
        &self.store
    }

    fn write(&self, record: &EventBackupData) -> Result<(), DataStoreError> {
        let document = serde_json::to_value(record)?;
        self.store
            .store_object(&self.schema, &record.message_id, &document, &record.message_id)
    }

    pub fn find(&self, message_id: &str) -> Result<Option<EventBackupData>, DataStoreError> {
        self.store
            .retrieve_object(&self.schema, message_id)?
            .map(decode)
            .transpose()
    }

    pub fn find_all(&self) -> Result<Vec<EventBackupData>, DataStoreError> {
        self.store.list(&self.schema)?.into_iter().map(decode).collect()
    }

    /// Read every document in the backup schema, decoding each on its own.
    ///
    /// A document that does not decode as [`EventBackupData`] is reported in
    /// [`BackupScan::undecodable`] and does not affect the others.
    pub fn scan(&self) -> Result<BackupScan, DataStoreError> {
        let mut scan = BackupScan::default();
        for document in self.store.list(&self.schema)? {
            let message_id = document
                .get(MESSAGE_ID_FIELD)
                .and_then(JsonValue::as_str)
                .map(str::to_string);
            match decode(document) {
                Ok(record) if record.is_sent() => scan.sent += 1,
                Ok(record) => scan.unsent.push(record),
                Err(error) => scan.undecodable.push(UndecodableBackup { message_id, error }),
            }
        }
        scan.unsent.sort_by_key(|r| r.message_failure_time_millis);
        Ok(scan)
    }

    /// Records not yet replayed, oldest failure first. Undecodable documents
    /// are left out (see [`Self::scan`]).
    pub fn find_unsent(&self) -> Result<Vec<EventBackupData>, DataStoreError> {
        Ok(self.scan()?.unsent)
    }

    /// Stamp the record as replayed. Returns `false` when no such record exists.
    pub fn mark_sent(&self, message_id: &str, sent_at: DateTime<Utc>) -> Result<bool, DataStoreError> {
        let Some(mut record) = self.find(message_id)? else {
            return Ok(false);
        };
        record.mark_sent(sent_at);
        self.write(&record)?;
        debug!(message_id, "backup record marked as sent");
        Ok(true)
    }
}

fn decode(document: JsonValue) -> Result<EventBackupData, DataStoreError> {
    Ok(serde_json::from_value(document)?)
}

impl<S: CloudDataStore> EventPersistence for DataStoreEventPersistence<S> {
    fn persist_event(&self, event_type: EventType, envelope: &EventEnvelope) -> anyhow::Result<()> {
        let record = EventBackupData::from_failed_send(event_type, envelope, Utc::now())?;
        self.write(&record)?;
        Ok(())
    }
}
