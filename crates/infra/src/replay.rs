//! Resend of backed-up events.
//!
//! A replay rebuilds each unsent [`EventBackupData`] into a fresh envelope
//! (new message id and timestamp, same payload and routing) and sends it
//! through a publisher that has no backup of its own, so a record that fails
//! again stays where it is instead of being copied. After a successful resend
//! the original record is stamped with `messageSentTimeMillis` and kept.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use census_events::{BuilderRegistry, EventPublisher, EventSender, TopicMap};

use crate::data_store::{CloudDataStore, DataStoreError};
use crate::event_persistence::DataStoreEventPersistence;

/// Outcome counts of one replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub replayed: usize,
    /// Records already stamped as sent.
    pub skipped: usize,
    pub failed: usize,
}

impl ReplaySummary {
    pub fn attempted(&self) -> usize {
        self.replayed + self.failed
    }
}

pub struct BackupReplayer<S> {
    publisher: EventPublisher,
    backups: Arc<DataStoreEventPersistence<S>>,
}

impl<S> core::fmt::Debug for BackupReplayer<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BackupReplayer")
            .field("publisher", &self.publisher)
            .finish_non_exhaustive()
    }
}

impl<S: CloudDataStore> BackupReplayer<S> {
    pub fn new(sender: impl EventSender + 'static, backups: Arc<DataStoreEventPersistence<S>>) -> Self {
        Self {
            publisher: EventPublisher::without_event_persistence(sender),
            backups,
        }
    }

    pub fn with_topics(mut self, topics: TopicMap) -> Self {
        self.publisher = self.publisher.with_topics(topics);
        self
    }

    pub fn with_builders(mut self, builders: BuilderRegistry) -> Self {
        self.publisher = self.publisher.with_builders(builders);
        self
    }

    /// Resend every unsent backup record once.
    ///
    /// Per-record failures, including documents that are not valid backup
    /// records, are logged and counted; only failing to read the backup store
    /// aborts the pass.
    #[instrument(skip_all, err)]
    pub fn replay_all(&self) -> Result<ReplaySummary, DataStoreError> {
        let scan = self.backups.scan()?;
        let mut summary = ReplaySummary {
            skipped: scan.sent,
            ..ReplaySummary::default()
        };

        for bad in &scan.undecodable {
            warn!(
                message_id = bad.message_id.as_deref().unwrap_or("<unknown>"),
                error = %bad.error,
                "backup document is not a valid record; leaving it in place"
            );
            summary.failed += 1;
        }

        for record in scan.unsent {
            let new_message_id = match self.publisher.send_backup(&record) {
                Ok(id) => id,
                Err(err) => {
                    warn!(
                        message_id = %record.message_id,
                        event_type = %record.event_type,
                        error = %err,
                        "replay of backed-up event failed"
                    );
                    summary.failed += 1;
                    continue;
                }
            };

            match self.backups.mark_sent(&record.message_id, Utc::now()) {
                Ok(_) => {
                    info!(message_id = %record.message_id, %new_message_id, "backed-up event replayed");
                    summary.replayed += 1;
                }
                Err(err) => {
                    // The event went out; a later pass may send it again.
                    error!(
                        message_id = %record.message_id,
                        %new_message_id,
                        error = %err,
                        "replayed event but could not mark its backup record as sent"
                    );
                    summary.failed += 1;
                }
            }
        }

        info!(
            replayed = summary.replayed,
            skipped = summary.skipped,
            failed = summary.failed,
            "backup replay finished"
        );
        Ok(summary)
    }
}
