//! In-memory sender and backup store for tests/dev.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use thiserror::Error;

use crate::envelope::EventEnvelope;
use crate::event_type::EventType;
use crate::persistence::{EventBackupData, EventPersistence};
use crate::sender::EventSender;

/// Injected failure of an in-memory collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InMemoryFailure {
    #[error("transport unavailable for topic '{topic}'")]
    TransportUnavailable { topic: String },

    #[error("backup store unavailable for message {message_id}")]
    StoreUnavailable { message_id: String },
}

/// Scripted failure budget: fail the next `n` calls (`usize::MAX` = always).
#[derive(Debug, Default)]
struct FailureScript {
    remaining: AtomicUsize,
}

impl FailureScript {
    fn set(&self, n: usize) {
        self.remaining.store(n, Ordering::SeqCst);
    }

    fn should_fail(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                usize::MAX => Some(usize::MAX),
                n => Some(n - 1),
            })
            .is_ok()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Records every accepted `(topic, envelope)` pair.
#[derive(Debug, Default)]
pub struct InMemoryEventSender {
    sent: Mutex<Vec<(String, EventEnvelope)>>,
    attempts: AtomicUsize,
    failures: FailureScript,
}

impl InMemoryEventSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sender whose every call fails.
    pub fn failing() -> Self {
        let sender = Self::default();
        sender.fail_always();
        sender
    }

    pub fn fail_next(&self, n: usize) {
        self.failures.set(n);
    }

    pub fn fail_always(&self) {
        self.failures.set(usize::MAX);
    }

    pub fn recover(&self) {
        self.failures.set(0);
    }

    /// Number of `send_event` calls, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<(String, EventEnvelope)> {
        lock(&self.sent).clone()
    }
}

impl EventSender for InMemoryEventSender {
    fn send_event(&self, topic: &str, envelope: &EventEnvelope) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failures.should_fail() {
            return Err(InMemoryFailure::TransportUnavailable {
                topic: topic.to_string(),
            }
            .into());
        }
        lock(&self.sent).push((topic.to_string(), envelope.clone()));
        Ok(())
    }
}

/// Keeps backup records in a vector.
#[derive(Debug, Default)]
pub struct InMemoryEventPersistence {
    records: Mutex<Vec<EventBackupData>>,
    envelopes: Mutex<Vec<EventEnvelope>>,
    attempts: AtomicUsize,
    failures: FailureScript,
}

impl InMemoryEventPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let persistence = Self::default();
        persistence.failures.set(usize::MAX);
        persistence
    }

    pub fn fail_next(&self, n: usize) {
        self.failures.set(n);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn records(&self) -> Vec<EventBackupData> {
        lock(&self.records).clone()
    }

    /// The envelopes as they were handed over.
    pub fn envelopes(&self) -> Vec<EventEnvelope> {
        lock(&self.envelopes).clone()
    }
}

impl EventPersistence for InMemoryEventPersistence {
    fn persist_event(&self, event_type: EventType, envelope: &EventEnvelope) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failures.should_fail() {
            return Err(InMemoryFailure::StoreUnavailable {
                message_id: envelope.message_id().to_string(),
            }
            .into());
        }
        let record = EventBackupData::from_failed_send(event_type, envelope, Utc::now())?;
        lock(&self.records).push(record);
        lock(&self.envelopes).push(envelope.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use census_core::{Channel, Source};

    use super::*;
    use crate::builder::{BuilderRegistry, SendInfo};
    use crate::payload::CollectionCase;

    fn envelope() -> EventEnvelope {
        BuilderRegistry::default()
            .builder_for(EventType::CaseUpdate)
            .create(SendInfo::new(
                CollectionCase::default(),
                Source::CaseService,
                Channel::Rm,
            ))
            .unwrap()
    }

    #[test]
    fn fail_next_is_a_budget() {
        let sender = InMemoryEventSender::new();
        sender.fail_next(2);

        assert!(sender.send_event("t", &envelope()).is_err());
        assert!(sender.send_event("t", &envelope()).is_err());
        assert!(sender.send_event("t", &envelope()).is_ok());
        assert_eq!(sender.attempts(), 3);
        assert_eq!(sender.sent().len(), 1);
    }

    #[test]
    fn failing_sender_reports_topic() {
        let sender = InMemoryEventSender::failing();
        let err = sender.send_event("event_case-update", &envelope()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<InMemoryFailure>(),
            Some(&InMemoryFailure::TransportUnavailable {
                topic: "event_case-update".to_string()
            })
        );

        sender.recover();
        assert!(sender.send_event("event_case-update", &envelope()).is_ok());
    }

    #[test]
    fn persistence_records_backup_data() {
        let persistence = InMemoryEventPersistence::new();
        let envelope = envelope();

        persistence.persist_event(EventType::CaseUpdate, &envelope).unwrap();

        let records = persistence.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message_id, envelope.message_id().to_string());
        assert_eq!(persistence.envelopes(), vec![envelope]);
    }
}
