//! Backup storage contract and the persisted record shape.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::envelope::EventEnvelope;
use crate::event_type::EventType;

/// Durable last-resort store for envelopes the transport refused.
///
/// Implementations may retry internally; each call carries an envelope with a
/// freshly minted message id, so a retried write is keyed the same way.
pub trait EventPersistence: Send + Sync {
    fn persist_event(&self, event_type: EventType, envelope: &EventEnvelope) -> anyhow::Result<()>;
}

impl<P> EventPersistence for Arc<P>
where
    P: EventPersistence + ?Sized,
{
    fn persist_event(&self, event_type: EventType, envelope: &EventEnvelope) -> anyhow::Result<()> {
        (**self).persist_event(event_type, envelope)
    }
}

/// Persisted record of a failed publish.
///
/// Created only on send failure. The only later mutation is setting
/// `message_sent_time_millis` once a replay has gone through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBackupData {
    pub event_type: EventType,
    pub message_failure_time_millis: i64,
    #[serde(default)]
    pub message_sent_time_millis: Option<i64>,
    pub message_id: String,
    pub envelope_json: String,
}

impl EventBackupData {
    /// Capture `envelope` as having failed to send at `failed_at`.
    pub fn from_failed_send(
        event_type: EventType,
        envelope: &EventEnvelope,
        failed_at: DateTime<Utc>,
    ) -> serde_json::Result<Self> {
        Ok(Self {
            event_type,
            message_failure_time_millis: failed_at.timestamp_millis(),
            message_sent_time_millis: None,
            message_id: envelope.message_id().to_string(),
            envelope_json: envelope.to_json()?,
        })
    }

    pub fn is_sent(&self) -> bool {
        self.message_sent_time_millis.is_some()
    }

    pub fn mark_sent(&mut self, sent_at: DateTime<Utc>) {
        self.message_sent_time_millis = Some(sent_at.timestamp_millis());
    }
}

#[cfg(test)]
mod tests {
    use census_core::{Channel, Source};

    use super::*;
    use crate::builder::{BuilderRegistry, SendInfo};
    use crate::payload::Uac;

    #[test]
    fn record_uses_compatible_field_names() {
        let envelope = BuilderRegistry::default()
            .builder_for(EventType::UacUpdate)
            .create(SendInfo::new(
                Uac {
                    uac_hash: "abc".to_string(),
                    active: true,
                    ..Default::default()
                },
                Source::CaseService,
                Channel::Rm,
            ))
            .unwrap();
        let failed_at = Utc::now();

        let record = EventBackupData::from_failed_send(EventType::UacUpdate, &envelope, failed_at).unwrap();
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["eventType"], "UAC_UPDATE");
        assert_eq!(json["messageFailureTimeMillis"], failed_at.timestamp_millis());
        assert!(json["messageSentTimeMillis"].is_null());
        assert_eq!(json["messageId"], envelope.message_id().to_string());
        assert_eq!(json["envelopeJson"], envelope.to_json().unwrap());
    }

    #[test]
    fn mark_sent_sets_timestamp() {
        let mut record = EventBackupData {
            event_type: EventType::CaseUpdate,
            message_failure_time_millis: 1,
            message_sent_time_millis: None,
            message_id: "m-1".to_string(),
            envelope_json: "{}".to_string(),
        };
        assert!(!record.is_sent());

        let now = Utc::now();
        record.mark_sent(now);
        assert_eq!(record.message_sent_time_millis, Some(now.timestamp_millis()));
        assert!(record.is_sent());
    }
}
