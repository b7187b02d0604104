//! Event publication with backup fallback.
//!
//! ## Publish protocol
//!
//! ```text
//! validate payload kind ─▶ resolve topic ─▶ build envelope (fresh header)
//!   ─▶ send (through the circuit breaker, if any)
//!        ├─ ok ─────────────────────────────▶ message id
//!        └─ failed / breaker open
//!             ├─ no backup configured ──────▶ PublishError::Send
//!             └─ persist envelope
//!                  ├─ ok ───────────────────▶ message id
//!                  └─ failed ───────────────▶ PublishError::BackupFailed
//! ```
//!
//! The publisher never retries the send itself: one transport failure is enough
//! to divert the envelope to backup storage. Retrying belongs to the backup
//! store's write path.
//!
//! A send that went to backup is reported as success. Callers cannot tell
//! "delivered" from "safely held for replay".
//!
//! ## Concurrency
//!
//! Every call is self-contained; the publisher holds no mutable state. The
//! injected sender, breaker and persistence must be thread-safe.

use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use census_core::{Channel, MessageId, Source};

use crate::builder::{BuilderRegistry, SendInfo};
use crate::circuit_breaker::{CallError, CircuitBreaker};
use crate::envelope::EventEnvelope;
use crate::error::{BuildError, PublishError};
use crate::event_type::EventType;
use crate::payload::Payload;
use crate::persistence::{EventBackupData, EventPersistence};
use crate::sender::EventSender;
use crate::topic::TopicMap;

/// Optional circuit breaker around the send.
#[derive(Clone, Default)]
pub enum Breaker {
    #[default]
    None,
    Enabled(Arc<dyn CircuitBreaker>),
}

impl Breaker {
    pub fn enabled(breaker: impl CircuitBreaker + 'static) -> Self {
        Breaker::Enabled(Arc::new(breaker))
    }
}

impl core::fmt::Debug for Breaker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Breaker::None => f.write_str("None"),
            Breaker::Enabled(cb) => f.debug_tuple("Enabled").field(&cb.name()).finish(),
        }
    }
}

/// Backup configuration, fixed at construction.
#[derive(Clone)]
enum Backup {
    Disabled,
    Enabled {
        persistence: Arc<dyn EventPersistence>,
        breaker: Breaker,
    },
}

/// Publishes typed domain events to the transport.
#[derive(Clone)]
pub struct EventPublisher {
    sender: Arc<dyn EventSender>,
    backup: Backup,
    builders: BuilderRegistry,
    topics: TopicMap,
}

impl core::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let backup = match &self.backup {
            Backup::Disabled => "disabled".to_string(),
            Backup::Enabled { breaker, .. } => format!("enabled (breaker: {breaker:?})"),
        };
        f.debug_struct("EventPublisher")
            .field("backup", &backup)
            .field("builders", &self.builders)
            .field("topics", &self.topics)
            .finish()
    }
}

impl EventPublisher {
    /// A publisher that surfaces every send failure to the caller.
    pub fn without_event_persistence(sender: impl EventSender + 'static) -> Self {
        Self {
            sender: Arc::new(sender),
            backup: Backup::Disabled,
            builders: BuilderRegistry::default(),
            topics: TopicMap::default(),
        }
    }

    /// A publisher that diverts failed sends to `persistence`.
    pub fn with_event_persistence(
        sender: impl EventSender + 'static,
        persistence: impl EventPersistence + 'static,
        breaker: Breaker,
    ) -> Self {
        Self {
            sender: Arc::new(sender),
            backup: Backup::Enabled {
                persistence: Arc::new(persistence),
                breaker,
            },
            builders: BuilderRegistry::default(),
            topics: TopicMap::default(),
        }
    }

    pub fn with_builders(mut self, builders: BuilderRegistry) -> Self {
        self.builders = builders;
        self
    }

    pub fn with_topics(mut self, topics: TopicMap) -> Self {
        self.topics = topics;
        self
    }

    pub fn has_event_persistence(&self) -> bool {
        matches!(self.backup, Backup::Enabled { .. })
    }

    pub fn topics(&self) -> &TopicMap {
        &self.topics
    }

    /// Publish `payload` as an event of `event_type`.
    ///
    /// Returns the message id of the envelope that was sent (or backed up).
    pub fn send_event(
        &self,
        event_type: EventType,
        source: Source,
        channel: Channel,
        payload: impl Into<Payload>,
    ) -> Result<MessageId, PublishError> {
        self.publish(event_type, SendInfo::new(payload, source, channel))
    }

    /// Publish a JSON payload, decoded as the payload type bound to `event_type`.
    pub fn send_event_json(
        &self,
        event_type: EventType,
        source: Source,
        channel: Channel,
        json_payload: &str,
    ) -> Result<MessageId, PublishError> {
        let payload = Payload::from_json(event_type.payload_kind(), json_payload)
            .map_err(|source| PublishError::InvalidJsonPayload { event_type, source })?;
        self.send_event(event_type, source, channel, payload)
    }

    /// Rebuild and resend a backed-up event.
    ///
    /// The resent envelope gets a new message id and timestamp; only payload
    /// and routing survive from the stored one.
    #[instrument(
        skip_all,
        fields(event_type = %backup.event_type, original_message_id = %backup.message_id),
        err
    )]
    pub fn send_backup(&self, backup: &EventBackupData) -> Result<MessageId, PublishError> {
        let send_info = self
            .builders
            .builder_for(backup.event_type)
            .create_send_info(&backup.envelope_json)
            .map_err(|err| match err {
                BuildError::NoBuilder(event_type) => PublishError::UnsupportedEventType(event_type),
                source => PublishError::MalformedBackup {
                    message_id: backup.message_id.clone(),
                    source,
                },
            })?;

        debug!("rebuilt send info from backup");
        self.publish(backup.event_type, send_info)
    }

    /// Validate, build and transmit.
    #[instrument(skip_all, fields(event_type = %event_type), err)]
    pub fn publish(&self, event_type: EventType, send_info: SendInfo) -> Result<MessageId, PublishError> {
        let expected = event_type.payload_kind();
        let actual = send_info.payload.kind();
        if expected != actual {
            return Err(PublishError::IncompatiblePayload {
                event_type,
                expected,
                actual,
            });
        }

        let topic = self
            .topics
            .topic_for(event_type)
            .ok_or(PublishError::UnsupportedEventType(event_type))?;

        let envelope = self
            .builders
            .builder_for(event_type)
            .create(send_info)
            .ok_or(PublishError::UnsupportedEventType(event_type))?;

        let message_id = envelope.message_id();
        self.transmit(event_type, topic, envelope)?;
        Ok(message_id)
    }

    fn transmit(&self, event_type: EventType, topic: &str, envelope: EventEnvelope) -> Result<(), PublishError> {
        let (persistence, breaker) = match &self.backup {
            Backup::Disabled => {
                self.sender
                    .send_event(topic, &envelope)
                    .map_err(PublishError::Send)?;
                debug!(message_id = %envelope.message_id(), topic, "event sent");
                return Ok(());
            }
            Backup::Enabled { persistence, breaker } => (persistence, breaker),
        };

        let outcome = match breaker {
            Breaker::None => self.sender.send_event(topic, &envelope),
            Breaker::Enabled(cb) => cb
                .run(&mut || self.sender.send_event(topic, &envelope))
                .map_err(|err| match err {
                    CallError::Failed(cause) => cause,
                    rejected @ CallError::NotPermitted { .. } => anyhow::Error::new(rejected),
                }),
        };

        let send_err = match outcome {
            Ok(()) => {
                debug!(message_id = %envelope.message_id(), topic, "event sent");
                return Ok(());
            }
            Err(err) => err,
        };

        let message_id = envelope.message_id();
        warn!(
            %message_id,
            topic,
            error = %send_err,
            "failed to send event; writing it to backup storage"
        );

        match persistence.persist_event(event_type, &envelope) {
            Ok(()) => {
                info!(%message_id, "event stored in backup storage");
                Ok(())
            }
            Err(persist_err) => {
                error!(
                    %message_id,
                    topic,
                    send_error = %send_err,
                    persist_error = %persist_err,
                    "failed to send event and failed to back it up; the event is lost"
                );
                Err(PublishError::BackupFailed {
                    message_id,
                    send: send_err,
                    persist: persist_err,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration as ChronoDuration, Utc};
    use proptest::prelude::*;

    use super::*;
    use crate::circuit_breaker::{BreakerState, CircuitBreakerConfig, ThresholdCircuitBreaker};
    use crate::envelope::{CaseUpdatePayload, Envelope, Header, PayloadSection};
    use crate::in_memory::{InMemoryEventPersistence, InMemoryEventSender, InMemoryFailure};
    use crate::payload::{
        CollectionCase, CollectionExercise, FulfilmentRequest, NewCasePayloadContent,
        RefusalDetails, SurveyLaunchResponse, SurveyUpdate, Uac, UacAuthenticateResponse,
    };

    fn case_payload() -> CollectionCase {
        CollectionCase {
            case_id: "abc-123".to_string(),
            invalid: false,
            ..Default::default()
        }
    }

    fn sample_payload(event_type: EventType) -> Payload {
        match event_type {
            EventType::CaseUpdate => case_payload().into(),
            EventType::UacUpdate => Uac {
                uac_hash: "0a1b".to_string(),
                active: true,
                ..Default::default()
            }
            .into(),
            EventType::Fulfilment => FulfilmentRequest {
                case_id: "abc-123".to_string(),
                fulfilment_code: "P_OR_H1".to_string(),
                ..Default::default()
            }
            .into(),
            EventType::Refusal => RefusalDetails::default().into(),
            EventType::SurveyLaunch => SurveyLaunchResponse {
                questionnaire_id: "q-1".to_string(),
                ..Default::default()
            }
            .into(),
            EventType::UacAuthenticate => UacAuthenticateResponse {
                questionnaire_id: "q-1".to_string(),
                ..Default::default()
            }
            .into(),
            EventType::SurveyUpdate => SurveyUpdate {
                survey_id: "s-1".to_string(),
                ..Default::default()
            }
            .into(),
            EventType::CollectionExerciseUpdate => CollectionExercise {
                collection_exercise_id: "ce-1".to_string(),
                ..Default::default()
            }
            .into(),
            EventType::NewCase => NewCasePayloadContent {
                case_id: "abc-123".to_string(),
                ..Default::default()
            }
            .into(),
        }
    }

    fn backed_up(
        sender: &Arc<InMemoryEventSender>,
        persistence: &Arc<InMemoryEventPersistence>,
    ) -> EventPublisher {
        EventPublisher::with_event_persistence(sender.clone(), persistence.clone(), Breaker::None)
    }

    #[test]
    fn case_update_envelope_carries_routing_and_payload() {
        let sender = Arc::new(InMemoryEventSender::new());
        let publisher = EventPublisher::without_event_persistence(sender.clone());

        let message_id = publisher
            .send_event(EventType::CaseUpdate, Source::ContactCentreApi, Channel::Cc, case_payload())
            .unwrap();

        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        let (topic, envelope) = &sent[0];
        assert_eq!(topic, "event_case-update");

        let json: serde_json::Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();
        assert_eq!(json["header"]["source"], "CONTACT_CENTRE_API");
        assert_eq!(json["header"]["channel"], "CC");
        assert_eq!(json["header"]["messageId"], message_id.to_string());
        assert_eq!(json["payload"]["collectionCase"]["caseId"], "abc-123");
    }

    #[test]
    fn every_event_type_sends_with_matching_header() {
        let sender = Arc::new(InMemoryEventSender::new());
        let publisher = EventPublisher::without_event_persistence(sender.clone());

        for event_type in EventType::ALL {
            let message_id = publisher
                .send_event(*event_type, Source::CaseService, Channel::Rm, sample_payload(*event_type))
                .unwrap();

            let (_, envelope) = sender.sent().pop().unwrap();
            assert_eq!(envelope.event_type(), *event_type);
            assert_eq!(envelope.message_id(), message_id);
            assert_eq!(envelope.payload(), sample_payload(*event_type));
            // Parses as a UUID.
            assert_eq!(message_id.to_string().parse::<MessageId>().unwrap(), message_id);
        }
    }

    #[test]
    fn message_ids_differ_per_publish() {
        let sender = Arc::new(InMemoryEventSender::new());
        let publisher = EventPublisher::without_event_persistence(sender.clone());

        let first = publisher
            .send_event(EventType::CaseUpdate, Source::CaseService, Channel::Rm, case_payload())
            .unwrap();
        let second = publisher
            .send_event(EventType::CaseUpdate, Source::CaseService, Channel::Rm, case_payload())
            .unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn json_overload_decodes_with_bound_payload_type() {
        let sender = Arc::new(InMemoryEventSender::new());
        let publisher = EventPublisher::without_event_persistence(sender.clone());

        publisher
            .send_event_json(
                EventType::CaseUpdate,
                Source::ContactCentreApi,
                Channel::Cc,
                r#"{"caseId":"abc-123","invalid":false}"#,
            )
            .unwrap();

        let (_, envelope) = sender.sent().pop().unwrap();
        assert_eq!(envelope.payload(), Payload::from(case_payload()));
    }

    #[test]
    fn invalid_json_payload_is_rejected_before_io() {
        let sender = Arc::new(InMemoryEventSender::new());
        let publisher = EventPublisher::without_event_persistence(sender.clone());

        let err = publisher
            .send_event_json(EventType::CaseUpdate, Source::ContactCentreApi, Channel::Cc, "{oops")
            .unwrap_err();
        assert!(matches!(err, PublishError::InvalidJsonPayload { event_type: EventType::CaseUpdate, .. }));
        assert_eq!(sender.attempts(), 0);
    }

    #[test]
    fn unconfigured_topic_is_unsupported() {
        let sender = Arc::new(InMemoryEventSender::new());
        let publisher = EventPublisher::without_event_persistence(sender.clone())
            .with_topics(TopicMap::default().without_topic(EventType::CaseUpdate));

        let err = publisher
            .send_event(EventType::CaseUpdate, Source::CaseService, Channel::Rm, case_payload())
            .unwrap_err();
        assert!(matches!(err, PublishError::UnsupportedEventType(EventType::CaseUpdate)));
        assert!(err.is_validation());
        assert_eq!(sender.attempts(), 0);
    }

    #[test]
    fn null_builder_is_unsupported() {
        let sender = Arc::new(InMemoryEventSender::new());
        let publisher = EventPublisher::without_event_persistence(sender.clone())
            .with_builders(BuilderRegistry::default().without(EventType::CaseUpdate));

        let err = publisher
            .send_event(EventType::CaseUpdate, Source::CaseService, Channel::Rm, case_payload())
            .unwrap_err();
        assert!(matches!(err, PublishError::UnsupportedEventType(EventType::CaseUpdate)));
        assert_eq!(sender.attempts(), 0);
    }

    #[test]
    fn send_failure_without_persistence_propagates() {
        let sender = Arc::new(InMemoryEventSender::failing());
        let publisher = EventPublisher::without_event_persistence(sender.clone());

        let err = publisher
            .send_event(EventType::CaseUpdate, Source::CaseService, Channel::Rm, case_payload())
            .unwrap_err();

        match err {
            PublishError::Send(cause) => assert_eq!(
                cause.downcast_ref::<InMemoryFailure>(),
                Some(&InMemoryFailure::TransportUnavailable {
                    topic: "event_case-update".to_string()
                })
            ),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn send_failure_with_persistence_backs_up_once_and_succeeds() {
        let sender = Arc::new(InMemoryEventSender::failing());
        let persistence = Arc::new(InMemoryEventPersistence::new());
        let publisher = backed_up(&sender, &persistence);

        let message_id = publisher
            .send_event(EventType::CaseUpdate, Source::CaseService, Channel::Rm, case_payload())
            .unwrap();

        assert_eq!(persistence.attempts(), 1);
        let envelopes = persistence.envelopes();
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].message_id(), message_id);
        assert_eq!(envelopes[0].payload(), Payload::from(case_payload()));

        let records = persistence.records();
        assert_eq!(records[0].event_type, EventType::CaseUpdate);
        assert_eq!(records[0].message_id, message_id.to_string());
    }

    #[test]
    fn successful_send_does_not_touch_persistence() {
        let sender = Arc::new(InMemoryEventSender::new());
        let persistence = Arc::new(InMemoryEventPersistence::new());
        let publisher = backed_up(&sender, &persistence);

        publisher
            .send_event(EventType::CaseUpdate, Source::CaseService, Channel::Rm, case_payload())
            .unwrap();
        assert_eq!(persistence.attempts(), 0);
    }

    #[test]
    fn double_failure_references_both_causes() {
        let sender = Arc::new(InMemoryEventSender::failing());
        let persistence = Arc::new(InMemoryEventPersistence::failing());
        let publisher = backed_up(&sender, &persistence);

        let err = publisher
            .send_event(EventType::CaseUpdate, Source::CaseService, Channel::Rm, case_payload())
            .unwrap_err();

        match &err {
            PublishError::BackupFailed { message_id, send, persist } => {
                assert!(send.downcast_ref::<InMemoryFailure>().is_some());
                assert_eq!(
                    persist.downcast_ref::<InMemoryFailure>(),
                    Some(&InMemoryFailure::StoreUnavailable {
                        message_id: message_id.to_string()
                    })
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let text = err.to_string();
        assert!(text.contains("transport unavailable"));
        assert!(text.contains("backup store unavailable"));
    }

    #[test]
    fn open_breaker_diverts_to_backup_without_calling_sender() {
        let sender = Arc::new(InMemoryEventSender::failing());
        let persistence = Arc::new(InMemoryEventPersistence::new());
        let breaker = Arc::new(ThresholdCircuitBreaker::new(
            CircuitBreakerConfig::new("pubsub").with_failure_threshold(1),
        ));
        let publisher = EventPublisher::with_event_persistence(
            sender.clone(),
            persistence.clone(),
            Breaker::Enabled(breaker.clone()),
        );

        publisher
            .send_event(EventType::CaseUpdate, Source::CaseService, Channel::Rm, case_payload())
            .unwrap();
        assert_eq!(breaker.state(), BreakerState::Open);

        publisher
            .send_event(EventType::CaseUpdate, Source::CaseService, Channel::Rm, case_payload())
            .unwrap();

        assert_eq!(sender.attempts(), 1);
        assert_eq!(persistence.records().len(), 2);
    }

    #[test]
    fn open_breaker_with_failing_backup_is_fatal() {
        let sender = Arc::new(InMemoryEventSender::failing());
        let persistence = Arc::new(InMemoryEventPersistence::new());
        let breaker = ThresholdCircuitBreaker::new(CircuitBreakerConfig::new("pubsub").with_failure_threshold(1));
        let publisher =
            EventPublisher::with_event_persistence(sender.clone(), persistence.clone(), Breaker::enabled(breaker));

        publisher
            .send_event(EventType::CaseUpdate, Source::CaseService, Channel::Rm, case_payload())
            .unwrap();

        persistence.fail_next(1);
        let err = publisher
            .send_event(EventType::CaseUpdate, Source::CaseService, Channel::Rm, case_payload())
            .unwrap_err();
        match err {
            PublishError::BackupFailed { send, .. } => {
                assert!(matches!(send.downcast_ref::<CallError>(), Some(CallError::NotPermitted { .. })));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    fn stored_case_update(hours_ago: i64) -> (EventBackupData, Header) {
        let mut header = Header::mint(
            EventType::CaseUpdate,
            Source::ContactCentreApi,
            Channel::Cc,
            Some("agent@example.com".to_string()),
        );
        header.date_time = Utc::now() - ChronoDuration::hours(hours_ago);
        let envelope = CaseUpdatePayload::into_event_envelope(Envelope {
            header: header.clone(),
            payload: CaseUpdatePayload {
                collection_case: case_payload(),
            },
        });
        let record = EventBackupData::from_failed_send(EventType::CaseUpdate, &envelope, Utc::now()).unwrap();
        (record, header)
    }

    #[test]
    fn replay_rebuilds_with_fresh_header_and_same_payload() {
        let sender = Arc::new(InMemoryEventSender::new());
        let publisher = EventPublisher::without_event_persistence(sender.clone());
        let (record, original) = stored_case_update(1);

        let message_id = publisher.send_backup(&record).unwrap();

        let (_, envelope) = sender.sent().pop().unwrap();
        let header = envelope.header();
        assert_eq!(message_id, header.message_id);
        assert_ne!(header.message_id, original.message_id);
        assert!(header.date_time > original.date_time);
        assert_eq!(header.source, original.source);
        assert_eq!(header.channel, original.channel);
        assert_eq!(header.originating_user, original.originating_user);
        assert_eq!(envelope.payload(), Payload::from(case_payload()));
    }

    #[test]
    fn replay_of_malformed_json_is_fatal() {
        let sender = Arc::new(InMemoryEventSender::new());
        let publisher = EventPublisher::without_event_persistence(sender.clone());
        let (mut record, _) = stored_case_update(1);
        record.envelope_json = "{\"header\": 42".to_string();

        let err = publisher.send_backup(&record).unwrap_err();
        match err {
            PublishError::MalformedBackup { message_id, source } => {
                assert_eq!(message_id, record.message_id);
                assert!(matches!(source, BuildError::Malformed { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(sender.attempts(), 0);
    }

    #[test]
    fn replay_failure_is_backed_up_again_under_a_new_id() {
        let sender = Arc::new(InMemoryEventSender::failing());
        let persistence = Arc::new(InMemoryEventPersistence::new());
        let publisher = backed_up(&sender, &persistence);
        let (record, _) = stored_case_update(2);

        let message_id = publisher.send_backup(&record).unwrap();

        let records = persistence.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message_id, message_id.to_string());
        assert_ne!(records[0].message_id, record.message_id);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: a payload bound to a different event type is rejected
        /// before the sender or the backup store is touched.
        #[test]
        fn mismatched_payload_never_reaches_io(
            requested in prop::sample::select(EventType::ALL.to_vec()),
            supplied in prop::sample::select(EventType::ALL.to_vec()),
        ) {
            prop_assume!(requested != supplied);

            let sender = Arc::new(InMemoryEventSender::new());
            let persistence = Arc::new(InMemoryEventPersistence::new());
            let publisher = backed_up(&sender, &persistence);

            let err = publisher
                .send_event(requested, Source::CaseService, Channel::Rm, sample_payload(supplied))
                .unwrap_err();

            match err {
                PublishError::IncompatiblePayload { event_type, expected, actual } => {
                    prop_assert_eq!(event_type, requested);
                    prop_assert_eq!(expected, requested.payload_kind());
                    prop_assert_eq!(actual, supplied.payload_kind());
                }
                other => prop_assert!(false, "unexpected error: {:?}", other),
            }
            prop_assert_eq!(sender.attempts(), 0);
            prop_assert_eq!(persistence.attempts(), 0);
        }
    }
}
