//! Per-kind envelope builders.
//!
//! A builder converts in both directions for exactly one event kind:
//!
//! ```text
//! SendInfo (payload + routing) ──create──▶ EventEnvelope (fresh header)
//! envelope JSON (e.g. backup)  ──create_send_info──▶ SendInfo
//! ```
//!
//! Rebuilding from JSON never reuses the stored header: the envelope created
//! afterwards gets a new message id and timestamp.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

use census_core::{Channel, Source};

use crate::envelope::{
    CaseUpdatePayload, CollectionExerciseUpdatePayload, Envelope, EventEnvelope,
    FulfilmentPayload, Header, NewCasePayload, PayloadSection, RefusalPayload,
    SurveyLaunchPayload, SurveyUpdatePayload, UacAuthenticatePayload, UacUpdatePayload,
};
use crate::error::BuildError;
use crate::event_type::EventType;
use crate::payload::Payload;

/// Payload plus the routing metadata needed to mint a header.
#[derive(Debug, Clone, PartialEq)]
pub struct SendInfo {
    pub payload: Payload,
    pub source: Source,
    pub channel: Channel,
    pub originating_user: Option<String>,
}

impl SendInfo {
    pub fn new(payload: impl Into<Payload>, source: Source, channel: Channel) -> Self {
        Self {
            payload: payload.into(),
            source,
            channel,
            originating_user: None,
        }
    }

    pub fn with_originating_user(mut self, user: impl Into<String>) -> Self {
        self.originating_user = Some(user.into());
        self
    }
}

pub trait EventBuilder: Send + Sync {
    /// Build a fresh envelope, or `None` when this builder cannot produce one
    /// (wrong payload kind, or the null builder).
    fn create(&self, send_info: SendInfo) -> Option<EventEnvelope>;

    /// Recover payload and routing from a previously serialised envelope.
    fn create_send_info(&self, envelope_json: &str) -> Result<SendInfo, BuildError>;
}

/// Builder for the event kind whose payload section is `S`.
pub struct TypedEventBuilder<S> {
    _section: PhantomData<fn() -> S>,
}

impl<S> TypedEventBuilder<S> {
    pub fn new() -> Self {
        Self {
            _section: PhantomData,
        }
    }
}

impl<S> Default for TypedEventBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: PayloadSection> EventBuilder for TypedEventBuilder<S> {
    fn create(&self, send_info: SendInfo) -> Option<EventEnvelope> {
        let payload = S::wrap(send_info.payload).ok()?;
        let header = Header::mint(
            S::EVENT_TYPE,
            send_info.source,
            send_info.channel,
            send_info.originating_user,
        );
        Some(S::into_event_envelope(Envelope { header, payload }))
    }

    fn create_send_info(&self, envelope_json: &str) -> Result<SendInfo, BuildError> {
        let envelope: Envelope<S> =
            serde_json::from_str(envelope_json).map_err(|source| BuildError::Malformed {
                event_type: S::EVENT_TYPE,
                source,
            })?;

        Ok(SendInfo {
            payload: envelope.payload.into_payload(),
            source: envelope.header.source,
            channel: envelope.header.channel,
            originating_user: envelope.header.originating_user,
        })
    }
}

/// Builder for kinds that are deliberately not publishable.
#[derive(Debug, Clone, Copy)]
pub struct NullEventBuilder {
    event_type: EventType,
}

impl NullEventBuilder {
    pub fn for_type(event_type: EventType) -> Self {
        Self { event_type }
    }
}

impl EventBuilder for NullEventBuilder {
    fn create(&self, _send_info: SendInfo) -> Option<EventEnvelope> {
        None
    }

    fn create_send_info(&self, _envelope_json: &str) -> Result<SendInfo, BuildError> {
        Err(BuildError::NoBuilder(self.event_type))
    }
}

/// EventType → builder dispatch table.
///
/// Constructed once and owned by the publisher; tests build their own.
#[derive(Clone)]
pub struct BuilderRegistry {
    builders: BTreeMap<EventType, Arc<dyn EventBuilder>>,
}

impl core::fmt::Debug for BuilderRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BuilderRegistry")
            .field("event_types", &self.builders.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for BuilderRegistry {
    fn default() -> Self {
        Self::empty()
            .register(TypedEventBuilder::<CaseUpdatePayload>::new())
            .register(TypedEventBuilder::<UacUpdatePayload>::new())
            .register(TypedEventBuilder::<FulfilmentPayload>::new())
            .register(TypedEventBuilder::<RefusalPayload>::new())
            .register(TypedEventBuilder::<SurveyLaunchPayload>::new())
            .register(TypedEventBuilder::<UacAuthenticatePayload>::new())
            .register(TypedEventBuilder::<SurveyUpdatePayload>::new())
            .register(TypedEventBuilder::<CollectionExerciseUpdatePayload>::new())
            .register(TypedEventBuilder::<NewCasePayload>::new())
    }
}

impl BuilderRegistry {
    pub fn empty() -> Self {
        Self {
            builders: BTreeMap::new(),
        }
    }

    pub fn register<S: PayloadSection>(mut self, builder: TypedEventBuilder<S>) -> Self {
        self.builders.insert(S::EVENT_TYPE, Arc::new(builder));
        self
    }

    /// Replace the builder for `event_type` with the null builder.
    pub fn without(mut self, event_type: EventType) -> Self {
        self.builders
            .insert(event_type, Arc::new(NullEventBuilder::for_type(event_type)));
        self
    }

    /// The builder for `event_type`; the null builder when none is registered.
    pub fn builder_for(&self, event_type: EventType) -> Arc<dyn EventBuilder> {
        self.builders
            .get(&event_type)
            .cloned()
            .unwrap_or_else(|| Arc::new(NullEventBuilder::for_type(event_type)))
    }
}
