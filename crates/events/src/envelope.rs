use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use census_core::{Channel, CorrelationId, MessageId, Source};

use crate::event_type::EventType;
use crate::payload::{
    CollectionCase, CollectionExercise, FulfilmentRequest, NewCasePayloadContent, Payload,
    RefusalDetails, SurveyLaunchResponse, SurveyUpdate, Uac, UacAuthenticateResponse,
};

/// Routing and identity metadata of an envelope.
///
/// Notes:
/// - `message_id` is minted per build, so a rebuild from backup gets a new one.
/// - `correlation_id` starts out equal to `message_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub source: Source,
    pub channel: Channel,
    pub date_time: DateTime<Utc>,
    pub message_id: MessageId,
    pub correlation_id: CorrelationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub originating_user: Option<String>,
}

impl Header {
    /// Mint a header with a fresh message id and the current time.
    pub fn mint(
        event_type: EventType,
        source: Source,
        channel: Channel,
        originating_user: Option<String>,
    ) -> Self {
        let message_id = MessageId::new();
        Self {
            event_type,
            source,
            channel,
            date_time: Utc::now(),
            message_id,
            correlation_id: CorrelationId::from(message_id),
            originating_user,
        }
    }
}

/// Header + payload, the unit handed to the transport.
///
/// `P` is the kind-specific payload section (see [`PayloadSection`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<P> {
    pub header: Header,
    pub payload: P,
}

/// Kind-specific shape of the `payload` object of an envelope.
///
/// Each event kind nests its domain payload under its own key
/// (`payload.collectionCase`, `payload.response`, ...).
pub trait PayloadSection: Serialize + DeserializeOwned + Send + Sync + 'static {
    const EVENT_TYPE: EventType;

    /// Wrap `payload`, handing it back unchanged if it is the wrong kind.
    fn wrap(payload: Payload) -> Result<Self, Payload>;

    fn into_payload(self) -> Payload;

    fn into_event_envelope(envelope: Envelope<Self>) -> EventEnvelope;
}

macro_rules! payload_sections {
    ($(
        $(#[$meta:meta])*
        $variant:ident => $section:ident { $field:ident: $ty:ident as $key:literal }
    ),+ $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
            pub struct $section {
                #[serde(rename = $key)]
                pub $field: $ty,
            }

            impl PayloadSection for $section {
                const EVENT_TYPE: EventType = EventType::$variant;

                fn wrap(payload: Payload) -> Result<Self, Payload> {
                    match payload {
                        Payload::$ty($field) => Ok(Self { $field }),
                        other => Err(other),
                    }
                }

                fn into_payload(self) -> Payload {
                    Payload::$ty(self.$field)
                }

                fn into_event_envelope(envelope: Envelope<Self>) -> EventEnvelope {
                    EventEnvelope::$variant(envelope)
                }
            }
        )+

        /// A fully built envelope of any kind.
        ///
        /// Serialises as `{"header": {...}, "payload": {...}}` with the
        /// kind-specific payload section.
        #[derive(Debug, Clone, PartialEq, Serialize)]
        #[serde(untagged)]
        pub enum EventEnvelope {
            $($variant(Envelope<$section>),)+
        }

        impl EventEnvelope {
            pub fn header(&self) -> &Header {
                match self {
                    $(EventEnvelope::$variant(e) => &e.header,)+
                }
            }

            /// A copy of the domain payload.
            pub fn payload(&self) -> Payload {
                match self {
                    $(EventEnvelope::$variant(e) => e.payload.clone().into_payload(),)+
                }
            }

            pub fn into_parts(self) -> (Header, Payload) {
                match self {
                    $(EventEnvelope::$variant(e) => (e.header, e.payload.into_payload()),)+
                }
            }
        }
    };
}

payload_sections! {
    CaseUpdate => CaseUpdatePayload { collection_case: CollectionCase as "collectionCase" },
    UacUpdate => UacUpdatePayload { uac: Uac as "uac" },
    Fulfilment => FulfilmentPayload { fulfilment_request: FulfilmentRequest as "fulfilmentRequest" },
    Refusal => RefusalPayload { refusal: RefusalDetails as "refusal" },
    SurveyLaunch => SurveyLaunchPayload { response: SurveyLaunchResponse as "response" },
    UacAuthenticate => UacAuthenticatePayload { response: UacAuthenticateResponse as "response" },
    SurveyUpdate => SurveyUpdatePayload { survey_update: SurveyUpdate as "surveyUpdate" },
    CollectionExerciseUpdate => CollectionExerciseUpdatePayload {
        collection_exercise_update: CollectionExercise as "collectionExerciseUpdate"
    },
    NewCase => NewCasePayload { new_case: NewCasePayloadContent as "newCase" },
}

impl EventEnvelope {
    pub fn event_type(&self) -> EventType {
        self.header().event_type
    }

    pub fn message_id(&self) -> MessageId {
        self.header().message_id
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
