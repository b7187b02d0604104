//! Domain payloads carried by events.
//!
//! These are plain data carriers. Every struct tolerates missing fields on
//! deserialisation (`#[serde(default)]`) because upstream producers routinely
//! omit the ones they don't know.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Address {
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub address_line3: Option<String>,
    pub town_name: Option<String>,
    pub postcode: Option<String>,
    pub region: Option<String>,
    pub uprn: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Contact {
    pub title: Option<String>,
    pub forename: Option<String>,
    pub surname: Option<String>,
    pub tel_no: Option<String>,
}

/// Case update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CollectionCase {
    pub case_id: String,
    pub case_ref: Option<String>,
    pub case_type: Option<String>,
    pub survey: Option<String>,
    pub collection_exercise_id: Option<String>,
    pub address: Option<Address>,
    pub contact: Option<Contact>,
    pub hand_delivery: bool,
    pub invalid: bool,
    pub refusal_received: Option<String>,
}

/// Unique access code update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Uac {
    pub uac_hash: String,
    pub active: bool,
    pub questionnaire_id: Option<String>,
    pub case_id: Option<String>,
    pub form_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FulfilmentRequest {
    pub case_id: String,
    pub fulfilment_code: String,
    pub individual_case_id: Option<String>,
    pub contact: Option<Contact>,
}

/// Minimal case reference embedded in other payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaseReference {
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RefusalDetails {
    #[serde(rename = "type")]
    pub refusal_type: Option<String>,
    pub agent_id: Option<String>,
    pub call_id: Option<String>,
    pub is_householder: bool,
    pub collection_case: CaseReference,
    pub contact: Option<Contact>,
    pub address: Option<Address>,
}

/// Response recorded when a respondent is launched into a questionnaire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SurveyLaunchResponse {
    pub questionnaire_id: String,
    pub case_id: Option<String>,
    pub agent_id: Option<String>,
}

/// Response recorded when a respondent authenticates with an access code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UacAuthenticateResponse {
    pub questionnaire_id: String,
    pub case_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SurveyUpdate {
    pub survey_id: String,
    pub name: Option<String>,
    pub sample_definition_url: Option<String>,
    pub sample_definition: Option<JsonValue>,
    pub metadata: Option<JsonValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CollectionExercise {
    pub collection_exercise_id: String,
    pub survey_id: Option<String>,
    pub name: Option<String>,
    pub reference: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub metadata: Option<JsonValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NewCasePayloadContent {
    pub case_id: String,
    pub collection_exercise_id: Option<String>,
    pub sample: BTreeMap<String, String>,
    pub sample_sensitive: BTreeMap<String, String>,
}

macro_rules! payload_kinds {
    ($($kind:ident),+ $(,)?) => {
        /// Runtime descriptor of a payload type.
        ///
        /// Each [`crate::EventType`] is bound to exactly one kind.
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
        pub enum PayloadKind {
            $($kind,)+
        }

        impl PayloadKind {
            pub fn name(&self) -> &'static str {
                match self {
                    $(PayloadKind::$kind => stringify!($kind),)+
                }
            }
        }

        impl core::fmt::Display for PayloadKind {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(self.name())
            }
        }

        /// Any publishable payload.
        ///
        /// Serialises as the bare inner struct.
        #[derive(Debug, Clone, PartialEq, Serialize)]
        #[serde(untagged)]
        pub enum Payload {
            $($kind($kind),)+
        }

        impl Payload {
            pub fn kind(&self) -> PayloadKind {
                match self {
                    $(Payload::$kind(_) => PayloadKind::$kind,)+
                }
            }

            /// Deserialise `json` as the payload type described by `kind`.
            pub fn from_json(kind: PayloadKind, json: &str) -> serde_json::Result<Self> {
                match kind {
                    $(PayloadKind::$kind => serde_json::from_str::<$kind>(json).map(Payload::$kind),)+
                }
            }
        }

        $(
            impl From<$kind> for Payload {
                fn from(value: $kind) -> Self {
                    Payload::$kind(value)
                }
            }
        )+
    };
}

payload_kinds!(
    CollectionCase,
    Uac,
    FulfilmentRequest,
    RefusalDetails,
    SurveyLaunchResponse,
    UacAuthenticateResponse,
    SurveyUpdate,
    CollectionExercise,
    NewCasePayloadContent,
);
