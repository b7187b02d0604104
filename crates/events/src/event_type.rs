//! The closed set of publishable event kinds.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use census_core::DomainError;

use crate::payload::PayloadKind;

/// Domain event kind.
///
/// Each kind is bound to exactly one payload type (see [`EventType::payload_kind`]).
/// The matching builder lives in [`crate::BuilderRegistry`] and the destination
/// topic in [`crate::TopicMap`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    CaseUpdate,
    UacUpdate,
    Fulfilment,
    Refusal,
    SurveyLaunch,
    UacAuthenticate,
    SurveyUpdate,
    CollectionExerciseUpdate,
    NewCase,
}

impl EventType {
    pub const ALL: &'static [EventType] = &[
        EventType::CaseUpdate,
        EventType::UacUpdate,
        EventType::Fulfilment,
        EventType::Refusal,
        EventType::SurveyLaunch,
        EventType::UacAuthenticate,
        EventType::SurveyUpdate,
        EventType::CollectionExerciseUpdate,
        EventType::NewCase,
    ];

    /// The payload type a publish call for this kind must supply.
    pub fn payload_kind(&self) -> PayloadKind {
        match self {
            EventType::CaseUpdate => PayloadKind::CollectionCase,
            EventType::UacUpdate => PayloadKind::Uac,
            EventType::Fulfilment => PayloadKind::FulfilmentRequest,
            EventType::Refusal => PayloadKind::RefusalDetails,
            EventType::SurveyLaunch => PayloadKind::SurveyLaunchResponse,
            EventType::UacAuthenticate => PayloadKind::UacAuthenticateResponse,
            EventType::SurveyUpdate => PayloadKind::SurveyUpdate,
            EventType::CollectionExerciseUpdate => PayloadKind::CollectionExercise,
            EventType::NewCase => PayloadKind::NewCasePayloadContent,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::CaseUpdate => "CASE_UPDATE",
            EventType::UacUpdate => "UAC_UPDATE",
            EventType::Fulfilment => "FULFILMENT",
            EventType::Refusal => "REFUSAL",
            EventType::SurveyLaunch => "SURVEY_LAUNCH",
            EventType::UacAuthenticate => "UAC_AUTHENTICATE",
            EventType::SurveyUpdate => "SURVEY_UPDATE",
            EventType::CollectionExerciseUpdate => "COLLECTION_EXERCISE_UPDATE",
            EventType::NewCase => "NEW_CASE",
        }
    }
}

impl core::fmt::Display for EventType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DomainError::unknown("event type", s))
    }
}
