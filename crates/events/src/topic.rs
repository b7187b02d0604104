//! Event kind → destination topic mapping.

use std::collections::BTreeMap;

use crate::event_type::EventType;

/// Default destination topics, one per [`EventType`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EventTopic {
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

impl EventTopic {
    pub fn topic(&self) -> &'static str {
        match self {
            EventTopic::CaseUpdate => "event_case-update",
            EventTopic::UacUpdate => "event_uac-update",
            EventTopic::Fulfilment => "event_fulfilment",
            EventTopic::Refusal => "event_refusal",
            EventTopic::SurveyLaunch => "event_survey-launch",
            EventTopic::UacAuthenticate => "event_uac-authenticate",
            EventTopic::SurveyUpdate => "event_survey-update",
            EventTopic::CollectionExerciseUpdate => "event_collection-exercise-update",
            EventTopic::NewCase => "event_new-case",
        }
    }

    pub fn event_type(&self) -> EventType {
        match self {
            EventTopic::CaseUpdate => EventType::CaseUpdate,
            EventTopic::UacUpdate => EventType::UacUpdate,
            EventTopic::Fulfilment => EventType::Fulfilment,
            EventTopic::Refusal => EventType::Refusal,
            EventTopic::SurveyLaunch => EventType::SurveyLaunch,
            EventTopic::UacAuthenticate => EventType::UacAuthenticate,
            EventTopic::SurveyUpdate => EventType::SurveyUpdate,
            EventTopic::CollectionExerciseUpdate => EventType::CollectionExerciseUpdate,
            EventTopic::NewCase => EventType::NewCase,
        }
    }

    /// Default topic for `event_type`.
    pub fn for_event_type(event_type: EventType) -> EventTopic {
        match event_type {
            EventType::CaseUpdate => EventTopic::CaseUpdate,
            EventType::UacUpdate => EventTopic::UacUpdate,
            EventType::Fulfilment => EventTopic::Fulfilment,
            EventType::Refusal => EventTopic::Refusal,
            EventType::SurveyLaunch => EventTopic::SurveyLaunch,
            EventType::UacAuthenticate => EventTopic::UacAuthenticate,
            EventType::SurveyUpdate => EventTopic::SurveyUpdate,
            EventType::CollectionExerciseUpdate => EventTopic::CollectionExerciseUpdate,
            EventType::NewCase => EventTopic::NewCase,
        }
    }
}

/// The topic table a publisher routes with.
///
/// `TopicMap::default()` covers every [`EventType`]. Deployments can rename
/// or drop entries; publishing a type with no entry is a configuration error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMap {
    topics: BTreeMap<EventType, String>,
}

impl Default for TopicMap {
    fn default() -> Self {
        Self::with_prefix("")
    }
}

impl TopicMap {
    /// A map with no routes at all.
    pub fn empty() -> Self {
        Self {
            topics: BTreeMap::new(),
        }
    }

    /// The default routes, each topic name prefixed with `prefix`.
    pub fn with_prefix(prefix: &str) -> Self {
        let topics = EventType::ALL
            .iter()
            .map(|t| (*t, format!("{prefix}{}", EventTopic::for_event_type(*t).topic())))
            .collect();
        Self { topics }
    }

    pub fn with_topic(mut self, event_type: EventType, topic: impl Into<String>) -> Self {
        self.topics.insert(event_type, topic.into());
        self
    }

    pub fn without_topic(mut self, event_type: EventType) -> Self {
        self.topics.remove(&event_type);
        self
    }

    /// Destination for `event_type`, or `None` when unconfigured.
    pub fn topic_for(&self, event_type: EventType) -> Option<&str> {
        self.topics.get(&event_type).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_map_is_total() {
        let map = TopicMap::default();
        for event_type in EventType::ALL {
            let topic = map.topic_for(*event_type).unwrap();
            assert_eq!(topic, EventTopic::for_event_type(*event_type).topic());
        }
    }

    #[test]
    fn topic_and_event_type_agree() {
        for event_type in EventType::ALL {
            assert_eq!(EventTopic::for_event_type(*event_type).event_type(), *event_type);
        }
    }

    #[test]
    fn overrides_and_removals() {
        let map = TopicMap::with_prefix("dev-")
            .with_topic(EventType::Refusal, "custom-refusals")
            .without_topic(EventType::NewCase);

        assert_eq!(map.topic_for(EventType::CaseUpdate), Some("dev-event_case-update"));
        assert_eq!(map.topic_for(EventType::Refusal), Some("custom-refusals"));
        assert_eq!(map.topic_for(EventType::NewCase), None);
        assert_eq!(map.len(), EventType::ALL.len() - 1);
    }

    #[test]
    fn empty_map_routes_nothing() {
        assert!(TopicMap::empty().topic_for(EventType::CaseUpdate).is_none());
    }
}
