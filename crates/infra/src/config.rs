//! Environment-driven publisher configuration.
//!
//! Every setting has a default; an environment variable only needs to be set
//! to override it. Unparsable values are rejected rather than ignored.
//!
//! | variable | default |
//! |---|---|
//! | `CENSUS_BACKUP_MAX_ATTEMPTS` | 10 |
//! | `CENSUS_BACKUP_BACKOFF_INITIAL_MS` | 100 |
//! | `CENSUS_BACKUP_BACKOFF_MULTIPLIER` | 2 |
//! | `CENSUS_BACKUP_BACKOFF_MAX_MS` | 5000 |
//! | `CENSUS_BACKUP_SCHEMA` | `event-backup` |
//! | `CENSUS_BREAKER_ENABLED` | true |
//! | `CENSUS_BREAKER_FAILURE_THRESHOLD` | 5 |
//! | `CENSUS_BREAKER_OPEN_MS` | 30000 |
//! | `CENSUS_BREAKER_HALF_OPEN_CALLS` | 1 |
//! | `CENSUS_TOPIC_PREFIX` | none |
//! | `CENSUS_TOPIC_<EVENT_TYPE>` | the built-in topic name |

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use census_events::{
    Breaker, CircuitBreakerConfig, EventPublisher, EventSender, EventType, ThresholdCircuitBreaker, TopicMap,
};

use crate::data_store::{CloudDataStore, RetryableCloudDataStore};
use crate::event_persistence::{DEFAULT_BACKUP_SCHEMA, DataStoreEventPersistence};
use crate::replay::BackupReplayer;
use crate::retry::{RetryCommand, RetryPolicy};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &str, value: &str, reason: impl ToString) -> Self {
        Self::Invalid {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Typed access to a key/value source.
struct Vars<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key).map(|v| v.trim().to_string())
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: core::fmt::Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|e| ConfigError::invalid(key, &raw, e)),
        }
    }

    fn millis(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        self.parse(key, default.as_millis() as u64).map(Duration::from_millis)
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        let Some(raw) = self.get(key) else {
            return Ok(default);
        };
        match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::invalid(key, &raw, "expected true or false")),
        }
    }

    fn positive(&self, key: &str, default: u32) -> Result<u32, ConfigError> {
        match self.parse(key, default)? {
            0 => Err(ConfigError::invalid(key, "0", "must be at least 1")),
            n => Ok(n),
        }
    }

    fn non_empty(&self, key: &str) -> Result<Option<String>, ConfigError> {
        match self.get(key) {
            Some(raw) if raw.is_empty() => Err(ConfigError::invalid(key, &raw, "must not be empty")),
            other => Ok(other),
        }
    }
}

/// Backoff for writes to the backup store.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub backoff_initial: Duration,
    pub backoff_multiplier: f64,
    pub backoff_max: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff_initial: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            backoff_max: Duration::from_millis(5000),
        }
    }
}

impl RetrySettings {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff(mut self, initial: Duration, multiplier: f64, max: Duration) -> Self {
        self.backoff_initial = initial;
        self.backoff_multiplier = multiplier;
        self.backoff_max = max;
        self
    }

    pub fn retry_command(&self) -> RetryCommand {
        RetryCommand::with_policy(RetryPolicy::exponential(
            self.max_attempts,
            self.backoff_initial,
            self.backoff_multiplier,
            self.backoff_max,
        ))
    }

    fn load<F: Fn(&str) -> Option<String>>(vars: &Vars<F>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let max_attempts = vars.positive("CENSUS_BACKUP_MAX_ATTEMPTS", defaults.max_attempts)?;
        let backoff_multiplier = vars.parse("CENSUS_BACKUP_BACKOFF_MULTIPLIER", defaults.backoff_multiplier)?;
        if !backoff_multiplier.is_finite() || backoff_multiplier < 1.0 {
            return Err(ConfigError::invalid(
                "CENSUS_BACKUP_BACKOFF_MULTIPLIER",
                &backoff_multiplier.to_string(),
                "must be a finite number >= 1",
            ));
        }
        Ok(Self {
            max_attempts,
            backoff_initial: vars.millis("CENSUS_BACKUP_BACKOFF_INITIAL_MS", defaults.backoff_initial)?,
            backoff_multiplier,
            backoff_max: vars.millis("CENSUS_BACKUP_BACKOFF_MAX_MS", defaults.backoff_max)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupStoreSettings {
    pub schema: String,
}

impl Default for BackupStoreSettings {
    fn default() -> Self {
        Self {
            schema: DEFAULT_BACKUP_SCHEMA.to_string(),
        }
    }
}

impl BackupStoreSettings {
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerSettings {
    pub enabled: bool,
    pub failure_threshold: u32,
    pub open_duration: Duration,
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            open_duration: Duration::from_secs(30),
            half_open_max_calls: 1,
        }
    }
}

impl CircuitBreakerSettings {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_open_duration(mut self, duration: Duration) -> Self {
        self.open_duration = duration;
        self
    }

    /// The breaker to put around sends, named `name` in logs.
    pub fn breaker(&self, name: &str) -> Breaker {
        if !self.enabled {
            return Breaker::None;
        }
        Breaker::enabled(ThresholdCircuitBreaker::new(
            CircuitBreakerConfig::new(name)
                .with_failure_threshold(self.failure_threshold)
                .with_open_duration(self.open_duration)
                .with_half_open_max_calls(self.half_open_max_calls),
        ))
    }

    fn load<F: Fn(&str) -> Option<String>>(vars: &Vars<F>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            enabled: vars.flag("CENSUS_BREAKER_ENABLED", defaults.enabled)?,
            failure_threshold: vars.positive("CENSUS_BREAKER_FAILURE_THRESHOLD", defaults.failure_threshold)?,
            open_duration: vars.millis("CENSUS_BREAKER_OPEN_MS", defaults.open_duration)?,
            half_open_max_calls: vars.positive("CENSUS_BREAKER_HALF_OPEN_CALLS", defaults.half_open_max_calls)?,
        })
    }
}

fn load_topics<F: Fn(&str) -> Option<String>>(vars: &Vars<F>) -> Result<TopicMap, ConfigError> {
    let mut topics = match vars.get("CENSUS_TOPIC_PREFIX") {
        Some(prefix) => TopicMap::with_prefix(&prefix),
        None => TopicMap::default(),
    };
    for &event_type in EventType::ALL {
        if let Some(topic) = vars.non_empty(&format!("CENSUS_TOPIC_{}", event_type.as_str()))? {
            topics = topics.with_topic(event_type, topic);
        }
    }
    Ok(topics)
}

/// Everything needed to wire a publisher with backup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublisherSettings {
    pub retry: RetrySettings,
    pub backup_store: BackupStoreSettings,
    pub circuit_breaker: CircuitBreakerSettings,
    pub topics: TopicMap,
}

impl PublisherSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };
        let backup_store = match vars.non_empty("CENSUS_BACKUP_SCHEMA")? {
            Some(schema) => BackupStoreSettings::default().with_schema(schema),
            None => BackupStoreSettings::default(),
        };
        Ok(Self {
            retry: RetrySettings::load(&vars)?,
            backup_store,
            circuit_breaker: CircuitBreakerSettings::load(&vars)?,
            topics: load_topics(&vars)?,
        })
    }

    pub fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: CircuitBreakerSettings) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    pub fn with_topics(mut self, topics: TopicMap) -> Self {
        self.topics = topics;
        self
    }

    /// Backup adapter over `store`, with the configured schema and write retry.
    pub fn backup_persistence<S: CloudDataStore>(&self, store: S) -> DataStoreEventPersistence<S> {
        DataStoreEventPersistence::with_schema(
            RetryableCloudDataStore::new(store, self.retry.retry_command()),
            self.backup_store.schema.clone(),
        )
    }

    /// A publisher that backs failed sends up to `backups`.
    pub fn build_publisher<S>(
        &self,
        sender: impl EventSender + 'static,
        backups: Arc<DataStoreEventPersistence<S>>,
    ) -> EventPublisher
    where
        S: CloudDataStore + 'static,
    {
        EventPublisher::with_event_persistence(sender, backups, self.circuit_breaker.breaker("event-sender"))
            .with_topics(self.topics.clone())
    }

    /// A replayer over `backups` that routes with the configured topics.
    pub fn build_replayer<S>(
        &self,
        sender: impl EventSender + 'static,
        backups: Arc<DataStoreEventPersistence<S>>,
    ) -> BackupReplayer<S>
    where
        S: CloudDataStore,
    {
        BackupReplayer::new(sender, backups).with_topics(self.topics.clone())
    }
}
