//! Typed domain events and their reliable publication.
//!
//! - [`EventType`] / [`Payload`]: the closed set of event kinds and the payload bound to each.
//! - [`EventBuilder`] / [`BuilderRegistry`]: payload + routing ⇄ [`EventEnvelope`].
//! - [`TopicMap`]: event kind → destination topic.
//! - [`EventPublisher`]: validate, build, send; divert failures to [`EventPersistence`].

pub mod builder;
pub mod circuit_breaker;
pub mod envelope;
pub mod error;
pub mod event_type;
pub mod in_memory;
pub mod payload;
pub mod persistence;
pub mod publisher;
pub mod sender;
pub mod topic;

pub use builder::{BuilderRegistry, EventBuilder, NullEventBuilder, SendInfo, TypedEventBuilder};
pub use circuit_breaker::{
    BreakerState, CallError, CircuitBreaker, CircuitBreakerConfig, ThresholdCircuitBreaker,
};
pub use envelope::{Envelope, EventEnvelope, Header, PayloadSection};
pub use error::{BuildError, PublishError};
pub use event_type::EventType;
pub use in_memory::{InMemoryEventPersistence, InMemoryEventSender, InMemoryFailure};
pub use payload::{Payload, PayloadKind};
pub use persistence::{EventBackupData, EventPersistence};
pub use publisher::{Breaker, EventPublisher};
pub use sender::EventSender;
pub use topic::{EventTopic, TopicMap};
