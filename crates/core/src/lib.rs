//! `census-core`: shared building blocks for the census event crates.
//!
//! This crate holds **pure** primitives only: identifiers, routing enums and the
//! domain error model. No IO, no serialisation policy beyond serde derives.

pub mod error;
pub mod id;
pub mod routing;

pub use error::{DomainError, DomainResult};
pub use id::{CorrelationId, MessageId};
pub use routing::{Channel, Source};
