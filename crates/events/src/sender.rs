//! Outbound transport contract.

use std::sync::Arc;

use crate::envelope::EventEnvelope;

/// Transmits a fully built envelope to the messaging transport.
///
/// The call is synchronous: `Ok(())` means the transport accepted the message.
/// Failures are opaque to the publisher; it only decides whether to fall back
/// to backup storage. Implementations must be safe to call from many threads.
pub trait EventSender: Send + Sync {
    fn send_event(&self, topic: &str, envelope: &EventEnvelope) -> anyhow::Result<()>;
}

impl<S> EventSender for Arc<S>
where
    S: EventSender + ?Sized,
{
    fn send_event(&self, topic: &str, envelope: &EventEnvelope) -> anyhow::Result<()> {
        (**self).send_event(topic, envelope)
    }
}
