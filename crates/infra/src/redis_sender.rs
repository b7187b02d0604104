//! Redis pub/sub transport (feature `redis`).
//!
//! Each topic is a Redis channel; the envelope is published as JSON text.
//! Pub/sub is not durable: with no subscriber listening, `PUBLISH` succeeds
//! and the message is dropped. Only connection or command failures count as a
//! failed send (and so trigger backup).

use redis::Commands;
use thiserror::Error;
use tracing::debug;

use census_events::{EventEnvelope, EventSender};

#[derive(Debug, Error)]
pub enum RedisSenderError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("failed to serialise envelope: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct RedisPubSubSender {
    client: redis::Client,
    channel_prefix: String,
}

impl RedisPubSubSender {
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, RedisSenderError> {
        Ok(Self {
            client: redis::Client::open(redis_url.as_ref())?,
            channel_prefix: String::new(),
        })
    }

    /// Publish on `<prefix><topic>` instead of `<topic>`.
    pub fn with_channel_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.channel_prefix = prefix.into();
        self
    }

    fn channel_for(&self, topic: &str) -> String {
        format!("{}{topic}", self.channel_prefix)
    }

    fn publish(&self, topic: &str, envelope: &EventEnvelope) -> Result<i64, RedisSenderError> {
        let payload = envelope.to_json()?;
        let mut conn = self.client.get_connection()?;
        let receivers: i64 = conn.publish(self.channel_for(topic), payload)?;
        Ok(receivers)
    }
}

impl EventSender for RedisPubSubSender {
    fn send_event(&self, topic: &str, envelope: &EventEnvelope) -> anyhow::Result<()> {
        let receivers = self.publish(topic, envelope)?;
        debug!(topic, receivers, message_id = %envelope.message_id(), "published to redis");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_is_topic_with_optional_prefix() {
        let sender = RedisPubSubSender::new("redis://127.0.0.1:6379").unwrap();
        assert_eq!(sender.channel_for("event_refusal"), "event_refusal");

        let sender = sender.with_channel_prefix("census:");
        assert_eq!(sender.channel_for("event_refusal"), "census:event_refusal");
    }

    #[test]
    fn rejects_malformed_url() {
        assert!(matches!(
            RedisPubSubSender::new("not a url"),
            Err(RedisSenderError::Redis(_))
        ));
    }
}
