//! Infrastructure for event publication: backup store, write retry, replay,
//! configuration and transports.

pub mod config;
pub mod data_store;
pub mod event_persistence;
pub mod replay;
pub mod retry;

#[cfg(feature = "redis")]
pub mod redis_sender;


pub use config::{BackupStoreSettings, CircuitBreakerSettings, ConfigError, PublisherSettings, RetrySettings};
pub use data_store::{
    CloudDataStore, DataStoreError, InMemoryDataStore, RetryableCloudDataStore, StatusCode,
};
pub use event_persistence::{BackupScan, DEFAULT_BACKUP_SCHEMA, DataStoreEventPersistence, UndecodableBackup};
#[cfg(feature = "redis")]
pub use redis_sender::{RedisPubSubSender, RedisSenderError};
pub use replay::{BackupReplayer, ReplaySummary};
pub use retry::{BackoffStrategy, RetryCommand, RetryError, RetryPolicy};
