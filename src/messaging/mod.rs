//! # Messaging Module
//!
//! Status notifications for batches. A [`NotificationBus`] publishes one
//! [`NotificationMessage`] per applied transition; providers live under
//! [`providers`]:
//!
//! - **pgmq**: PostgreSQL message queue, one queue per notification topic
//! - **in-memory**: records messages for tests, with failure injection
//!
//! A publish is a single attempt. Retrying is the caller's decision.

pub mod errors;
pub mod message;
pub mod providers;
pub mod topics;

use async_trait::async_trait;

pub use errors::{MessagingError, MessagingResult};
pub use message::NotificationMessage;
pub use providers::{InMemoryNotificationBus, PgmqNotificationBus};
pub use topics::notification_topic;

/// Publisher of batch status notifications
#[async_trait]
pub trait NotificationBus: Send + Sync + 'static {
    /// Publish one message to `message.topic` keyed by `message.key`.
    async fn publish(&self, message: &NotificationMessage) -> MessagingResult<()>;

    /// Provider name for logging
    fn provider_name(&self) -> &'static str;
}
