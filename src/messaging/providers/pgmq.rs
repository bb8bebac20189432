//! # pgmq Notification Bus
//!
//! Publishes notifications through pgmq-rs. Each notification topic maps to
//! one queue, created on first use. pgmq queue names are SQL identifiers, so
//! dots become underscores. Only lowercase ASCII letters, digits and dots
//! are accepted in a topic: anything else (uppercase, `_`, `-`) would let
//! two distinct topics share one queue, and such topics are rejected.

use async_trait::async_trait;
use dashmap::DashSet;
use ::pgmq::PGMQueue;
use tracing::{debug, info};

use crate::messaging::errors::{MessagingError, MessagingResult};
use crate::messaging::message::NotificationMessage;
use crate::messaging::NotificationBus;

/// pgmq rejects queue names of 48 characters or more
const MAX_QUEUE_NAME_LEN: usize = 47;

/// Queue name for a notification topic. Distinct accepted topics always get
/// distinct queue names.
pub fn queue_name_for_topic(topic: &str) -> MessagingResult<String> {
    if let Some(invalid) = topic
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '.'))
    {
        return Err(MessagingError::configuration(
            "pgmq",
            format!("topic '{topic}' contains '{invalid}'; only [a-z0-9.] map to a queue name"),
        ));
    }

    let name = topic.replace('.', "_");
    if name.is_empty() || name.len() > MAX_QUEUE_NAME_LEN {
        return Err(MessagingError::configuration(
            "pgmq",
            format!(
                "topic '{topic}' does not map to a valid queue name (1..={MAX_QUEUE_NAME_LEN} chars)"
            ),
        ));
    }
    Ok(name)
}

#[derive(Debug, Clone)]
pub struct PgmqNotificationBus {
    pgmq: PGMQueue,
    ensured_queues: std::sync::Arc<DashSet<String>>,
}

impl PgmqNotificationBus {
    pub async fn new(database_url: &str) -> MessagingResult<Self> {
        let pgmq = PGMQueue::new(database_url.to_string())
            .await
            .map_err(|e| MessagingError::configuration("pgmq", e.to_string()))?;
        info!("Connected notification bus to pgmq");
        Ok(Self::from_queue(pgmq))
    }

    /// Create using an existing connection pool (BYOP)
    pub async fn new_with_pool(pool: sqlx::PgPool) -> Self {
        let pgmq = PGMQueue::new_with_pool(pool).await;
        info!("Created pgmq notification bus with shared pool");
        Self::from_queue(pgmq)
    }

    fn from_queue(pgmq: PGMQueue) -> Self {
        Self {
            pgmq,
            ensured_queues: std::sync::Arc::new(DashSet::new()),
        }
    }

    async fn ensure_queue(&self, queue_name: &str) -> MessagingResult<()> {
        if self.ensured_queues.contains(queue_name) {
            return Ok(());
        }
        self.pgmq
            .create(queue_name)
            .await
            .map_err(|e| MessagingError::pgmq(queue_name, "create", e.to_string()))?;
        self.ensured_queues.insert(queue_name.to_string());
        debug!(queue_name, "Notification queue ready");
        Ok(())
    }
}

#[async_trait]
impl NotificationBus for PgmqNotificationBus {
    async fn publish(&self, message: &NotificationMessage) -> MessagingResult<()> {
        let queue_name = queue_name_for_topic(&message.topic)?;
        self.ensure_queue(&queue_name).await?;

        let message_id = self
            .pgmq
            .send(&queue_name, message)
            .await
            .map_err(|e| MessagingError::publish(&message.topic, e.to_string()))?;

        debug!(
            topic = %message.topic,
            key = %message.key,
            queue_name = %queue_name,
            message_id,
            "Published batch notification"
        );
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "pgmq"
    }
}
