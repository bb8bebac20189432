//! # Notification Messages
//!
//! The envelope published when a batch changes status. `value` is the full
//! batch record with `batchId` injected next to `id`, so consumers keyed on
//! either name can read it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{MessagingError, MessagingResult};
use super::topics::notification_topic;
use crate::models::Batch;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    /// Partition key, always the batch id
    pub key: String,
    pub topic: String,
    pub value: Value,
}

impl NotificationMessage {
    /// Build the status notification for a batch, addressed to the topic
    /// derived from its ingest topic.
    pub fn for_batch(batch: &Batch) -> MessagingResult<Self> {
        let mut value = serde_json::to_value(batch)?;
        match value.as_object_mut() {
            Some(fields) => {
                fields.insert("batchId".to_string(), Value::String(batch.id.clone()));
            }
            None => {
                return Err(MessagingError::serialization(
                    "batch did not serialize to an object",
                ))
            }
        }

        Ok(Self {
            key: batch.id.clone(),
            topic: notification_topic(&batch.topic),
            value,
        })
    }
}
