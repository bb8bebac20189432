//! In-memory notification bus for tests and local runs.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::messaging::errors::{MessagingError, MessagingResult};
use crate::messaging::message::NotificationMessage;
use crate::messaging::NotificationBus;

#[derive(Debug, Default)]
pub struct InMemoryNotificationBus {
    published: Mutex<Vec<NotificationMessage>>,
    failing_publishes: AtomicU32,
    always_fail: AtomicBool,
    attempts: AtomicU32,
}

impl InMemoryNotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` publishes fail
    pub fn fail_next_publishes(&self, count: u32) {
        self.failing_publishes.store(count, Ordering::SeqCst);
    }

    /// Every publish fails until switched off
    pub fn set_unavailable(&self, unavailable: bool) {
        self.always_fail.store(unavailable, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<NotificationMessage> {
        self.published.lock().clone()
    }

    pub fn published_to(&self, topic: &str) -> Vec<NotificationMessage> {
        self.published
            .lock()
            .iter()
            .filter(|message| message.topic == topic)
            .cloned()
            .collect()
    }

    /// Publish attempts, failed ones included
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn should_fail(&self) -> bool {
        self.always_fail.load(Ordering::SeqCst)
            || self
                .failing_publishes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
    }
}

#[async_trait]
impl NotificationBus for InMemoryNotificationBus {
    async fn publish(&self, message: &NotificationMessage) -> MessagingResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.should_fail() {
            return Err(MessagingError::publish(&message.topic, "bus unavailable"));
        }
        self.published.lock().push(message.clone());
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}
