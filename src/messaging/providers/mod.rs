//! Notification bus providers.

pub mod in_memory;
pub mod pgmq;

pub use in_memory::InMemoryNotificationBus;
pub use self::pgmq::PgmqNotificationBus;
