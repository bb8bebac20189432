//! # Batch Record Store
//!
//! Provider-agnostic access to stored batches. The transition protocol only
//! relies on one guarantee: `apply_conditional` is a compare-and-swap. Of two
//! concurrent updates whose predicates match the same stored status, exactly
//! one reports `Applied` and the other `NoOp`, and a no-op never changes any
//! field.
//!
//! ## Providers
//!
//! - **Postgres** ([`postgres::PgBatchStore`]): filter-conditional. The
//!   predicate lives in the `WHERE` clause of a single `UPDATE … RETURNING`;
//!   zero affected rows is the no-op signal and the current row is read back.
//! - **Search index** ([`search_index::SearchIndexBatchStore`]): script-conditional.
//!   A painless `_update` script checks the predicate server-side and sets
//!   `ctx.op = 'none'` when it does not hold.
//! - **In-memory** ([`in_memory::InMemoryBatchStore`]): for tests and local runs.

pub mod in_memory;
pub mod postgres;
pub mod search_index;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Batch, BatchChanges};
use crate::state_machine::states::BatchStatus;

pub use in_memory::InMemoryBatchStore;
pub use postgres::PgBatchStore;
pub use search_index::SearchIndexBatchStore;

/// Store-level errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Batch {batch_id} not found for tenant {tenant_id}")]
    NotFound { tenant_id: String, batch_id: String },

    #[error("Batch {batch_id} already exists for tenant {tenant_id}")]
    AlreadyExists { tenant_id: String, batch_id: String },

    #[error("Store transport error: {operation}: {message}")]
    Transport { operation: String, message: String },

    #[error("Store protocol error: {message}")]
    Protocol { message: String },

    /// Neither an applied nor a no-op marker came back
    #[error("{raw}")]
    UnexpectedResult { raw: String },

    #[error("Store serialization error: {message}")]
    Serialization { message: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn not_found(tenant_id: impl Into<String>, batch_id: impl Into<String>) -> Self {
        Self::NotFound {
            tenant_id: tenant_id.into(),
            batch_id: batch_id.into(),
        }
    }

    pub fn transport(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        Self::serialization(error.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A conditional mutation: apply `changes` only when the stored status is in
/// `required_statuses` and, if set, the stored owner equals `owner`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalUpdate {
    pub tenant_id: String,
    pub batch_id: String,
    pub required_statuses: Vec<BatchStatus>,
    pub owner: Option<String>,
    pub changes: BatchChanges,
}

impl ConditionalUpdate {
    /// Evaluate the predicate against a record
    pub fn matches(&self, batch: &Batch) -> bool {
        self.required_statuses.contains(&batch.status)
            && self
                .owner
                .as_deref()
                .map_or(true, |owner| batch.integrator_id == owner)
    }

    pub fn required_status_tokens(&self) -> Vec<String> {
        self.required_statuses
            .iter()
            .map(|status| status.as_str().to_string())
            .collect()
    }
}

/// Result of a conditional mutation
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// Predicate held; carries the status it replaced and the record
    /// after the update
    Applied {
        previous_status: BatchStatus,
        batch: Batch,
    },
    /// Predicate did not hold; carries the unchanged current record
    NoOp(Batch),
}

impl UpdateOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    pub fn batch(&self) -> &Batch {
        match self {
            Self::Applied { batch, .. } | Self::NoOp(batch) => batch,
        }
    }
}

/// Result of a compensating status write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusWrite {
    Written,
    /// The stored status no longer matched; carries the status found
    Superseded(BatchStatus),
    /// No record to write
    Missing,
}

/// Batch record store contract
#[async_trait]
pub trait BatchStore: Send + Sync + 'static {
    /// Atomically apply a conditional update.
    ///
    /// Returns `StoreError::NotFound` when the batch does not exist.
    async fn apply_conditional(&self, update: &ConditionalUpdate) -> StoreResult<UpdateOutcome>;

    /// Set the status back to `to` only while it is still `from`, used by
    /// compensation. A record that has moved on is left untouched and
    /// reported as `Superseded`.
    async fn revert_status(
        &self,
        tenant_id: &str,
        batch_id: &str,
        from: BatchStatus,
        to: BatchStatus,
    ) -> StoreResult<StatusWrite>;

    async fn get_batch(&self, tenant_id: &str, batch_id: &str) -> StoreResult<Option<Batch>>;

    /// Insert a new batch; `AlreadyExists` if the id is taken.
    async fn insert_batch(&self, batch: &Batch) -> StoreResult<()>;

    /// Remove a batch, used to compensate a failed creation.
    ///
    /// Returns `false` when nothing was removed.
    async fn delete_batch(&self, tenant_id: &str, batch_id: &str) -> StoreResult<bool>;

    /// Provider name for logging
    fn provider_name(&self) -> &'static str;
}
