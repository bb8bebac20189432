//! # In-Memory Batch Store
//!
//! Thread-safe store for tests and local development. Each batch lives in a
//! `DashMap` entry; the entry's write guard is held across predicate check
//! and mutation, which gives the same compare-and-swap behaviour as the
//! real backends.
//!
//! Failure injection (`fail_next_status_writes`, `fail_next_updates`) lets
//! tests exercise store errors and compensation retries.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{BatchStore, ConditionalUpdate, StatusWrite, StoreError, StoreResult, UpdateOutcome};
use crate::models::Batch;
use crate::state_machine::states::BatchStatus;

type BatchKey = (String, String);

#[derive(Debug, Default)]
pub struct InMemoryBatchStore {
    batches: DashMap<BatchKey, Batch>,
    failing_updates: AtomicU32,
    failing_status_writes: AtomicU32,
    failing_deletes: AtomicU32,
    status_write_attempts: AtomicU32,
    delete_attempts: AtomicU32,
}

impl InMemoryBatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with pre-loaded batches
    pub fn with_batches(batches: impl IntoIterator<Item = Batch>) -> Self {
        let store = Self::new();
        for batch in batches {
            store.put(batch);
        }
        store
    }

    /// Insert or overwrite a batch directly (for test setup)
    pub fn put(&self, batch: Batch) {
        self.batches
            .insert((batch.tenant_id.clone(), batch.id.clone()), batch);
    }

    /// Snapshot of a stored batch (for assertions)
    pub fn snapshot(&self, tenant_id: &str, batch_id: &str) -> Option<Batch> {
        self.batches
            .get(&key(tenant_id, batch_id))
            .map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// The next `count` conditional updates fail with a transport error
    pub fn fail_next_updates(&self, count: u32) {
        self.failing_updates.store(count, Ordering::SeqCst);
    }

    /// The next `count` status writes (compensation) fail with a transport error
    pub fn fail_next_status_writes(&self, count: u32) {
        self.failing_status_writes.store(count, Ordering::SeqCst);
    }

    /// The next `count` deletes fail with a transport error
    pub fn fail_next_deletes(&self, count: u32) {
        self.failing_deletes.store(count, Ordering::SeqCst);
    }

    pub fn status_write_attempts(&self) -> u32 {
        self.status_write_attempts.load(Ordering::SeqCst)
    }

    pub fn delete_attempts(&self) -> u32 {
        self.delete_attempts.load(Ordering::SeqCst)
    }
}

fn key(tenant_id: &str, batch_id: &str) -> BatchKey {
    (tenant_id.to_string(), batch_id.to_string())
}

/// Decrement an injected-failure counter, returning true if this call fails
fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl BatchStore for InMemoryBatchStore {
    async fn apply_conditional(&self, update: &ConditionalUpdate) -> StoreResult<UpdateOutcome> {
        if take_failure(&self.failing_updates) {
            return Err(StoreError::transport("update", "injected failure"));
        }

        let mut entry = self
            .batches
            .get_mut(&key(&update.tenant_id, &update.batch_id))
            .ok_or_else(|| StoreError::not_found(&update.tenant_id, &update.batch_id))?;

        if !update.matches(entry.value()) {
            return Ok(UpdateOutcome::NoOp(entry.value().clone()));
        }

        let previous_status = entry.value().status;
        update.changes.apply_to(entry.value_mut());
        Ok(UpdateOutcome::Applied {
            previous_status,
            batch: entry.value().clone(),
        })
    }

    async fn revert_status(
        &self,
        tenant_id: &str,
        batch_id: &str,
        from: BatchStatus,
        to: BatchStatus,
    ) -> StoreResult<StatusWrite> {
        self.status_write_attempts.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.failing_status_writes) {
            return Err(StoreError::transport("revert_status", "injected failure"));
        }

        let Some(mut entry) = self.batches.get_mut(&key(tenant_id, batch_id)) else {
            return Ok(StatusWrite::Missing);
        };
        let current = entry.value().status;
        if current != from {
            return Ok(StatusWrite::Superseded(current));
        }
        entry.value_mut().status = to;
        Ok(StatusWrite::Written)
    }

    async fn get_batch(&self, tenant_id: &str, batch_id: &str) -> StoreResult<Option<Batch>> {
        Ok(self.snapshot(tenant_id, batch_id))
    }

    async fn insert_batch(&self, batch: &Batch) -> StoreResult<()> {
        match self.batches.entry(key(&batch.tenant_id, &batch.id)) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists {
                tenant_id: batch.tenant_id.clone(),
                batch_id: batch.id.clone(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(batch.clone());
                Ok(())
            }
        }
    }

    async fn delete_batch(&self, tenant_id: &str, batch_id: &str) -> StoreResult<bool> {
        self.delete_attempts.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.failing_deletes) {
            return Err(StoreError::transport("delete", "injected failure"));
        }
        Ok(self.batches.remove(&key(tenant_id, batch_id)).is_some())
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}
