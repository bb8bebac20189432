//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use batchline_core::config::CompensationConfig;
use batchline_core::messaging::InMemoryNotificationBus;
use batchline_core::store::InMemoryBatchStore;
use batchline_core::{Batch, BatchStatus, BatchTransitionService, NewBatch, Principal, Role};
use chrono::Utc;

pub const TENANT: &str = "1234";
pub const BATCH_ID: &str = "test-batch";
pub const OWNER: &str = "integrator-1";
pub const INGEST_TOPIC: &str = "ingest.1234.claims.in";
pub const NOTIFICATION_TOPIC: &str = "ingest.1234.claims.notification";

pub struct Harness {
    pub service: BatchTransitionService,
    pub store: Arc<InMemoryBatchStore>,
    pub bus: Arc<InMemoryNotificationBus>,
}

impl Harness {
    /// One started batch owned by [`OWNER`]
    pub fn new() -> Self {
        Self::with_batches([batch_in(BatchStatus::Started)])
    }

    pub fn empty() -> Self {
        Self::with_batches(Vec::<Batch>::new())
    }

    pub fn with_batches(batches: impl IntoIterator<Item = Batch>) -> Self {
        let store = Arc::new(InMemoryBatchStore::with_batches(batches));
        let bus = Arc::new(InMemoryNotificationBus::new());
        let service = BatchTransitionService::new(
            store.clone(),
            bus.clone(),
            CompensationConfig::without_delay(6),
        );
        Self {
            service,
            store,
            bus,
        }
    }

    pub fn stored(&self) -> Batch {
        self.store
            .snapshot(TENANT, BATCH_ID)
            .expect("test batch should be stored")
    }
}

pub fn new_batch() -> NewBatch {
    NewBatch {
        id: Some(BATCH_ID.to_string()),
        tenant_id: TENANT.to_string(),
        name: "claims-2024-06".to_string(),
        data_type: "claims".to_string(),
        topic: INGEST_TOPIC.to_string(),
        ..Default::default()
    }
}

pub fn batch_in(status: BatchStatus) -> Batch {
    let mut batch = new_batch().into_batch(OWNER, Utc::now());
    batch.status = status;
    batch
}

pub fn integrator(subject: &str) -> Principal {
    Principal::new(subject)
        .with_role(Role::DataIntegrator)
        .with_tenant(TENANT)
}

pub fn owner() -> Principal {
    integrator(OWNER)
}

pub fn internal() -> Principal {
    Principal::new("pipeline")
        .with_role(Role::Internal)
        .with_tenant(TENANT)
}

pub fn consumer() -> Principal {
    Principal::new("reader")
        .with_role(Role::Consumer)
        .with_tenant(TENANT)
}
