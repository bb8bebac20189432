//! # Bootstrap
//!
//! Builds a [`BatchTransitionService`] from [`BatchlineConfig`]: picks the
//! record store backend and notification provider, and shares one Postgres
//! pool between the `postgres` store and the `pgmq` bus when both are used.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;
use tracing::info;

use super::transition_driver::BatchTransitionService;
use crate::config::{
    BatchlineConfig, ConfigurationError, DatabaseConfig, NotificationProvider, StoreBackend,
};
use crate::messaging::{InMemoryNotificationBus, NotificationBus, PgmqNotificationBus};
use crate::store::{
    BatchStore, InMemoryBatchStore, PgBatchStore, SearchIndexBatchStore, StoreError,
};

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Failed to initialize record store: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to connect to database: {0}")]
    Database(#[from] sqlx::Error),
}

/// Validate the configuration and wire the service
pub async fn bootstrap(config: &BatchlineConfig) -> Result<BatchTransitionService, BootstrapError> {
    config.validate()?;

    let needs_pool = config.store.backend == StoreBackend::Postgres
        || config.notifications.provider == NotificationProvider::Pgmq;
    let pool = if needs_pool {
        Some(connect(&config.database).await?)
    } else {
        None
    };

    let store = select_store(config, pool.as_ref())?;
    let bus = select_bus(config, pool).await?;

    info!(
        store = store.provider_name(),
        bus = bus.provider_name(),
        compensation_max_attempts = config.compensation.max_attempts,
        "Batch transition service ready"
    );

    Ok(BatchTransitionService::new(
        store,
        bus,
        config.compensation.clone(),
    ))
}

/// The store for the configured backend. A Postgres backend without a pool
/// is a configuration error, never a silent switch to another backend.
fn select_store(
    config: &BatchlineConfig,
    pool: Option<&PgPool>,
) -> Result<Arc<dyn BatchStore>, BootstrapError> {
    Ok(match (config.store.backend, pool) {
        (StoreBackend::Postgres, Some(pool)) => Arc::new(PgBatchStore::new(pool.clone())),
        (StoreBackend::Postgres, None) => {
            return Err(ConfigurationError::missing_required_field(
                "database.url",
                "postgres record store",
            )
            .into())
        }
        (StoreBackend::SearchIndex, _) => Arc::new(SearchIndexBatchStore::new(&config.search_index)?),
        (StoreBackend::InMemory, _) => Arc::new(InMemoryBatchStore::new()),
    })
}

async fn select_bus(
    config: &BatchlineConfig,
    pool: Option<PgPool>,
) -> Result<Arc<dyn NotificationBus>, BootstrapError> {
    Ok(match (config.notifications.provider, pool) {
        (NotificationProvider::Pgmq, Some(pool)) => {
            Arc::new(PgmqNotificationBus::new_with_pool(pool).await)
        }
        (NotificationProvider::Pgmq, None) => {
            return Err(ConfigurationError::missing_required_field(
                "database.url",
                "pgmq notification provider",
            )
            .into())
        }
        (NotificationProvider::InMemory, _) => Arc::new(InMemoryNotificationBus::new()),
    })
}

async fn connect(database: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(database.max_connections)
        .acquire_timeout(Duration::from_secs(database.acquire_timeout_seconds))
        .connect(&database.url)
        .await
}
