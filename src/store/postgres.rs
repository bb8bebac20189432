//! # Postgres Batch Store
//!
//! Filter-conditional realization of [`BatchStore`]. The status and owner
//! predicate is part of the `UPDATE` filter, so the row lock taken by
//! Postgres makes the check-and-set atomic: a concurrent updater blocks,
//! re-evaluates the filter against the committed row and matches nothing.
//! Zero returned rows is the no-op signal.
//!
//! ## Database Schema
//!
//! Maps to the `batches` table created by `migrations/`:
//! ```sql
//! CREATE TABLE batches (
//!   tenant_id TEXT NOT NULL,
//!   batch_id TEXT NOT NULL,
//!   status TEXT NOT NULL,
//!   integrator_id TEXT NOT NULL,
//!   -- ... counts, dates, metadata JSONB
//!   PRIMARY KEY (tenant_id, batch_id)
//! );
//! ```
//!
//! Optional change fields are bound as nullable parameters and folded in
//! with `COALESCE`, so one statement covers every transition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::{FromRow, PgPool};
use tracing::instrument;

use super::{BatchStore, ConditionalUpdate, StatusWrite, StoreError, StoreResult, UpdateOutcome};
use crate::models::Batch;
use crate::state_machine::states::BatchStatus;

/// Embedded schema migrations
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

macro_rules! batch_columns {
    () => {
        "tenant_id, batch_id, name, data_type, topic, integrator_id, status, \
         start_date, end_date, invalid_threshold, record_count, expected_record_count, \
         actual_record_count, invalid_record_count, failure_message, metadata"
    };
}

// `prior` locks the row and captures the status being replaced. A waiting
// updater re-reads the committed row, so its status filter no longer matches.
const CONDITIONAL_UPDATE_SQL: &str = concat!(
    "UPDATE batches SET \
       status = $3, \
       end_date = COALESCE($4, end_date), \
       expected_record_count = COALESCE($5, expected_record_count), \
       record_count = COALESCE($5, record_count), \
       actual_record_count = COALESCE($6, actual_record_count), \
       invalid_record_count = COALESCE($7, invalid_record_count), \
       failure_message = COALESCE($8, failure_message), \
       metadata = COALESCE($9, metadata), \
       updated_at = NOW() \
     FROM ( \
       SELECT status AS previous_status FROM batches \
       WHERE tenant_id = $1 AND batch_id = $2 FOR UPDATE \
     ) AS prior \
     WHERE tenant_id = $1 AND batch_id = $2 \
       AND status = ANY($10) \
       AND ($11::text IS NULL OR integrator_id = $11) \
     RETURNING prior.previous_status, ",
    batch_columns!()
);

const SELECT_BATCH_SQL: &str = concat!(
    "SELECT ",
    batch_columns!(),
    " FROM batches WHERE tenant_id = $1 AND batch_id = $2"
);

const INSERT_BATCH_SQL: &str = concat!(
    "INSERT INTO batches (",
    batch_columns!(),
    ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)"
);

const REVERT_STATUS_SQL: &str = "UPDATE batches SET status = $4, updated_at = NOW() \
     WHERE tenant_id = $1 AND batch_id = $2 AND status = $3";

const DELETE_BATCH_SQL: &str = "DELETE FROM batches WHERE tenant_id = $1 AND batch_id = $2";

/// Row shape of the `batches` table
#[derive(Debug, Clone, FromRow)]
struct BatchRow {
    tenant_id: String,
    batch_id: String,
    name: String,
    data_type: String,
    topic: String,
    integrator_id: String,
    status: String,
    start_date: DateTime<Utc>,
    end_date: Option<DateTime<Utc>>,
    invalid_threshold: i64,
    record_count: Option<i64>,
    expected_record_count: Option<i64>,
    actual_record_count: Option<i64>,
    invalid_record_count: Option<i64>,
    failure_message: Option<String>,
    metadata: Option<serde_json::Value>,
}

/// Row returned by the conditional update
#[derive(Debug, Clone, FromRow)]
struct AppliedRow {
    previous_status: String,
    #[sqlx(flatten)]
    batch: BatchRow,
}

impl From<BatchRow> for Batch {
    fn from(row: BatchRow) -> Self {
        Batch {
            id: row.batch_id,
            tenant_id: row.tenant_id,
            name: row.name,
            data_type: row.data_type,
            topic: row.topic,
            integrator_id: row.integrator_id,
            status: BatchStatus::from_stored(&row.status),
            start_date: row.start_date,
            end_date: row.end_date,
            invalid_threshold: row.invalid_threshold,
            record_count: row.record_count,
            expected_record_count: row.expected_record_count,
            actual_record_count: row.actual_record_count,
            invalid_record_count: row.invalid_record_count,
            failure_message: row.failure_message,
            metadata: row.metadata,
        }
    }
}

/// sqlx-backed batch store
#[derive(Debug, Clone)]
pub struct PgBatchStore {
    pool: PgPool,
}

impl PgBatchStore {
    /// Create a store on an existing pool (BYOP)
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply embedded migrations
    pub async fn migrate(&self) -> StoreResult<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::transport("migrate", e.to_string()))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch(&self, tenant_id: &str, batch_id: &str) -> StoreResult<Option<Batch>> {
        let row = sqlx::query_as::<_, BatchRow>(SELECT_BATCH_SQL)
            .bind(tenant_id)
            .bind(batch_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Batch::from))
    }
}

#[async_trait]
impl BatchStore for PgBatchStore {
    #[instrument(skip(self, update), fields(tenant_id = %update.tenant_id, batch_id = %update.batch_id))]
    async fn apply_conditional(&self, update: &ConditionalUpdate) -> StoreResult<UpdateOutcome> {
        let changes = &update.changes;
        let updated = sqlx::query_as::<_, AppliedRow>(CONDITIONAL_UPDATE_SQL)
            .bind(&update.tenant_id)
            .bind(&update.batch_id)
            .bind(changes.status.as_str())
            .bind(changes.end_date)
            .bind(changes.expected_record_count)
            .bind(changes.actual_record_count)
            .bind(changes.invalid_record_count)
            .bind(changes.failure_message.as_deref())
            .bind(changes.metadata.clone())
            .bind(update.required_status_tokens())
            .bind(update.owner.as_deref())
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = updated {
            return Ok(UpdateOutcome::Applied {
                previous_status: BatchStatus::from_stored(&row.previous_status),
                batch: row.batch.into(),
            });
        }

        // Nothing matched: read the current row to classify the no-op
        match self.fetch(&update.tenant_id, &update.batch_id).await? {
            Some(current) => Ok(UpdateOutcome::NoOp(current)),
            None => Err(StoreError::not_found(&update.tenant_id, &update.batch_id)),
        }
    }

    #[instrument(skip(self))]
    async fn revert_status(
        &self,
        tenant_id: &str,
        batch_id: &str,
        from: BatchStatus,
        to: BatchStatus,
    ) -> StoreResult<StatusWrite> {
        let result = sqlx::query(REVERT_STATUS_SQL)
            .bind(tenant_id)
            .bind(batch_id)
            .bind(from.as_str())
            .bind(to.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() > 0 {
            return Ok(StatusWrite::Written);
        }

        Ok(match self.fetch(tenant_id, batch_id).await? {
            Some(current) => StatusWrite::Superseded(current.status),
            None => StatusWrite::Missing,
        })
    }

    async fn get_batch(&self, tenant_id: &str, batch_id: &str) -> StoreResult<Option<Batch>> {
        self.fetch(tenant_id, batch_id).await
    }

    async fn insert_batch(&self, batch: &Batch) -> StoreResult<()> {
        let result = sqlx::query(INSERT_BATCH_SQL)
            .bind(&batch.tenant_id)
            .bind(&batch.id)
            .bind(&batch.name)
            .bind(&batch.data_type)
            .bind(&batch.topic)
            .bind(&batch.integrator_id)
            .bind(batch.status.as_str())
            .bind(batch.start_date)
            .bind(batch.end_date)
            .bind(batch.invalid_threshold)
            .bind(batch.record_count)
            .bind(batch.expected_record_count)
            .bind(batch.actual_record_count)
            .bind(batch.invalid_record_count)
            .bind(batch.failure_message.as_deref())
            .bind(batch.metadata.clone())
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::AlreadyExists {
                    tenant_id: batch.tenant_id.clone(),
                    batch_id: batch.id.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_batch(&self, tenant_id: &str, batch_id: &str) -> StoreResult<bool> {
        let result = sqlx::query(DELETE_BATCH_SQL)
            .bind(tenant_id)
            .bind(batch_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    fn provider_name(&self) -> &'static str {
        "postgres"
    }
}
