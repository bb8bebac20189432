//! # Batch Transition Service
//!
//! Runs one status transition end to end:
//!
//! 1. resolve the rule for the action and authorize the caller
//! 2. validate the request and build the change set
//! 3. apply a conditional update: legal source status plus, for
//!    integrator actions, the owner
//! 4. classify a no-op as `Unauthorized` (wrong owner) or `Conflict`
//! 5. publish the updated record to the derived notification topic
//! 6. on publish failure, revert to the replaced status if the batch still
//!    holds the status written in step 3, and report the publish failure
//!    whatever the revert outcome
//!
//! Steps 1 and 2 never touch the store. Concurrent requests for the same
//! batch are serialized by the store's compare-and-swap; the service keeps
//! no locks of its own.
//!
//! Batch creation and single-batch reads share the same authorization and
//! publish rules.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, instrument, warn};

use super::compensator::{CompensationOutcome, Compensator};
use crate::auth::{Principal, Role};
use crate::config::CompensationConfig;
use crate::error::{TransitionError, TransitionResult};
use crate::logging::log_transition_outcome;
use crate::messaging::{NotificationBus, NotificationMessage};
use crate::models::{Batch, NewBatch, INVALID_THRESHOLD_UNSET};
use crate::state_machine::events::StatusUpdate;
use crate::state_machine::guards;
use crate::state_machine::rules::TransitionRule;
use crate::store::{BatchStore, ConditionalUpdate, StoreError, UpdateOutcome};

const READ_ROLES: &[Role] = &[Role::Consumer, Role::DataIntegrator, Role::Internal];

#[derive(Clone)]
pub struct BatchTransitionService {
    store: Arc<dyn BatchStore>,
    bus: Arc<dyn NotificationBus>,
    compensator: Compensator,
}

impl std::fmt::Debug for BatchTransitionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchTransitionService")
            .field("store", &self.store.provider_name())
            .field("bus", &self.bus.provider_name())
            .field("compensator", &self.compensator)
            .finish()
    }
}

impl BatchTransitionService {
    pub fn new(
        store: Arc<dyn BatchStore>,
        bus: Arc<dyn NotificationBus>,
        compensation: CompensationConfig,
    ) -> Self {
        let compensator = Compensator::new(Arc::clone(&store), compensation);
        Self {
            store,
            bus,
            compensator,
        }
    }

    pub fn store(&self) -> &Arc<dyn BatchStore> {
        &self.store
    }

    /// Apply a status transition and announce it.
    #[instrument(
        skip(self, principal, update),
        fields(
            request_id = %update.request_id,
            tenant_id = %update.tenant_id,
            batch_id = %update.batch_id,
            action = %update.action(),
        )
    )]
    pub async fn transition(
        &self,
        principal: &Principal,
        update: StatusUpdate,
    ) -> TransitionResult<Batch> {
        let result = self.run_transition(principal, &update).await;

        let (outcome, status_code, details) = match &result {
            Ok(batch) => ("applied", 200, Some(batch.status.to_string())),
            Err(e) => ("rejected", e.status_code(), Some(e.to_string())),
        };
        log_transition_outcome(
            &update.request_id,
            &update.tenant_id,
            &update.batch_id,
            update.action().as_str(),
            outcome,
            status_code,
            details.as_deref(),
        );

        result
    }

    async fn run_transition(
        &self,
        principal: &Principal,
        update: &StatusUpdate,
    ) -> TransitionResult<Batch> {
        require_identifier("tenantId", &update.tenant_id)?;
        require_identifier("batchId", &update.batch_id)?;

        let rule = update.request.rule();
        rule.authorize(principal, &update.tenant_id)?;
        let changes = update.request.build_changes(Utc::now())?;

        let conditional = ConditionalUpdate {
            tenant_id: update.tenant_id.clone(),
            batch_id: update.batch_id.clone(),
            required_statuses: rule.source_statuses.to_vec(),
            owner: rule.owner_predicate(principal),
            changes,
        };

        match self.store.apply_conditional(&conditional).await? {
            UpdateOutcome::NoOp(current) => Err(classify_noop(&rule, principal, &current)),
            UpdateOutcome::Applied {
                previous_status,
                batch,
            } => {
                debug!(
                    from = %previous_status,
                    to = %batch.status,
                    "Conditional update applied"
                );
                if let Err(reason) = self.announce(&batch).await {
                    self.compensator
                        .revert(
                            &update.request_id,
                            &update.tenant_id,
                            &update.batch_id,
                            batch.status,
                            previous_status,
                        )
                        .await;
                    return Err(publish_failed(&batch, reason));
                }
                Ok(batch)
            }
        }
    }

    /// Read one batch. Integrators only see batches they own.
    #[instrument(skip(self, principal))]
    pub async fn get_batch(
        &self,
        principal: &Principal,
        request_id: &str,
        tenant_id: &str,
        batch_id: &str,
    ) -> TransitionResult<Batch> {
        require_identifier("tenantId", tenant_id)?;
        require_identifier("batchId", batch_id)?;
        guards::require_any_role(principal, READ_ROLES, tenant_id)?;

        let batch = self
            .store
            .get_batch(tenant_id, batch_id)
            .await?
            .ok_or_else(|| TransitionError::not_found(tenant_id, batch_id))?;

        let integrator_only = principal.has_role(Role::DataIntegrator)
            && !principal.has_role(Role::Internal)
            && !principal.has_role(Role::Consumer);
        if integrator_only {
            guards::require_owner(principal, &batch)?;
        }
        Ok(batch)
    }

    /// Create a batch in `started` state owned by the caller and announce it.
    /// If the announcement fails the record is removed again.
    #[instrument(
        skip(self, principal, new_batch),
        fields(tenant_id = %new_batch.tenant_id)
    )]
    pub async fn create_batch(
        &self,
        principal: &Principal,
        request_id: &str,
        new_batch: NewBatch,
    ) -> TransitionResult<Batch> {
        require_identifier("tenantId", &new_batch.tenant_id)?;
        guards::require_role(principal, Role::DataIntegrator, &new_batch.tenant_id)?;
        validate_new_batch(&new_batch)?;

        let batch = new_batch.into_batch(&principal.subject, Utc::now());
        let result = self.insert_and_announce(request_id, &batch).await;

        let (outcome, status_code, details) = match &result {
            Ok(_) => ("created", 200, None),
            Err(e) => ("rejected", e.status_code(), Some(e.to_string())),
        };
        log_transition_outcome(
            request_id,
            &batch.tenant_id,
            &batch.id,
            "create",
            outcome,
            status_code,
            details.as_deref(),
        );

        result.map(|_| batch)
    }

    async fn insert_and_announce(&self, request_id: &str, batch: &Batch) -> TransitionResult<()> {
        self.store
            .insert_batch(batch)
            .await
            .map_err(|e| match e {
                StoreError::AlreadyExists { batch_id, .. } => TransitionError::invalid_parameter(
                    "id",
                    format!("batch {batch_id} already exists"),
                ),
                other => other.into(),
            })?;

        if let Err(reason) = self.announce(batch).await {
            let outcome = self
                .compensator
                .remove(request_id, &batch.tenant_id, &batch.id)
                .await;
            if let CompensationOutcome::Exhausted { .. } = outcome {
                warn!(batch_id = %batch.id, "Unannounced batch left in store");
            }
            return Err(publish_failed(batch, reason));
        }
        Ok(())
    }

    /// Publish the status notification for `batch`; returns the failure
    /// reason, encode errors included.
    async fn announce(&self, batch: &Batch) -> Result<(), String> {
        let message = NotificationMessage::for_batch(batch).map_err(|e| e.to_string())?;
        self.bus
            .publish(&message)
            .await
            .map_err(|e| e.to_string())?;
        debug!(
            topic = %message.topic,
            key = %message.key,
            provider = self.bus.provider_name(),
            "Batch notification published"
        );
        Ok(())
    }
}

fn require_identifier(field: &str, value: &str) -> TransitionResult<()> {
    if value.trim().is_empty() {
        return Err(TransitionError::missing_parameter(field));
    }
    Ok(())
}

fn validate_new_batch(new_batch: &NewBatch) -> TransitionResult<()> {
    require_identifier("name", &new_batch.name)?;
    require_identifier("dataType", &new_batch.data_type)?;
    require_identifier("topic", &new_batch.topic)?;
    if let Some(threshold) = new_batch.invalid_threshold {
        if threshold < INVALID_THRESHOLD_UNSET {
            return Err(TransitionError::invalid_parameter(
                "invalidThreshold",
                format!("must be >= 0, got {threshold}"),
            ));
        }
    }
    Ok(())
}

/// A no-op caused by the owner predicate is an authorization failure; any
/// other no-op is a status conflict.
fn classify_noop(rule: &TransitionRule, principal: &Principal, current: &Batch) -> TransitionError {
    if rule.ownership_required && !current.is_owned_by(&principal.subject) {
        return TransitionError::unauthorized(format!(
            "{} is not the owner of batch {}",
            principal.subject, current.id
        ));
    }
    TransitionError::Conflict {
        batch_id: current.id.clone(),
        action: rule.action.as_str().to_string(),
        current_status: current.status,
    }
}

fn publish_failed(batch: &Batch, reason: String) -> TransitionError {
    TransitionError::PublishFailed {
        batch_id: batch.id.clone(),
        topic: crate::messaging::notification_topic(&batch.topic),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::InMemoryNotificationBus;
    use crate::state_machine::events::{TerminatePayload, TransitionRequest};
    use crate::state_machine::states::BatchStatus;
    use crate::store::InMemoryBatchStore;

    fn integrator(subject: &str) -> Principal {
        Principal::new(subject)
            .with_role(Role::DataIntegrator)
            .with_tenant("1234")
    }

    fn started_batch() -> Batch {
        NewBatch {
            id: Some("test-batch".into()),
            tenant_id: "1234".into(),
            name: "claims".into(),
            data_type: "claims".into(),
            topic: "ingest.1234.claims.in".into(),
            ..Default::default()
        }
        .into_batch("int-1", Utc::now())
    }

    fn service() -> (
        BatchTransitionService,
        Arc<InMemoryBatchStore>,
        Arc<InMemoryNotificationBus>,
    ) {
        let store = Arc::new(InMemoryBatchStore::with_batches([started_batch()]));
        let bus = Arc::new(InMemoryNotificationBus::new());
        let service = BatchTransitionService::new(
            store.clone(),
            bus.clone(),
            CompensationConfig::without_delay(6),
        );
        (service, store, bus)
    }

    fn terminate() -> StatusUpdate {
        StatusUpdate::new(
            "1234",
            "test-batch",
            TransitionRequest::Terminate(TerminatePayload::default()),
        )
    }

    #[test]
    fn test_noop_classification() {
        let rule = terminate().request.rule();
        let mut batch = started_batch();

        let err = classify_noop(&rule, &integrator("int-2"), &batch);
        assert_eq!(err.status_code(), 401);

        batch.status = BatchStatus::Terminated;
        let err = classify_noop(&rule, &integrator("int-1"), &batch);
        assert_eq!(err.status_code(), 409);
    }

    #[tokio::test]
    async fn test_empty_identifiers_rejected_before_store() {
        let (service, store, bus) = service();
        store.fail_next_updates(1);

        let update = StatusUpdate::new(
            "1234",
            " ",
            TransitionRequest::Terminate(TerminatePayload::default()),
        );
        let err = service
            .transition(&integrator("int-1"), update)
            .await
            .unwrap_err();

        assert_eq!(err, TransitionError::missing_parameter("batchId"));
        assert_eq!(bus.attempts(), 0);
        // the injected failure is still pending, so the store was never called
        assert!(service
            .transition(&integrator("int-1"), terminate())
            .await
            .unwrap_err()
            .is_internal());
    }

    #[tokio::test]
    async fn test_terminate_publishes_to_notification_topic() {
        let (service, _store, bus) = service();

        let batch = service
            .transition(&integrator("int-1"), terminate())
            .await
            .unwrap();

        assert_eq!(batch.status, BatchStatus::Terminated);
        let published = bus.published_to("ingest.1234.claims.notification");
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].key, "test-batch");
    }

    #[tokio::test]
    async fn test_create_rejects_bad_threshold() {
        let (service, _store, _bus) = service();
        let new_batch = NewBatch {
            tenant_id: "1234".into(),
            name: "n".into(),
            data_type: "claims".into(),
            topic: "ingest.1234.claims.in".into(),
            invalid_threshold: Some(-5),
            ..Default::default()
        };
        let err = service
            .create_batch(&integrator("int-1"), "req-1", new_batch)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}
