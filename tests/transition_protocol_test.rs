//! End-to-end behaviour of the transition protocol over the in-memory
//! store and bus: conditional write, notification, compensation.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use batchline_core::config::CompensationConfig;
use batchline_core::messaging::{
    MessagingError, MessagingResult, NotificationBus, NotificationMessage,
};
use batchline_core::models::BatchChanges;
use batchline_core::state_machine::{
    FailPayload, ProcessingCompletePayload, SendCompletePayload, TerminatePayload,
};
use batchline_core::store::{BatchStore, ConditionalUpdate, InMemoryBatchStore};
use batchline_core::{
    BatchStatus, BatchTransitionService, StatusUpdate, TransitionError, TransitionRequest,
};
use common::*;
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

/// Bus that lets a competing processing-complete land on the store before
/// failing the publish, so compensation runs against a batch that has
/// already moved on.
struct RacingBus {
    store: Arc<InMemoryBatchStore>,
}

#[async_trait]
impl NotificationBus for RacingBus {
    async fn publish(&self, message: &NotificationMessage) -> MessagingResult<()> {
        let competing = ConditionalUpdate {
            tenant_id: TENANT.to_string(),
            batch_id: BATCH_ID.to_string(),
            required_statuses: vec![BatchStatus::SendCompleted],
            owner: None,
            changes: BatchChanges::status_only(BatchStatus::Completed),
        };
        let outcome = self
            .store
            .apply_conditional(&competing)
            .await
            .map_err(|e| MessagingError::publish(&message.topic, e.to_string()))?;
        assert!(outcome.is_applied());
        Err(MessagingError::publish(&message.topic, "broker unavailable"))
    }

    fn provider_name(&self) -> &'static str {
        "racing"
    }
}

fn terminate() -> StatusUpdate {
    StatusUpdate::new(
        TENANT,
        BATCH_ID,
        TransitionRequest::Terminate(TerminatePayload::default()),
    )
}

fn send_complete(validation: bool) -> StatusUpdate {
    StatusUpdate::new(
        TENANT,
        BATCH_ID,
        TransitionRequest::SendComplete(SendCompletePayload {
            expected_record_count: Some(100),
            validation,
            ..Default::default()
        }),
    )
}

fn processing_complete() -> StatusUpdate {
    StatusUpdate::new(
        TENANT,
        BATCH_ID,
        TransitionRequest::ProcessingComplete(ProcessingCompletePayload {
            actual_record_count: Some(98),
            invalid_record_count: Some(2),
        }),
    )
}

fn fail() -> StatusUpdate {
    StatusUpdate::new(
        TENANT,
        BATCH_ID,
        TransitionRequest::Fail(FailPayload {
            actual_record_count: Some(40),
            invalid_record_count: Some(40),
            failure_message: Some("too many invalid records".to_string()),
        }),
    )
}

#[tokio::test]
async fn test_terminate_then_repeat_is_conflict() {
    let harness = Harness::new();

    let batch = harness
        .service
        .transition(&owner(), terminate())
        .await
        .unwrap();
    assert_eq!(batch.status, BatchStatus::Terminated);
    assert!(batch.end_date.is_some());
    assert_eq!(harness.stored(), batch);

    let published = harness.bus.published_to(NOTIFICATION_TOPIC);
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].key, BATCH_ID);
    assert_eq!(published[0].value["status"], "terminated");
    assert_eq!(published[0].value["batchId"], BATCH_ID);

    let err = harness
        .service
        .transition(&owner(), terminate())
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 409);
    assert_eq!(
        err.to_string(),
        "terminate failed, batch test-batch is in 'terminated' state"
    );
    assert_eq!(harness.stored(), batch);
    assert_eq!(harness.bus.attempts(), 1);
}

#[tokio::test]
async fn test_send_complete_with_validation_then_processing_complete() {
    let harness = Harness::new();

    let sent = harness
        .service
        .transition(&owner(), send_complete(true))
        .await
        .unwrap();
    assert_eq!(sent.status, BatchStatus::SendCompleted);
    assert_eq!(sent.expected_record_count, Some(100));
    assert_eq!(sent.record_count, Some(100));
    assert!(sent.end_date.is_none());

    let done = harness
        .service
        .transition(&internal(), processing_complete())
        .await
        .unwrap();
    assert_eq!(done.status, BatchStatus::Completed);
    assert_eq!(done.actual_record_count, Some(98));
    assert_eq!(done.invalid_record_count, Some(2));
    assert!(done.end_date.is_some());

    let statuses: Vec<_> = harness
        .bus
        .published_to(NOTIFICATION_TOPIC)
        .iter()
        .map(|message| message.value["status"].clone())
        .collect();
    assert_eq!(statuses, vec![json!("sendCompleted"), json!("completed")]);
}

#[tokio::test]
async fn test_send_complete_without_validation_completes() {
    let harness = Harness::new();

    let batch = harness
        .service
        .transition(&owner(), send_complete(false))
        .await
        .unwrap();

    assert_eq!(batch.status, BatchStatus::Completed);
    assert!(batch.end_date.is_some());
}

#[tokio::test]
async fn test_fail_allowed_from_both_active_states() {
    for source in [BatchStatus::Started, BatchStatus::SendCompleted] {
        let harness = Harness::with_batches([batch_in(source)]);

        let batch = harness
            .service
            .transition(&internal(), fail())
            .await
            .unwrap();

        assert_eq!(batch.status, BatchStatus::Failed, "fail from {source}");
        assert_eq!(
            batch.failure_message.as_deref(),
            Some("too many invalid records")
        );
    }
}

#[tokio::test]
async fn test_terminal_states_reject_every_action() {
    for terminal in [
        BatchStatus::Completed,
        BatchStatus::Terminated,
        BatchStatus::Failed,
    ] {
        let harness = Harness::with_batches([batch_in(terminal)]);
        let before = harness.stored();

        let attempts = [
            harness.service.transition(&owner(), terminate()).await,
            harness.service.transition(&owner(), send_complete(true)).await,
            harness.service.transition(&owner(), send_complete(false)).await,
            harness
                .service
                .transition(&internal(), processing_complete())
                .await,
            harness.service.transition(&internal(), fail()).await,
        ];

        for result in attempts {
            let err = result.unwrap_err();
            assert_eq!(err.status_code(), 409, "{terminal}: {err}");
        }
        assert_eq!(harness.stored(), before);
        assert_eq!(harness.bus.attempts(), 0);
    }
}

#[tokio::test]
async fn test_processing_complete_requires_send_completed() {
    let harness = Harness::new();

    let err = harness
        .service
        .transition(&internal(), processing_complete())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        TransitionError::Conflict {
            current_status: BatchStatus::Started,
            ..
        }
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_transitions_have_one_winner() {
    let harness = Harness::new();

    let mut handles = Vec::new();
    for i in 0..16 {
        let service = harness.service.clone();
        let update = if i % 2 == 0 {
            terminate()
        } else {
            send_complete(true)
        };
        handles.push(tokio::spawn(async move {
            service.transition(&owner(), update).await
        }));
    }

    let mut applied = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => applied += 1,
            Err(err) => {
                assert_eq!(err.status_code(), 409, "{err}");
                conflicts += 1;
            }
        }
    }

    assert_eq!(applied, 1);
    assert_eq!(conflicts, 15);
    assert_eq!(harness.bus.published().len(), 1);
}

#[tokio::test]
async fn test_non_owner_is_unauthorized_without_mutation() {
    let harness = Harness::new();
    let before = harness.stored();

    let err = harness
        .service
        .transition(&integrator("integrator-2"), terminate())
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 401);
    assert_eq!(harness.stored(), before);
    assert_eq!(harness.bus.attempts(), 0);
}

#[tokio::test]
async fn test_non_owner_on_terminal_batch_is_unauthorized() {
    let harness = Harness::with_batches([batch_in(BatchStatus::Completed)]);

    let err = harness
        .service
        .transition(&integrator("integrator-2"), terminate())
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 401);
}

#[tokio::test]
async fn test_role_and_tenant_checked_before_store() {
    let harness = Harness::new();
    harness.store.fail_next_updates(1);

    let wrong_role = harness
        .service
        .transition(&internal(), terminate())
        .await
        .unwrap_err();
    assert_eq!(wrong_role.status_code(), 401);

    let other_tenant = batchline_core::Principal::new(OWNER)
        .with_role(batchline_core::Role::DataIntegrator)
        .with_tenant("9999");
    let wrong_tenant = harness
        .service
        .transition(&other_tenant, terminate())
        .await
        .unwrap_err();
    assert_eq!(wrong_tenant.status_code(), 401);

    let consumer_attempt = harness
        .service
        .transition(&consumer(), fail())
        .await
        .unwrap_err();
    assert_eq!(consumer_attempt.status_code(), 401);

    // the injected store failure was never consumed
    let err = harness
        .service
        .transition(&owner(), terminate())
        .await
        .unwrap_err();
    assert!(err.is_internal());
}

#[tokio::test]
async fn test_missing_parameters_have_no_side_effects() {
    let harness = Harness::new();
    let before = harness.stored();

    let no_count = StatusUpdate::new(
        TENANT,
        BATCH_ID,
        TransitionRequest::SendComplete(SendCompletePayload::default()),
    );
    let err = harness
        .service
        .transition(&owner(), no_count)
        .await
        .unwrap_err();
    assert_eq!(err, TransitionError::missing_parameter("expectedRecordCount"));

    let no_message = StatusUpdate::new(
        TENANT,
        BATCH_ID,
        TransitionRequest::Fail(FailPayload {
            actual_record_count: Some(1),
            invalid_record_count: Some(1),
            failure_message: Some("   ".to_string()),
        }),
    );
    let err = harness
        .service
        .transition(&internal(), no_message)
        .await
        .unwrap_err();
    assert_eq!(err, TransitionError::missing_parameter("failureMessage"));

    let no_tenant = StatusUpdate::new(
        "",
        BATCH_ID,
        TransitionRequest::Terminate(TerminatePayload::default()),
    );
    let err = harness
        .service
        .transition(&owner(), no_tenant)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);

    assert_eq!(harness.stored(), before);
    assert_eq!(harness.bus.attempts(), 0);
}

#[tokio::test]
async fn test_negative_counts_rejected() {
    let harness = Harness::new();

    let update = StatusUpdate::new(
        TENANT,
        BATCH_ID,
        TransitionRequest::SendComplete(SendCompletePayload {
            expected_record_count: Some(-1),
            ..Default::default()
        }),
    );
    let err = harness
        .service
        .transition(&owner(), update)
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 400);
    assert_eq!(harness.stored().status, BatchStatus::Started);
}

#[test]
fn test_unknown_action_is_rejected() {
    let err = TransitionRequest::from_action("archive", json!({})).unwrap_err();
    assert_eq!(err.status_code(), 422);

    let response = err.to_response("req-42");
    assert_eq!(response.error_event_id, "req-42");
    assert_eq!(response.status_code, 422);
}

#[tokio::test]
async fn test_parsed_request_runs_through_service() {
    let harness = Harness::new();
    let request = TransitionRequest::from_action(
        "sendComplete",
        json!({"recordCount": 7, "validation": true, "metadata": {"source": "sftp"}}),
    )
    .unwrap();

    let batch = harness
        .service
        .transition(&owner(), StatusUpdate::new(TENANT, BATCH_ID, request))
        .await
        .unwrap();

    assert_eq!(batch.status, BatchStatus::SendCompleted);
    assert_eq!(batch.expected_record_count, Some(7));
    assert_eq!(batch.metadata, Some(json!({"source": "sftp"})));
}

#[tokio::test]
async fn test_missing_batch_is_not_found() {
    let harness = Harness::empty();

    let err = harness
        .service
        .transition(&owner(), terminate())
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn test_store_error_is_internal() {
    let harness = Harness::new();
    harness.store.fail_next_updates(1);

    let err = harness
        .service
        .transition(&owner(), terminate())
        .await
        .unwrap_err();

    assert!(matches!(err, TransitionError::Store { .. }));
    assert_eq!(err.status_code(), 500);
    assert_eq!(harness.bus.attempts(), 0);
}

#[tokio::test]
async fn test_publish_failure_reverts_status() {
    let harness = Harness::new();
    harness.bus.fail_next_publishes(1);

    let err = harness
        .service
        .transition(&owner(), send_complete(true))
        .await
        .unwrap_err();

    match &err {
        TransitionError::PublishFailed {
            batch_id, topic, ..
        } => {
            assert_eq!(batch_id, BATCH_ID);
            assert_eq!(topic, NOTIFICATION_TOPIC);
        }
        other => panic!("expected publish failure, got {other:?}"),
    }
    assert_eq!(err.status_code(), 500);
    assert_eq!(harness.stored().status, BatchStatus::Started);
    assert!(harness.bus.published().is_empty());

    // the batch is usable again once the bus recovers
    let batch = harness
        .service
        .transition(&owner(), send_complete(true))
        .await
        .unwrap();
    assert_eq!(batch.status, BatchStatus::SendCompleted);
}

#[tokio::test]
async fn test_publish_failure_reverts_fail_to_its_source() {
    let harness = Harness::with_batches([batch_in(BatchStatus::SendCompleted)]);
    harness.bus.set_unavailable(true);

    let err = harness
        .service
        .transition(&internal(), fail())
        .await
        .unwrap_err();

    assert!(matches!(err, TransitionError::PublishFailed { .. }));
    assert_eq!(harness.stored().status, BatchStatus::SendCompleted);
}

#[tokio::test]
async fn test_exhausted_compensation_still_reports_publish_failure() {
    let harness = Harness::new();
    harness.bus.set_unavailable(true);
    harness.store.fail_next_status_writes(100);

    let err = harness
        .service
        .transition(&owner(), terminate())
        .await
        .unwrap_err();

    assert!(matches!(err, TransitionError::PublishFailed { .. }));
    assert_eq!(harness.store.status_write_attempts(), 6);
    assert_eq!(harness.stored().status, BatchStatus::Terminated);
}

#[tokio::test]
async fn test_get_batch_visibility() {
    let harness = Harness::new();

    let batch = harness
        .service
        .get_batch(&owner(), "req-1", TENANT, BATCH_ID)
        .await
        .unwrap();
    assert_eq!(batch.id, BATCH_ID);

    assert_ok!(
        harness
            .service
            .get_batch(&consumer(), "req-2", TENANT, BATCH_ID)
            .await
    );
    assert_ok!(
        harness
            .service
            .get_batch(&internal(), "req-3", TENANT, BATCH_ID)
            .await
    );

    let err = assert_err!(
        harness
            .service
            .get_batch(&integrator("integrator-2"), "req-4", TENANT, BATCH_ID)
            .await
    );
    assert_eq!(err.status_code(), 401);

    let err = harness
        .service
        .get_batch(&consumer(), "req-5", TENANT, "missing")
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 404);

    let err = harness
        .service
        .get_batch(&consumer(), "req-6", TENANT, "")
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn test_create_batch_announces_started_record() {
    let harness = Harness::empty();
    let mut request = new_batch();
    request.id = None;
    request.invalid_threshold = Some(0);

    let batch = harness
        .service
        .create_batch(&owner(), "req-1", request)
        .await
        .unwrap();

    assert_eq!(batch.status, BatchStatus::Started);
    assert_eq!(batch.integrator_id, OWNER);
    assert!(!batch.has_invalid_threshold());
    assert_eq!(harness.store.snapshot(TENANT, &batch.id), Some(batch.clone()));

    let published = harness.bus.published_to(NOTIFICATION_TOPIC);
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].value["status"], "started");
}

#[tokio::test]
async fn test_create_batch_rejections() {
    let harness = Harness::new();

    let duplicate = harness
        .service
        .create_batch(&owner(), "req-1", new_batch())
        .await
        .unwrap_err();
    assert_eq!(duplicate.status_code(), 400);

    let not_integrator = harness
        .service
        .create_batch(&internal(), "req-2", new_batch())
        .await
        .unwrap_err();
    assert_eq!(not_integrator.status_code(), 401);

    let mut nameless = new_batch();
    nameless.id = Some("other".to_string());
    nameless.name = String::new();
    let err = harness
        .service
        .create_batch(&owner(), "req-3", nameless)
        .await
        .unwrap_err();
    assert_eq!(err, TransitionError::missing_parameter("name"));

    assert_eq!(harness.store.len(), 1);
    assert_eq!(harness.bus.attempts(), 0);
}

#[tokio::test]
async fn test_create_publish_failure_removes_record() {
    let harness = Harness::empty();
    harness.bus.fail_next_publishes(1);
    harness.store.fail_next_deletes(2);

    let err = harness
        .service
        .create_batch(&owner(), "req-1", new_batch())
        .await
        .unwrap_err();

    assert!(matches!(err, TransitionError::PublishFailed { .. }));
    assert!(harness.store.is_empty());
    assert_eq!(harness.store.delete_attempts(), 3);
}

#[tokio::test]
async fn test_revert_leaves_batch_moved_on_by_later_transition() {
    let store = Arc::new(InMemoryBatchStore::with_batches([batch_in(BatchStatus::Started)]));
    let bus = Arc::new(RacingBus {
        store: store.clone(),
    });
    let service =
        BatchTransitionService::new(store.clone(), bus, CompensationConfig::without_delay(6));

    let err = service
        .transition(&owner(), send_complete(true))
        .await
        .unwrap_err();

    assert!(matches!(err, TransitionError::PublishFailed { .. }));
    let stored = store.snapshot(TENANT, BATCH_ID).unwrap();
    assert_eq!(stored.status, BatchStatus::Completed);
    // one conditional attempt, no retries once the batch has moved on
    assert_eq!(store.status_write_attempts(), 1);
}
