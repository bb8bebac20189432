//! # Transition Rules
//!
//! Per-action rules for the batch state graph:
//!
//! ```text
//! started ──sendComplete(validation)──▶ sendCompleted ──processingComplete──▶ completed
//! started ──sendComplete(no validation)──▶ completed
//! started ──terminate──▶ terminated
//! {started, sendCompleted} ──fail──▶ failed
//! ```
//!
//! | Action | Role | Owner | Source | Target |
//! |---|---|---|---|---|
//! | sendComplete (validation) | data_integrator | yes | started | sendCompleted |
//! | sendComplete (no validation) | data_integrator | yes | started | completed |
//! | processingComplete | internal | no | sendCompleted | completed |
//! | terminate | data_integrator | yes | started | terminated |
//! | fail | internal | no | started, sendCompleted | failed |
//!
//! No rule lists a terminal status as a source.

use chrono::{DateTime, Utc};

use super::events::{TransitionAction, TransitionRequest};
use super::guards;
use super::states::BatchStatus;
use crate::auth::{Principal, Role};
use crate::error::{TransitionError, TransitionResult};
use crate::models::BatchChanges;

const FROM_STARTED: &[BatchStatus] = &[BatchStatus::Started];
const FROM_SEND_COMPLETED: &[BatchStatus] = &[BatchStatus::SendCompleted];
const FROM_ACTIVE: &[BatchStatus] = &[BatchStatus::Started, BatchStatus::SendCompleted];

/// Static description of one transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    pub action: TransitionAction,
    pub required_role: Role,
    /// Caller subject must equal the stored `integratorId`
    pub ownership_required: bool,
    pub source_statuses: &'static [BatchStatus],
    pub target_status: BatchStatus,
}

impl TransitionRule {
    /// Role and tenant check, independent of the record's state
    pub fn authorize(&self, principal: &Principal, tenant_id: &str) -> TransitionResult<()> {
        guards::require_role(principal, self.required_role, tenant_id)
    }

    pub fn allows_source(&self, status: BatchStatus) -> bool {
        self.source_statuses.contains(&status)
    }

    /// Owner predicate handed to the store, if any
    pub fn owner_predicate(&self, principal: &Principal) -> Option<String> {
        self.ownership_required.then(|| principal.subject.clone())
    }
}

impl TransitionRequest {
    pub fn rule(&self) -> TransitionRule {
        match self {
            Self::SendComplete(payload) => TransitionRule {
                action: TransitionAction::SendComplete,
                required_role: Role::DataIntegrator,
                ownership_required: true,
                source_statuses: FROM_STARTED,
                target_status: if payload.validation {
                    BatchStatus::SendCompleted
                } else {
                    BatchStatus::Completed
                },
            },
            Self::Terminate(_) => TransitionRule {
                action: TransitionAction::Terminate,
                required_role: Role::DataIntegrator,
                ownership_required: true,
                source_statuses: FROM_STARTED,
                target_status: BatchStatus::Terminated,
            },
            Self::ProcessingComplete(_) => TransitionRule {
                action: TransitionAction::ProcessingComplete,
                required_role: Role::Internal,
                ownership_required: false,
                source_statuses: FROM_SEND_COMPLETED,
                target_status: BatchStatus::Completed,
            },
            Self::Fail(_) => TransitionRule {
                action: TransitionAction::Fail,
                required_role: Role::Internal,
                ownership_required: false,
                source_statuses: FROM_ACTIVE,
                target_status: BatchStatus::Failed,
            },
        }
    }

    /// Validate request fields and build the change set applied when the
    /// store predicate matches.
    pub fn build_changes(&self, now: DateTime<Utc>) -> TransitionResult<BatchChanges> {
        let rule = self.rule();
        let mut changes = BatchChanges::status_only(rule.target_status);

        match self {
            Self::SendComplete(payload) => {
                let expected = payload
                    .effective_record_count()
                    .ok_or_else(|| TransitionError::missing_parameter("expectedRecordCount"))?;
                changes.expected_record_count = Some(non_negative("expectedRecordCount", expected)?);
                if !payload.validation {
                    changes.end_date = Some(now);
                }
                changes.metadata = payload.metadata.clone();
            }
            Self::Terminate(payload) => {
                changes.end_date = Some(now);
                changes.metadata = payload.metadata.clone();
            }
            Self::ProcessingComplete(payload) => {
                changes.actual_record_count = Some(required_count(
                    "actualRecordCount",
                    payload.actual_record_count,
                )?);
                changes.invalid_record_count = Some(required_count(
                    "invalidRecordCount",
                    payload.invalid_record_count,
                )?);
                changes.end_date = Some(now);
            }
            Self::Fail(payload) => {
                changes.actual_record_count = Some(required_count(
                    "actualRecordCount",
                    payload.actual_record_count,
                )?);
                changes.invalid_record_count = Some(required_count(
                    "invalidRecordCount",
                    payload.invalid_record_count,
                )?);
                let message = payload
                    .failure_message
                    .as_deref()
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .ok_or_else(|| TransitionError::missing_parameter("failureMessage"))?;
                changes.failure_message = Some(message.to_string());
                changes.end_date = Some(now);
            }
        }

        Ok(changes)
    }
}

fn required_count(field: &str, value: Option<i64>) -> TransitionResult<i64> {
    let value = value.ok_or_else(|| TransitionError::missing_parameter(field))?;
    non_negative(field, value)
}

fn non_negative(field: &str, value: i64) -> TransitionResult<i64> {
    if value < 0 {
        return Err(TransitionError::invalid_parameter(
            field,
            format!("must be >= 0, got {value}"),
        ));
    }
    Ok(value)
}
