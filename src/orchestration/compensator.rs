//! # Compensator
//!
//! Undoes a store write whose notification could not be published. The
//! write is the durable fact and the publish is best-effort, so the only
//! recovery available is another write:
//!
//! - after a transition, [`Compensator::revert`] restores the prior status;
//! - after a creation, [`Compensator::remove`] deletes the new record.
//!
//! A revert only writes while the batch still holds the status this request
//! wrote. If a later transition has already moved it on, the revert stops
//! with [`CompensationOutcome::Superseded`] and the later status stands.
//!
//! Attempts are sequential and bounded by `max_attempts`, with exponential
//! backoff between them. A revert that finds no record is retried like an
//! error. When attempts run out the outcome is
//! [`CompensationOutcome::Exhausted`] and the inconsistency is logged at
//! error level; the caller still reports the original publish failure.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::config::CompensationConfig;
use crate::logging::log_compensation_outcome;
use crate::state_machine::states::BatchStatus;
use crate::store::{BatchStore, StatusWrite, StoreResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompensationOutcome {
    /// The compensating write took effect
    Reverted { attempts: u32 },
    /// Every attempt failed or modified nothing
    Exhausted {
        attempts: u32,
        last_error: Option<String>,
    },
    /// The batch had already left the written status; nothing was changed
    Superseded {
        attempts: u32,
        current_status: BatchStatus,
    },
}

impl CompensationOutcome {
    pub fn is_reverted(&self) -> bool {
        matches!(self, Self::Reverted { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Reverted { attempts }
            | Self::Exhausted { attempts, .. }
            | Self::Superseded { attempts, .. } => *attempts,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Reverted { .. } => "reverted",
            Self::Exhausted { .. } => "exhausted",
            Self::Superseded { .. } => "superseded",
        }
    }
}

#[derive(Clone)]
pub struct Compensator {
    store: Arc<dyn BatchStore>,
    policy: CompensationConfig,
}

impl std::fmt::Debug for Compensator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compensator")
            .field("store", &self.store.provider_name())
            .field("policy", &self.policy)
            .finish()
    }
}

impl Compensator {
    pub fn new(store: Arc<dyn BatchStore>, policy: CompensationConfig) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &CompensationConfig {
        &self.policy
    }

    /// Set the batch back from `written_status` to `target_status`
    #[instrument(skip(self), fields(store = self.store.provider_name()))]
    pub async fn revert(
        &self,
        request_id: &str,
        tenant_id: &str,
        batch_id: &str,
        written_status: BatchStatus,
        target_status: BatchStatus,
    ) -> CompensationOutcome {
        let outcome = self
            .retry(move || {
                self.store
                    .revert_status(tenant_id, batch_id, written_status, target_status)
            })
            .await;
        self.report(request_id, tenant_id, batch_id, "revert", &outcome);
        outcome
    }

    /// Delete a batch whose creation could not be announced. A batch that is
    /// already gone counts as removed.
    #[instrument(skip(self), fields(store = self.store.provider_name()))]
    pub async fn remove(
        &self,
        request_id: &str,
        tenant_id: &str,
        batch_id: &str,
    ) -> CompensationOutcome {
        let outcome = self
            .retry(move || async move {
                self.store
                    .delete_batch(tenant_id, batch_id)
                    .await
                    .map(|_| StatusWrite::Written)
            })
            .await;
        self.report(request_id, tenant_id, batch_id, "remove", &outcome);
        outcome
    }

    async fn retry<F, Fut>(&self, mut operation: F) -> CompensationOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<StatusWrite>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let delay = self.policy.backoff_delay(attempt - 1);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }

            match operation().await {
                Ok(StatusWrite::Written) => {
                    return CompensationOutcome::Reverted { attempts: attempt }
                }
                Ok(StatusWrite::Superseded(current_status)) => {
                    return CompensationOutcome::Superseded {
                        attempts: attempt,
                        current_status,
                    }
                }
                Ok(StatusWrite::Missing) => {
                    debug!(attempt, "Compensating write modified nothing");
                    last_error = Some("no record modified".to_string());
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Compensating write failed");
                    last_error = Some(e.to_string());
                }
            }
        }

        CompensationOutcome::Exhausted {
            attempts: max_attempts,
            last_error,
        }
    }

    fn report(
        &self,
        request_id: &str,
        tenant_id: &str,
        batch_id: &str,
        operation: &str,
        outcome: &CompensationOutcome,
    ) {
        let details = match outcome {
            CompensationOutcome::Exhausted { last_error, .. } => last_error.as_deref(),
            CompensationOutcome::Superseded { current_status, .. } => Some(current_status.as_str()),
            CompensationOutcome::Reverted { .. } => None,
        };
        log_compensation_outcome(
            request_id,
            tenant_id,
            batch_id,
            operation,
            outcome.label(),
            outcome.attempts(),
            details,
        );
    }
}
