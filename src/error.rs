//! Error types for the batch lifecycle.
//!

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state_machine::states::BatchStatus;
use crate::store::StoreError;

/// Caller-facing errors of a batch operation.
///
/// Validation, authorization and unknown-action errors are raised before the
/// store is touched. `Conflict` means the store was consulted and nothing
/// changed. Everything mapped to 500 is an internal failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransitionError {
    #[error("Missing required parameter: {field}")]
    MissingParameter { field: String },

    #[error("Invalid parameter {field}: {reason}")]
    InvalidParameter { field: String, reason: String },

    #[error("Unauthorized: {reason}")]
    Unauthorized { reason: String },

    #[error("Batch {batch_id} not found for tenant {tenant_id}")]
    NotFound { tenant_id: String, batch_id: String },

    #[error("{action} failed, batch {batch_id} is in '{current_status}' state")]
    Conflict {
        batch_id: String,
        action: String,
        current_status: BatchStatus,
    },

    #[error("Unknown batch status action: '{action}'")]
    UnknownAction { action: String },

    #[error("Record store error: {message}")]
    Store { message: String },

    #[error("Unexpected record store result: {raw}")]
    UnexpectedStoreResult { raw: String },

    #[error("Failed to publish notification for batch {batch_id} to {topic}: {reason}")]
    PublishFailed {
        batch_id: String,
        topic: String,
        reason: String,
    },

    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl TransitionError {
    pub fn missing_parameter(field: impl Into<String>) -> Self {
        Self::MissingParameter {
            field: field.into(),
        }
    }

    pub fn invalid_parameter(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized {
            reason: reason.into(),
        }
    }

    pub fn not_found(tenant_id: impl Into<String>, batch_id: impl Into<String>) -> Self {
        Self::NotFound {
            tenant_id: tenant_id.into(),
            batch_id: batch_id.into(),
        }
    }

    /// HTTP-style result code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MissingParameter { .. } | Self::InvalidParameter { .. } => 400,
            Self::Unauthorized { .. } => 401,
            Self::NotFound { .. } => 404,
            Self::Conflict { .. } => 409,
            Self::UnknownAction { .. } => 422,
            Self::Store { .. }
            | Self::UnexpectedStoreResult { .. }
            | Self::PublishFailed { .. }
            | Self::Serialization { .. } => 500,
        }
    }

    pub fn is_internal(&self) -> bool {
        self.status_code() >= 500
    }

    /// Render the response body returned to the caller.
    pub fn to_response(&self, request_id: &str) -> ErrorResponse {
        ErrorResponse {
            error_event_id: request_id.to_string(),
            error_description: self.to_string(),
            status_code: self.status_code(),
        }
    }
}

impl From<StoreError> for TransitionError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound {
                tenant_id,
                batch_id,
            } => Self::NotFound {
                tenant_id,
                batch_id,
            },
            StoreError::UnexpectedResult { raw } => Self::UnexpectedStoreResult { raw },
            other => Self::Store {
                message: other.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for TransitionError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization {
            message: error.to_string(),
        }
    }
}

/// Error body handed back to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Correlation id of the failed request
    pub error_event_id: String,
    pub error_description: String,
    pub status_code: u16,
}

pub type TransitionResult<T> = Result<T, TransitionError>;
