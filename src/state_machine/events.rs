use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::error::{TransitionError, TransitionResult};

/// Actions a caller can request against a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransitionAction {
    /// Integrator finished sending records
    SendComplete,
    /// Integrator abandons the batch
    Terminate,
    /// Internal processing finished
    ProcessingComplete,
    /// Internal processing failed
    Fail,
}

impl TransitionAction {
    /// Stable identifier used in routing and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SendComplete => "sendComplete",
            Self::Terminate => "terminate",
            Self::ProcessingComplete => "processingComplete",
            Self::Fail => "fail",
        }
    }

    pub fn all() -> &'static [TransitionAction] {
        &[
            Self::SendComplete,
            Self::Terminate,
            Self::ProcessingComplete,
            Self::Fail,
        ]
    }
}

impl fmt::Display for TransitionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransitionAction {
    type Err = TransitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| TransitionError::UnknownAction {
                action: s.to_string(),
            })
    }
}

/// Body of a `sendComplete` request
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendCompletePayload {
    #[serde(default)]
    pub expected_record_count: Option<i64>,
    /// Deprecated spelling of `expected_record_count`
    #[serde(default)]
    pub record_count: Option<i64>,
    /// Whether records go through validation before the batch completes
    #[serde(default)]
    pub validation: bool,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl SendCompletePayload {
    /// Expected count, falling back to the deprecated field
    pub fn effective_record_count(&self) -> Option<i64> {
        self.expected_record_count.or(self.record_count)
    }
}

/// Body of a `terminate` request
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminatePayload {
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Body of a `processingComplete` request
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingCompletePayload {
    #[serde(default)]
    pub actual_record_count: Option<i64>,
    #[serde(default)]
    pub invalid_record_count: Option<i64>,
}

/// Body of a `fail` request
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailPayload {
    #[serde(default)]
    pub actual_record_count: Option<i64>,
    #[serde(default)]
    pub invalid_record_count: Option<i64>,
    #[serde(default)]
    pub failure_message: Option<String>,
}

/// A typed transition request, one variant per action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload", rename_all = "camelCase")]
pub enum TransitionRequest {
    SendComplete(SendCompletePayload),
    Terminate(TerminatePayload),
    ProcessingComplete(ProcessingCompletePayload),
    Fail(FailPayload),
}

impl TransitionRequest {
    /// Parse an action token plus JSON body. Unknown actions are rejected
    /// with `UnknownAction` before the body is looked at.
    pub fn from_action(action: &str, body: Value) -> TransitionResult<Self> {
        let action: TransitionAction = action.parse()?;
        let body = if body.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            body
        };

        let parse_error =
            |e: serde_json::Error| TransitionError::invalid_parameter("body", e.to_string());

        Ok(match action {
            TransitionAction::SendComplete => {
                Self::SendComplete(serde_json::from_value(body).map_err(parse_error)?)
            }
            TransitionAction::Terminate => {
                Self::Terminate(serde_json::from_value(body).map_err(parse_error)?)
            }
            TransitionAction::ProcessingComplete => {
                Self::ProcessingComplete(serde_json::from_value(body).map_err(parse_error)?)
            }
            TransitionAction::Fail => Self::Fail(serde_json::from_value(body).map_err(parse_error)?),
        })
    }

    pub fn action(&self) -> TransitionAction {
        match self {
            Self::SendComplete(_) => TransitionAction::SendComplete,
            Self::Terminate(_) => TransitionAction::Terminate,
            Self::ProcessingComplete(_) => TransitionAction::ProcessingComplete,
            Self::Fail(_) => TransitionAction::Fail,
        }
    }
}

/// A transition request addressed to one batch
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    /// Correlation id, echoed in logs and error responses
    pub request_id: String,
    pub tenant_id: String,
    pub batch_id: String,
    pub request: TransitionRequest,
}

impl StatusUpdate {
    pub fn new(
        tenant_id: impl Into<String>,
        batch_id: impl Into<String>,
        request: TransitionRequest,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.into(),
            batch_id: batch_id.into(),
            request,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn action(&self) -> TransitionAction {
        self.request.action()
    }
}
