//! # Batch Model
//!
//! The tracked unit of ingested data and the field-level change set applied
//! to it by a status transition.
//!
//! ## Wire Shape
//!
//! Batches serialize camelCase, the same document that is stored by the
//! search-index backend and published on the notification topic:
//!
//! ```json
//! {
//!   "id": "test-batch",
//!   "tenantId": "1234",
//!   "name": "claims-2026-10",
//!   "dataType": "claims",
//!   "topic": "ingest.1234.claims.in",
//!   "integratorId": "int-1",
//!   "status": "sendCompleted",
//!   "startDate": "2026-10-19T12:00:00Z",
//!   "invalidThreshold": -1,
//!   "expectedRecordCount": 200
//! }
//! ```
//!
//! Count fields are always emitted as integers. Stores that hand them back
//! as floating point (`200.0`) or strings are normalized on read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::state_machine::states::BatchStatus;

/// `invalidThreshold` value meaning "no threshold configured".
pub const INVALID_THRESHOLD_UNSET: i64 = -1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub data_type: String,
    /// Ingest topic; the notification topic is derived from it
    pub topic: String,
    /// Owner, fixed at creation
    pub integrator_id: String,
    #[serde(default = "unknown_status", deserialize_with = "deserialize_status")]
    pub status: BatchStatus,
    pub start_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(
        default = "unset_threshold",
        deserialize_with = "deserialize_threshold"
    )]
    pub invalid_threshold: i64,
    /// Deprecated alias of `expected_record_count`, still written for old readers
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_count"
    )]
    pub record_count: Option<i64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_count"
    )]
    pub expected_record_count: Option<i64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_count"
    )]
    pub actual_record_count: Option<i64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_count"
    )]
    pub invalid_record_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Batch {
    pub fn has_invalid_threshold(&self) -> bool {
        self.invalid_threshold != INVALID_THRESHOLD_UNSET
    }

    pub fn is_owned_by(&self, subject: &str) -> bool {
        self.integrator_id == subject
    }
}

/// Field-level changes applied when a conditional update matches.
///
/// `None` leaves the stored field untouched. `metadata`, when present,
/// replaces the stored value wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchChanges {
    pub status: BatchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_record_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_record_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_record_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl BatchChanges {
    pub fn status_only(status: BatchStatus) -> Self {
        Self {
            status,
            end_date: None,
            expected_record_count: None,
            actual_record_count: None,
            invalid_record_count: None,
            failure_message: None,
            metadata: None,
        }
    }

    /// Apply the changes in place. `expected_record_count` also updates the
    /// deprecated `record_count` field.
    pub fn apply_to(&self, batch: &mut Batch) {
        batch.status = self.status;
        if let Some(end_date) = self.end_date {
            batch.end_date = Some(end_date);
        }
        if let Some(expected) = self.expected_record_count {
            batch.expected_record_count = Some(expected);
            batch.record_count = Some(expected);
        }
        if let Some(actual) = self.actual_record_count {
            batch.actual_record_count = Some(actual);
        }
        if let Some(invalid) = self.invalid_record_count {
            batch.invalid_record_count = Some(invalid);
        }
        if let Some(message) = &self.failure_message {
            batch.failure_message = Some(message.clone());
        }
        if let Some(metadata) = &self.metadata {
            batch.metadata = Some(metadata.clone());
        }
    }

    /// Stored field names this change set assigns, status first.
    pub fn assigned_fields(&self) -> Vec<&'static str> {
        let mut fields = vec!["status"];
        if self.end_date.is_some() {
            fields.push("endDate");
        }
        if self.expected_record_count.is_some() {
            fields.push("expectedRecordCount");
            fields.push("recordCount");
        }
        if self.actual_record_count.is_some() {
            fields.push("actualRecordCount");
        }
        if self.invalid_record_count.is_some() {
            fields.push("invalidRecordCount");
        }
        if self.failure_message.is_some() {
            fields.push("failureMessage");
        }
        if self.metadata.is_some() {
            fields.push("metadata");
        }
        fields
    }
}

/// Creation request for a batch.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBatch {
    /// Caller-assigned key; generated when absent
    #[serde(default)]
    pub id: Option<String>,
    pub tenant_id: String,
    pub name: String,
    pub data_type: String,
    pub topic: String,
    #[serde(default, deserialize_with = "deserialize_count")]
    pub invalid_threshold: Option<i64>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl NewBatch {
    /// Build the stored record in `started` state owned by `integrator_id`.
    pub fn into_batch(self, integrator_id: &str, now: DateTime<Utc>) -> Batch {
        let id = self
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Batch {
            id,
            tenant_id: self.tenant_id,
            name: self.name,
            data_type: self.data_type,
            topic: self.topic,
            integrator_id: integrator_id.to_string(),
            status: BatchStatus::Started,
            start_date: now,
            end_date: None,
            invalid_threshold: normalize_invalid_threshold(self.invalid_threshold),
            record_count: None,
            expected_record_count: None,
            actual_record_count: None,
            invalid_record_count: None,
            failure_message: None,
            metadata: self.metadata,
        }
    }
}

/// `0` and absent both mean "no threshold"; `0` collides with the wire
/// default so it is stored as the sentinel.
pub fn normalize_invalid_threshold(value: Option<i64>) -> i64 {
    match value {
        None | Some(0) => INVALID_THRESHOLD_UNSET,
        Some(threshold) => threshold,
    }
}

fn unknown_status() -> BatchStatus {
    BatchStatus::Unknown
}

fn unset_threshold() -> i64 {
    INVALID_THRESHOLD_UNSET
}

fn deserialize_status<'de, D>(deserializer: D) -> Result<BatchStatus, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value
        .as_deref()
        .map(BatchStatus::from_stored)
        .unwrap_or(BatchStatus::Unknown))
}

fn deserialize_threshold<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserialize_count(deserializer)?.unwrap_or(INVALID_THRESHOLD_UNSET))
}

/// Accepts integers, whole floats and numeric strings.
fn deserialize_count<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                Ok(Some(i))
            } else if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 && f.is_finite() {
                    Ok(Some(f as i64))
                } else {
                    Err(D::Error::custom(format!("count must be a whole number, got {f}")))
                }
            } else {
                Err(D::Error::custom("count out of range"))
            }
        }
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("count must be numeric, got '{s}'"))),
        Some(other) => Err(D::Error::custom(format!(
            "count must be a number, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_batch() -> Batch {
        NewBatch {
            id: Some("test-batch".to_string()),
            tenant_id: "1234".to_string(),
            name: "claims".to_string(),
            data_type: "claims".to_string(),
            topic: "ingest.1234.claims.in".to_string(),
            invalid_threshold: None,
            metadata: Some(json!({"source": "sftp"})),
        }
        .into_batch("int-1", Utc::now())
    }

    #[test]
    fn test_threshold_sentinel_normalization() {
        assert_eq!(normalize_invalid_threshold(None), -1);
        assert_eq!(normalize_invalid_threshold(Some(0)), -1);
        assert_eq!(normalize_invalid_threshold(Some(25)), 25);
        assert!(!sample_batch().has_invalid_threshold());
    }

    #[test]
    fn test_counts_normalized_on_read() {
        let batch: Batch = serde_json::from_value(json!({
            "id": "b1",
            "tenantId": "1234",
            "name": "n",
            "dataType": "claims",
            "topic": "ingest.1234.claims.in",
            "integratorId": "int-1",
            "status": "sendCompleted",
            "startDate": "2026-10-19T12:00:00Z",
            "invalidThreshold": 5.0,
            "expectedRecordCount": 200.0,
            "actualRecordCount": "199"
        }))
        .unwrap();

        assert_eq!(batch.invalid_threshold, 5);
        assert_eq!(batch.expected_record_count, Some(200));
        assert_eq!(batch.actual_record_count, Some(199));

        let out = serde_json::to_value(&batch).unwrap();
        assert_eq!(out["expectedRecordCount"], json!(200));
        assert!(out["expectedRecordCount"].is_i64());
    }

    #[test]
    fn test_fractional_count_rejected() {
        let result: Result<Batch, _> = serde_json::from_value(json!({
            "id": "b1", "tenantId": "1", "name": "n", "dataType": "d",
            "topic": "t", "integratorId": "i", "status": "started",
            "startDate": "2026-10-19T12:00:00Z",
            "expectedRecordCount": 2.5
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_unrecognised_status_reads_as_unknown() {
        let batch: Batch = serde_json::from_value(json!({
            "id": "b1", "tenantId": "1", "name": "n", "dataType": "d",
            "topic": "t", "integratorId": "i", "status": "archived",
            "startDate": "2026-10-19T12:00:00Z"
        }))
        .unwrap();
        assert_eq!(batch.status, BatchStatus::Unknown);
        assert_eq!(batch.invalid_threshold, INVALID_THRESHOLD_UNSET);
    }

    #[test]
    fn test_metadata_replaced_not_merged() {
        let mut batch = sample_batch();
        let changes = BatchChanges {
            metadata: Some(json!({"rerun": true})),
            ..BatchChanges::status_only(BatchStatus::Terminated)
        };
        changes.apply_to(&mut batch);
        assert_eq!(batch.metadata, Some(json!({"rerun": true})));

        BatchChanges::status_only(BatchStatus::Failed).apply_to(&mut batch);
        assert_eq!(batch.metadata, Some(json!({"rerun": true})));
    }

    #[test]
    fn test_expected_count_mirrors_deprecated_field() {
        let mut batch = sample_batch();
        let changes = BatchChanges {
            expected_record_count: Some(10),
            ..BatchChanges::status_only(BatchStatus::SendCompleted)
        };
        changes.apply_to(&mut batch);
        assert_eq!(batch.expected_record_count, Some(10));
        assert_eq!(batch.record_count, Some(10));
        assert_eq!(
            changes.assigned_fields(),
            vec!["status", "expectedRecordCount", "recordCount"]
        );
    }
}
