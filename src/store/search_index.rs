//! # Search Index Batch Store
//!
//! Script-conditional realization of [`BatchStore`] over an
//! Elasticsearch/OpenSearch-style REST API. Each tenant has its own
//! `{tenant}-batches` index and a batch is a document keyed by its id.
//!
//! Conditional updates are sent as a painless `_update` script:
//!
//! ```text
//! if (params.requiredStatuses.contains(ctx._source.status)
//!     && ctx._source.integratorId == params.integratorId) {
//!   ctx._source.previousStatus = ctx._source.status;
//!   ctx._source.status = params.status; ...
//! } else {
//!   ctx.op = 'none';
//! }
//! ```
//!
//! The index evaluates the predicate and writes under the document's
//! version lock, so the response `result` is the CAS signal: `updated`
//! maps to `Applied`, `noop` to `NoOp`. Any other marker is surfaced as
//! `UnexpectedResult` carrying the raw body. The replaced status is kept in
//! the document as `previousStatus` so the applied response can report it.
//!
//! Compensating reverts use the same mechanism with a one-line script that
//! only writes while the document still holds the status being undone.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, instrument, warn};

use super::{BatchStore, ConditionalUpdate, StatusWrite, StoreError, StoreResult, UpdateOutcome};
use crate::config::SearchIndexConfig;
use crate::models::{Batch, BatchChanges};
use crate::state_machine::states::BatchStatus;

const RESULT_UPDATED: &str = "updated";
const RESULT_NOOP: &str = "noop";
const PREVIOUS_STATUS_FIELD: &str = "previousStatus";

/// Index holding one tenant's batches
pub fn index_name(tenant_id: &str) -> String {
    format!("{tenant_id}-batches")
}

/// Painless script for a conditional update.
///
/// Every assignment reads from `params`, so the script source only depends
/// on which fields are set and stays cacheable on the server.
pub fn build_update_script(update: &ConditionalUpdate) -> StoreResult<Value> {
    let mut predicate = String::from("params.requiredStatuses.contains(ctx._source.status)");
    if update.owner.is_some() {
        predicate.push_str(" && ctx._source.integratorId == params.integratorId");
    }

    let mut assignments = String::from("ctx._source.previousStatus = ctx._source.status; ");
    for field in update.changes.assigned_fields() {
        assignments.push_str(&format!("ctx._source.{field} = params.{field}; "));
    }

    let source = format!("if ({predicate}) {{ {assignments}}} else {{ ctx.op = 'none' }}");

    let mut params = change_params(&update.changes)?;
    params.insert(
        "requiredStatuses".to_string(),
        json!(update.required_status_tokens()),
    );
    if let Some(owner) = &update.owner {
        params.insert("integratorId".to_string(), json!(owner));
    }

    Ok(json!({
        "script": {
            "lang": "painless",
            "source": source,
            "params": params,
        }
    }))
}

/// Painless script for a compensating revert: only a document still in
/// `from` is set back to `to`.
pub fn build_revert_script(from: BatchStatus, to: BatchStatus) -> Value {
    json!({
        "script": {
            "lang": "painless",
            "source": "if (ctx._source.status == params.from) \
                       { ctx._source.status = params.to } else { ctx.op = 'none' }",
            "params": { "from": from.as_str(), "to": to.as_str() },
        }
    })
}

fn change_params(changes: &BatchChanges) -> StoreResult<Map<String, Value>> {
    let mut params = match serde_json::to_value(changes)? {
        Value::Object(map) => map,
        other => {
            return Err(StoreError::serialization(format!(
                "change set serialized to {other}"
            )))
        }
    };
    // recordCount mirrors expectedRecordCount
    if let Some(expected) = changes.expected_record_count {
        params.insert("recordCount".to_string(), json!(expected));
    }
    Ok(params)
}

#[derive(Debug, Deserialize)]
struct UpdateResponse {
    result: Option<String>,
    get: Option<GetResult>,
}

#[derive(Debug, Deserialize)]
struct GetResult {
    #[serde(rename = "_source")]
    source: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct DocResponse {
    #[serde(default)]
    found: bool,
    #[serde(rename = "_source")]
    source: Option<Value>,
}

/// Decode a stored document, filling `id` from the document key when the
/// source does not carry it.
fn source_to_batch(batch_id: &str, source: Value) -> StoreResult<Batch> {
    let mut source = match source {
        Value::Object(map) => map,
        other => return Err(StoreError::protocol(format!("document source is {other}"))),
    };
    source
        .entry("id")
        .or_insert_with(|| Value::String(batch_id.to_string()));
    Ok(serde_json::from_value(Value::Object(source))?)
}

/// reqwest-backed batch store
#[derive(Debug, Clone)]
pub struct SearchIndexBatchStore {
    client: Client,
    base_url: Url,
    username: Option<String>,
    password: Option<String>,
    refresh: String,
}

impl SearchIndexBatchStore {
    pub fn new(config: &SearchIndexConfig) -> StoreResult<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| StoreError::protocol(format!("Invalid search index URL: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::protocol(format!(
                "Invalid search index URL: {}",
                config.base_url
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .user_agent(format!("batchline/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StoreError::transport("client", e.to_string()))?;

        debug!(base_url = %config.base_url, refresh = %config.refresh, "Created search index store");

        Ok(Self {
            client,
            base_url,
            username: config.username.clone(),
            password: config.password.clone(),
            refresh: config.refresh.clone(),
        })
    }

    fn url(&self, tenant_id: &str, segments: &[&str]) -> StoreResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::protocol("search index URL cannot be a base"))?
            .pop_if_empty()
            .push(&index_name(tenant_id))
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.username {
            Some(username) => request.basic_auth(username, self.password.as_deref()),
            None => request,
        }
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> StoreResult<Response> {
        self.authorized(request)
            .send()
            .await
            .map_err(|e| StoreError::transport(operation, e.to_string()))
    }

    async fn body_text(operation: &str, response: Response) -> StoreResult<String> {
        response
            .text()
            .await
            .map_err(|e| StoreError::transport(operation, e.to_string()))
    }

    /// Turn a non-success status into a transport error carrying the body
    async fn failure(operation: &str, response: Response) -> StoreError {
        let status = response.status();
        let body = Self::body_text(operation, response).await.unwrap_or_default();
        StoreError::transport(operation, format!("HTTP {status}: {body}"))
    }

    async fn fetch(&self, tenant_id: &str, batch_id: &str) -> StoreResult<Option<Batch>> {
        let url = self.url(tenant_id, &["_doc", batch_id])?;
        let response = self.send("get", self.client.get(url)).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let text = Self::body_text("get", response).await?;
                let doc: DocResponse = serde_json::from_str(&text)?;
                match (doc.found, doc.source) {
                    (true, Some(source)) => Ok(Some(source_to_batch(batch_id, source)?)),
                    _ => Ok(None),
                }
            }
            _ => Err(Self::failure("get", response).await),
        }
    }
}

#[async_trait]
impl BatchStore for SearchIndexBatchStore {
    #[instrument(skip(self, update), fields(tenant_id = %update.tenant_id, batch_id = %update.batch_id))]
    async fn apply_conditional(&self, update: &ConditionalUpdate) -> StoreResult<UpdateOutcome> {
        let body = build_update_script(update)?;
        let mut url = self.url(&update.tenant_id, &["_update", &update.batch_id])?;
        url.query_pairs_mut()
            .append_pair("_source", "true")
            .append_pair("refresh", &self.refresh);

        let response = self
            .send("update", self.client.post(url).json(&body))
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::not_found(&update.tenant_id, &update.batch_id));
        }
        if !status.is_success() {
            return Err(Self::failure("update", response).await);
        }

        let raw = Self::body_text("update", response).await?;
        let parsed: UpdateResponse = serde_json::from_str(&raw)
            .map_err(|_| StoreError::UnexpectedResult { raw: raw.clone() })?;
        let source = parsed.get.and_then(|get| get.source);

        match parsed.result.as_deref() {
            Some(RESULT_UPDATED) => {
                let previous_status = source
                    .as_ref()
                    .and_then(|source| source.get(PREVIOUS_STATUS_FIELD))
                    .and_then(Value::as_str)
                    .map(BatchStatus::from_stored);
                match (previous_status, source) {
                    (Some(previous_status), Some(source)) => Ok(UpdateOutcome::Applied {
                        previous_status,
                        batch: source_to_batch(&update.batch_id, source)?,
                    }),
                    _ => Err(StoreError::UnexpectedResult { raw }),
                }
            }
            Some(RESULT_NOOP) => {
                let current = match source {
                    Some(source) => source_to_batch(&update.batch_id, source)?,
                    None => self
                        .fetch(&update.tenant_id, &update.batch_id)
                        .await?
                        .ok_or_else(|| {
                            StoreError::not_found(&update.tenant_id, &update.batch_id)
                        })?,
                };
                Ok(UpdateOutcome::NoOp(current))
            }
            _ => {
                warn!(raw = %raw, "Unrecognized update result");
                Err(StoreError::UnexpectedResult { raw })
            }
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
        let mut url = self.url(tenant_id, &["_update", batch_id])?;
        url.query_pairs_mut()
            .append_pair("_source", "true")
            .append_pair("refresh", &self.refresh);
        let body = build_revert_script(from, to);

        let response = self
            .send("revert_status", self.client.post(url).json(&body))
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => return Ok(StatusWrite::Missing),
            s if s.is_success() => {}
            _ => return Err(Self::failure("revert_status", response).await),
        }

        let raw = Self::body_text("revert_status", response).await?;
        let parsed: UpdateResponse = serde_json::from_str(&raw)
            .map_err(|_| StoreError::UnexpectedResult { raw: raw.clone() })?;

        match parsed.result.as_deref() {
            Some(RESULT_UPDATED) => Ok(StatusWrite::Written),
            Some(RESULT_NOOP) => {
                let current = match parsed.get.and_then(|get| get.source) {
                    Some(source) => Some(source_to_batch(batch_id, source)?),
                    None => self.fetch(tenant_id, batch_id).await?,
                };
                Ok(current.map_or(StatusWrite::Missing, |batch| {
                    StatusWrite::Superseded(batch.status)
                }))
            }
            _ => Err(StoreError::UnexpectedResult { raw }),
        }
    }

    async fn get_batch(&self, tenant_id: &str, batch_id: &str) -> StoreResult<Option<Batch>> {
        self.fetch(tenant_id, batch_id).await
    }

    async fn insert_batch(&self, batch: &Batch) -> StoreResult<()> {
        let mut url = self.url(&batch.tenant_id, &["_doc", &batch.id])?;
        url.query_pairs_mut()
            .append_pair("op_type", "create")
            .append_pair("refresh", &self.refresh);

        let response = self.send("insert", self.client.put(url).json(batch)).await?;
        match response.status() {
            StatusCode::CONFLICT => Err(StoreError::AlreadyExists {
                tenant_id: batch.tenant_id.clone(),
                batch_id: batch.id.clone(),
            }),
            s if s.is_success() => Ok(()),
            _ => Err(Self::failure("insert", response).await),
        }
    }

    async fn delete_batch(&self, tenant_id: &str, batch_id: &str) -> StoreResult<bool> {
        let mut url = self.url(tenant_id, &["_doc", batch_id])?;
        url.query_pairs_mut().append_pair("refresh", &self.refresh);

        let response = self.send("delete", self.client.delete(url)).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            _ => Err(Self::failure("delete", response).await),
        }
    }

    fn provider_name(&self) -> &'static str {
        "search_index"
    }
}
