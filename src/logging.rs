//! # Structured Logging Module
//!
//! Environment-aware structured logging for batch status transitions.
//! `RUST_LOG` overrides the per-environment default level and
//! `BATCHLINE_LOG_FORMAT=json` switches console output to JSON lines.

use std::sync::OnceLock;

use chrono::Utc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));
        let json = use_json_format();

        let console = if json {
            fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(true)
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_filter(filter)
                .boxed()
        };

        // Use try_init to avoid panic if a global subscriber is already set
        if tracing_subscriber::registry().with(console).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized");
        }

        tracing::info!(
            environment = %environment,
            json,
            "Structured logging initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("BATCHLINE_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

fn use_json_format() -> bool {
    std::env::var("BATCHLINE_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Log the result of one transition request
pub fn log_transition_outcome(
    request_id: &str,
    tenant_id: &str,
    batch_id: &str,
    action: &str,
    outcome: &str,
    status_code: u16,
    details: Option<&str>,
) {
    if status_code >= 500 {
        tracing::error!(
            request_id = %request_id,
            tenant_id = %tenant_id,
            batch_id = %batch_id,
            action = %action,
            outcome = %outcome,
            status_code,
            details = details,
            timestamp = %Utc::now().to_rfc3339(),
            "BATCH_TRANSITION"
        );
    } else {
        tracing::info!(
            request_id = %request_id,
            tenant_id = %tenant_id,
            batch_id = %batch_id,
            action = %action,
            outcome = %outcome,
            status_code,
            details = details,
            timestamp = %Utc::now().to_rfc3339(),
            "BATCH_TRANSITION"
        );
    }
}

/// Log the result of a compensating write.
///
/// Exhaustion is an error: the store holds a transition that was never
/// announced, and these fields are what an operator needs to reconcile it.
/// A superseded revert found the batch already moved on by a later
/// transition and left it alone.
pub fn log_compensation_outcome(
    request_id: &str,
    tenant_id: &str,
    batch_id: &str,
    operation: &str,
    outcome: &str,
    attempts: u32,
    details: Option<&str>,
) {
    if outcome == "exhausted" {
        tracing::error!(
            request_id = %request_id,
            tenant_id = %tenant_id,
            batch_id = %batch_id,
            operation = %operation,
            outcome = %outcome,
            attempts,
            last_error = details,
            timestamp = %Utc::now().to_rfc3339(),
            "BATCH_COMPENSATION_EXHAUSTED"
        );
    } else {
        tracing::warn!(
            request_id = %request_id,
            tenant_id = %tenant_id,
            batch_id = %batch_id,
            operation = %operation,
            outcome = %outcome,
            attempts,
            details = details,
            timestamp = %Utc::now().to_rfc3339(),
            "BATCH_COMPENSATION"
        );
    }
}
