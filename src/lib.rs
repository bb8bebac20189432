#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Batchline Core
//!
//! Status lifecycle for ingestion batches: a data integrator opens a batch,
//! sends records, and declares the send complete; internal processing then
//! completes or fails it.
//!
//! ## Transition Protocol
//!
//! Every status change runs the same three steps:
//!
//! 1. **Conditional update** of the record store, matching the legal source
//!    statuses and, for integrator actions, the owner
//! 2. **Notification** of the updated record to the batch's notification topic
//! 3. **Compensation** when the notification cannot be published: the status
//!    is reverted with bounded retries and the caller sees a publish failure
//!
//! Concurrent requests for the same batch are resolved by the store's
//! compare-and-swap; exactly one wins, the others get a conflict.
//!
//! ## Module Organization
//!
//! - [`state_machine`] - Statuses, actions and per-action transition rules
//! - [`store`] - Record store trait plus Postgres, search-index and in-memory backends
//! - [`messaging`] - Notification bus trait plus pgmq and in-memory providers
//! - [`orchestration`] - Transition service, compensator and bootstrap
//! - [`auth`] - Caller principal, roles and tenant scopes
//! - [`config`] - Layered configuration loading
//! - [`error`] - Caller-facing errors and result codes
//! - [`logging`] - Structured logging setup and outcome records
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use batchline_core::config::ConfigLoader;
//! use batchline_core::orchestration::bootstrap;
//! use batchline_core::{Principal, Role, StatusUpdate, TransitionRequest};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::load()?;
//! let service = bootstrap(&config).await?;
//!
//! let principal = Principal::new("integrator-1")
//!     .with_role(Role::DataIntegrator)
//!     .with_tenant("1234");
//! let request = TransitionRequest::from_action("terminate", json!({}))?;
//! let batch = service
//!     .transition(&principal, StatusUpdate::new("1234", "batch-1", request))
//!     .await?;
//! println!("batch {} is now {}", batch.id, batch.status);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod orchestration;
pub mod state_machine;
pub mod store;

pub use auth::{Principal, Role};
pub use config::{BatchlineConfig, ConfigLoader};
pub use error::{ErrorResponse, TransitionError, TransitionResult};
pub use models::{Batch, NewBatch};
pub use orchestration::{bootstrap, BatchTransitionService, CompensationOutcome};
pub use state_machine::{BatchStatus, StatusUpdate, TransitionAction, TransitionRequest};
