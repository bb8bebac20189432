pub mod batch;

// Re-export core models for easy access
pub use batch::{normalize_invalid_threshold, Batch, BatchChanges, NewBatch, INVALID_THRESHOLD_UNSET};
