// Batch status state machine
//
// Statuses, caller actions and the per-action transition rules. Applying a
// transition is the orchestration layer's job; this module only describes
// what is legal.

pub mod events;
pub mod guards;
pub mod rules;
pub mod states;

// Re-export main types for convenient access
pub use events::{
    FailPayload, ProcessingCompletePayload, SendCompletePayload, StatusUpdate, TerminatePayload,
    TransitionAction, TransitionRequest,
};
pub use rules::TransitionRule;
pub use states::BatchStatus;
