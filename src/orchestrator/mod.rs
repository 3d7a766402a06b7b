//! Orchestration core — one background generation run per user turn.
//!
//! Submodules:
//! - `types`: turns, the conversation transcript, request snapshots, run
//!   events, and run-scoped state
//! - `worker`: strategy selection and execution (agent loop, web-search
//!   grounding, vision), cancellation, event delivery
//! - `errors`: orchestrator-level error types

pub mod errors;
pub mod types;
pub mod worker;

// Re-exports for convenience
pub use errors::OrchestratorError;
pub use types::{Conversation, GenerationRequest, RunEvent, RunOutcome, Strategy, Turn};
pub use worker::{RunHandle, TurnOrchestrator};
