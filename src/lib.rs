//! Deskmate — local-first desktop chat assistant core.
//!
//! The inference orchestration layer behind a desktop chat front end: per
//! user turn it selects one generation strategy (tool-augmented chat,
//! web-search grounding, or vision), runs it on a background task against a
//! local model runtime, streams ordered token/status events to the caller,
//! and honors cooperative cancellation. The presentation layer, the model
//! runtime, and the settings store stay on the other side of narrow
//! interfaces.

pub mod config;
pub mod inference;
pub mod orchestrator;
pub mod retrieval;
pub mod tools;

pub use config::Settings;
pub use inference::{GenerationService, InferenceError, OllamaClient};
pub use orchestrator::{
    Conversation, GenerationRequest, OrchestratorError, RunEvent, RunHandle, RunOutcome,
    TurnOrchestrator,
};

/// Initialize the tracing subscriber for embedders that don't bring their
/// own. Honors `RUST_LOG`; defaults to info-level crate logs.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("deskmate=info,warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
