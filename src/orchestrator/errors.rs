//! Orchestrator error types.

use thiserror::Error;

use crate::retrieval::RetrievalError;

/// Errors surfaced by the orchestration layer itself.
///
/// Faults inside a run never appear here — they terminate the run with an
/// `Errored` outcome on its event stream instead.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A run is already active for this conversation.
    #[error("a generation run is already active")]
    RunActive,

    /// A collaborator could not be constructed.
    #[error("orchestrator init failed: {reason}")]
    Init { reason: String },
}

impl From<RetrievalError> for OrchestratorError {
    fn from(e: RetrievalError) -> Self {
        OrchestratorError::Init {
            reason: e.to_string(),
        }
    }
}
