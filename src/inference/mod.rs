//! Inference — client for the local model runtime.
//!
//! This module handles all communication with the model endpoint:
//! - Streaming and non-streaming chat (`/api/chat`)
//! - Constrained single-shot generation (`/api/generate`)
//! - Batch embeddings (`/api/embed`)
//! - NDJSON stream parsing
//!
//! The orchestrator depends on the [`GenerationService`] trait, not the
//! concrete client, so the runtime stays an opaque, swappable collaborator.

pub mod client;
pub mod errors;
pub mod streaming;
pub mod types;

// Re-exports for convenience
pub use client::{GenerationService, OllamaClient};
pub use errors::InferenceError;
pub use types::{
    ChatMessage, ChatOutcome, Role, SamplingOptions, ToolCall, ToolDefinition,
};

/// Scripted in-process stand-in for the model runtime, shared by the
/// orchestrator and retrieval test modules.
#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use futures::stream::{self, BoxStream, StreamExt};

    use super::client::GenerationService;
    use super::errors::InferenceError;
    use super::types::{ChatMessage, ChatOutcome, SamplingOptions, ToolDefinition};

    /// Queue-driven fake: each call pops the next scripted response.
    #[derive(Default)]
    pub(crate) struct ScriptedService {
        /// Responses for `chat_with_tools`, consumed front-to-back.
        pub chat_outcomes: Mutex<VecDeque<Result<ChatOutcome, InferenceError>>>,
        /// Returned (cloned) when `chat_outcomes` runs dry.
        pub chat_fallback: Mutex<Option<ChatOutcome>>,
        /// Responses for `generate`, consumed front-to-back. Empty queue
        /// means every call errors, which exercises caller fallbacks.
        pub generate_responses: Mutex<VecDeque<Result<String, InferenceError>>>,
        /// Fragment sequences for `chat_stream`, consumed front-to-back.
        pub stream_scripts: Mutex<VecDeque<Vec<String>>>,
        /// When set, `embed` fails.
        pub embed_fails: AtomicBool,
        /// Number of `chat_with_tools` dispatches observed.
        pub chat_calls: AtomicUsize,
        /// Message lists seen by `chat_stream`, for prompt assertions.
        pub stream_requests: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedService {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_chat(&self, outcome: ChatOutcome) {
            self.chat_outcomes.lock().unwrap().push_back(Ok(outcome));
        }

        pub fn push_generate(&self, text: &str) {
            self.generate_responses
                .lock()
                .unwrap()
                .push_back(Ok(text.to_string()));
        }

        pub fn push_stream(&self, fragments: &[&str]) {
            self.stream_scripts
                .lock()
                .unwrap()
                .push_back(fragments.iter().map(|s| s.to_string()).collect());
        }

        pub fn set_chat_fallback(&self, outcome: ChatOutcome) {
            *self.chat_fallback.lock().unwrap() = Some(outcome);
        }
    }

    /// Deterministic letter-frequency embedding: similar texts get similar
    /// vectors, which is enough for ranking assertions.
    fn embed_text(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; 27];
        for c in text.chars() {
            let lower = c.to_ascii_lowercase();
            if lower.is_ascii_lowercase() {
                vector[(lower as u8 - b'a') as usize] += 1.0;
            } else {
                vector[26] += 1.0;
            }
        }
        vector
    }

    #[async_trait]
    impl GenerationService for ScriptedService {
        async fn chat_stream(
            &self,
            _model: &str,
            messages: Vec<ChatMessage>,
            _options: Option<SamplingOptions>,
        ) -> Result<BoxStream<'static, Result<String, InferenceError>>, InferenceError>
        {
            self.stream_requests.lock().unwrap().push(messages);
            let fragments = self
                .stream_scripts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_default();
            Ok(stream::iter(fragments.into_iter().map(Ok)).boxed())
        }

        async fn chat_with_tools(
            &self,
            _model: &str,
            _messages: Vec<ChatMessage>,
            _tools: Vec<ToolDefinition>,
            _options: Option<SamplingOptions>,
        ) -> Result<ChatOutcome, InferenceError> {
            self.chat_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(scripted) = self.chat_outcomes.lock().unwrap().pop_front() {
                return scripted;
            }
            if let Some(fallback) = self.chat_fallback.lock().unwrap().clone() {
                return Ok(fallback);
            }
            Ok(ChatOutcome::default())
        }

        async fn generate(
            &self,
            _model: &str,
            _prompt: &str,
            _options: Option<SamplingOptions>,
        ) -> Result<String, InferenceError> {
            self.generate_responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Err(InferenceError::StreamError {
                        reason: "no scripted generate response".to_string(),
                    })
                })
        }

        async fn embed(
            &self,
            _model: &str,
            inputs: &[String],
        ) -> Result<Vec<Vec<f32>>, InferenceError> {
            if self.embed_fails.load(Ordering::SeqCst) {
                return Err(InferenceError::ConnectionFailed {
                    endpoint: "scripted".to_string(),
                    reason: "embed disabled".to_string(),
                });
            }
            Ok(inputs.iter().map(|t| embed_text(t)).collect())
        }
    }
}
