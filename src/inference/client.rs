//! Client for the local model runtime.
//!
//! Speaks Ollama's native API: streaming chat (`/api/chat`), non-streaming
//! tool-calling chat, single-shot constrained generation (`/api/generate`),
//! and embeddings (`/api/embed`). The orchestrator consumes it through the
//! [`GenerationService`] trait so tests can substitute a scripted fake.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::Client as HttpClient;
use uuid::Uuid;

use super::errors::InferenceError;
use super::streaming::parse_chat_stream;
use super::types::{
    ChatChunk, ChatMessage, ChatOutcome, ChatRequest, EmbedRequest, EmbedResponse,
    GenerateRequest, GenerateResponse, SamplingOptions, ToolCall, ToolDefinition,
};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Total request timeout for non-streaming calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Total request timeout for streaming calls.
///
/// Streaming responses from local models can take a long time when the
/// context is large — the model processes the full prompt before the first
/// token appears. A short timeout here terminates the stream silently, which
/// looks like an empty response to the caller.
const STREAM_REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

// ─── GenerationService ───────────────────────────────────────────────────────

/// An opaque streaming text-generation capability.
///
/// The orchestrator only depends on this trait; [`OllamaClient`] is the
/// production implementation.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Streaming chat: yields incremental content fragments in order.
    async fn chat_stream(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        options: Option<SamplingOptions>,
    ) -> Result<BoxStream<'static, Result<String, InferenceError>>, InferenceError>;

    /// Non-streaming chat with tool declarations: returns one message
    /// carrying final text and/or structured tool calls.
    async fn chat_with_tools(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        tools: Vec<ToolDefinition>,
        options: Option<SamplingOptions>,
    ) -> Result<ChatOutcome, InferenceError>;

    /// Single-shot completion honoring temperature / stop sequences / token
    /// budget. Used for constrained calls (query rewrite, relevance judging).
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: Option<SamplingOptions>,
    ) -> Result<String, InferenceError>;

    /// Embed a batch of texts. One vector per input, in input order.
    async fn embed(&self, model: &str, inputs: &[String])
        -> Result<Vec<Vec<f32>>, InferenceError>;
}

// ─── OllamaClient ────────────────────────────────────────────────────────────

/// HTTP client for a local Ollama-compatible runtime.
pub struct OllamaClient {
    /// Client for non-streaming requests.
    http: HttpClient,
    /// Client for streaming requests (longer timeout).
    http_stream: HttpClient,
    /// Endpoint base, e.g. `http://localhost:11434`.
    base_url: String,
}

impl OllamaClient {
    /// Create a client for the given endpoint base URL.
    ///
    /// Does NOT check connectivity — that happens on the first request.
    pub fn new(base_url: impl Into<String>) -> Result<Self, InferenceError> {
        let base_url = base_url.into();

        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        let http_stream = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(STREAM_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: base_url.clone(),
                reason: format!("failed to build streaming HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            http_stream,
            base_url,
        })
    }

    /// The endpoint base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check whether the runtime endpoint is reachable.
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.http.get(&url).timeout(CONNECT_TIMEOUT).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// Map a reqwest transport error into the inference taxonomy.
    fn transport_error(url: &str, e: reqwest::Error, timeout: Duration) -> InferenceError {
        if e.is_timeout() {
            InferenceError::Timeout {
                duration_secs: timeout.as_secs(),
            }
        } else {
            InferenceError::ConnectionFailed {
                endpoint: url.to_string(),
                reason: e.to_string(),
            }
        }
    }

    /// Convert a non-success response into an `HttpError` with its body.
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, InferenceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(InferenceError::HttpError {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl GenerationService for OllamaClient {
    async fn chat_stream(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        options: Option<SamplingOptions>,
    ) -> Result<BoxStream<'static, Result<String, InferenceError>>, InferenceError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest {
            model: model.to_string(),
            messages,
            stream: true,
            tools: None,
            options,
        };

        tracing::info!(
            url = %url,
            model = %body.model,
            message_count = body.messages.len(),
            stream = true,
            "chat request"
        );

        let response = self
            .http_stream
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::transport_error(&url, e, STREAM_REQUEST_TIMEOUT))?;

        let response = Self::check_status(response).await?;
        Ok(parse_chat_stream(response).boxed())
    }

    async fn chat_with_tools(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        tools: Vec<ToolDefinition>,
        options: Option<SamplingOptions>,
    ) -> Result<ChatOutcome, InferenceError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest {
            model: model.to_string(),
            messages,
            stream: false,
            tools: if tools.is_empty() { None } else { Some(tools) },
            options,
        };

        tracing::info!(
            url = %url,
            model = %body.model,
            message_count = body.messages.len(),
            tool_count = body.tools.as_ref().map(|t| t.len()).unwrap_or(0),
            stream = false,
            "chat request"
        );

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::transport_error(&url, e, REQUEST_TIMEOUT))?;

        let response = Self::check_status(response).await?;
        let body_text = response
            .text()
            .await
            .map_err(|e| InferenceError::StreamError {
                reason: format!("failed to read response body: {e}"),
            })?;

        parse_chat_response(&body_text)
    }

    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: Option<SamplingOptions>,
    ) -> Result<String, InferenceError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            stream: false,
            options,
        };

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::transport_error(&url, e, REQUEST_TIMEOUT))?;

        let response = Self::check_status(response).await?;
        let parsed: GenerateResponse =
            response.json().await.map_err(|e| InferenceError::StreamError {
                reason: format!("failed to parse generate response: {e}"),
            })?;

        Ok(parsed.response)
    }

    async fn embed(
        &self,
        model: &str,
        inputs: &[String],
    ) -> Result<Vec<Vec<f32>>, InferenceError> {
        let url = format!("{}/api/embed", self.base_url);
        let body = EmbedRequest {
            model: model.to_string(),
            input: inputs.to_vec(),
        };

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::transport_error(&url, e, REQUEST_TIMEOUT))?;

        let response = Self::check_status(response).await?;
        let parsed: EmbedResponse =
            response.json().await.map_err(|e| InferenceError::StreamError {
                reason: format!("failed to parse embed response: {e}"),
            })?;

        if parsed.embeddings.len() != inputs.len() {
            return Err(InferenceError::EmptyResponse {
                what: format!(
                    "{} embeddings for {} inputs",
                    parsed.embeddings.len(),
                    inputs.len()
                ),
            });
        }

        Ok(parsed.embeddings)
    }
}

// ─── Response Parsing ────────────────────────────────────────────────────────

/// Parse a non-streaming chat response body into a `ChatOutcome`.
///
/// Tool calls get generated ids — the runtime doesn't assign any.
fn parse_chat_response(body: &str) -> Result<ChatOutcome, InferenceError> {
    let chunk: ChatChunk =
        serde_json::from_str(body).map_err(|e| InferenceError::StreamError {
            reason: format!("failed to parse chat response: {e}"),
        })?;

    let message = chunk.message.ok_or_else(|| InferenceError::EmptyResponse {
        what: "chat response carried no message".to_string(),
    })?;

    let tool_calls = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|payload| ToolCall {
            id: format!("call_{}", Uuid::new_v4()),
            name: payload.function.name,
            arguments: payload.function.arguments,
        })
        .collect();

    Ok(ChatOutcome {
        content: message.content,
        tool_calls,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_builds_for_default_endpoint() {
        let client = OllamaClient::new("http://localhost:11434").unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[test]
    fn parse_chat_response_text_only() {
        let body = r#"{"message":{"role":"assistant","content":"Hi there"},"done":true}"#;
        let outcome = parse_chat_response(body).unwrap();
        assert_eq!(outcome.content, "Hi there");
        assert!(outcome.tool_calls.is_empty());
    }

    #[test]
    fn parse_chat_response_with_tool_calls() {
        let body = r#"{"message":{"role":"assistant","content":"","tool_calls":[{"function":{"name":"search_files","arguments":{"pattern":"TODO"}}}]},"done":true}"#;
        let outcome = parse_chat_response(body).unwrap();
        assert!(outcome.content.is_empty());
        assert_eq!(outcome.tool_calls.len(), 1);
        assert_eq!(outcome.tool_calls[0].name, "search_files");
        assert_eq!(outcome.tool_calls[0].arguments["pattern"], "TODO");
        assert!(outcome.tool_calls[0].id.starts_with("call_"));
    }

    #[test]
    fn parse_chat_response_without_message_is_empty_response() {
        let err = parse_chat_response(r#"{"done":true}"#).unwrap_err();
        assert!(matches!(err, InferenceError::EmptyResponse { .. }));
    }

    #[test]
    fn parse_chat_response_rejects_malformed_body() {
        let err = parse_chat_response("<html>").unwrap_err();
        assert!(matches!(err, InferenceError::StreamError { .. }));
    }
}
