//! Wire types for the local model runtime.
//!
//! These mirror Ollama's native API (`/api/chat`, `/api/generate`,
//! `/api/embed`), used for both request building and response parsing.

use serde::{Deserialize, Serialize};

// ─── Messages ────────────────────────────────────────────────────────────────

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single message in a chat request or response.
///
/// Serialization notes for local runtimes:
/// - `images` carries base64-encoded attachments for vision models and is
///   omitted entirely for text-only messages.
/// - Assistant messages echo their `tool_calls` back on the next round so the
///   model can associate tool results with the calls that produced them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Base64-encoded images (vision models only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    /// Tool calls carried by assistant messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallPayload>>,
    /// For `tool` role messages: which tool produced this result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// A user message with a base64-encoded image attachment.
    pub fn user_with_image(content: impl Into<String>, image_base64: String) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            images: Some(vec![image_base64]),
            tool_calls: None,
            tool_name: None,
        }
    }

    /// A tool-result message fed back into the conversation.
    pub fn tool(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            images: None,
            tool_calls: None,
            tool_name: Some(tool_name.into()),
        }
    }

    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            images: None,
            tool_calls: None,
            tool_name: None,
        }
    }
}

// ─── Tool Declarations ───────────────────────────────────────────────────────

/// Tool declaration sent with a tool-calling request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub r#type: String,
    pub function: FunctionDefinition,
}

/// Function schema within a tool declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema object: `{type, properties, required}`.
    pub parameters: serde_json::Value,
}

// ─── Tool Calls ──────────────────────────────────────────────────────────────

/// Tool call as it appears on the wire (request echo and response).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallPayload {
    pub function: FunctionCall,
}

/// Function invocation details within a wire tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// Structured arguments (the runtime parses them model-side).
    pub arguments: serde_json::Value,
}

/// A parsed tool call extracted from a model response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique ID for this call (generated — the runtime doesn't provide one).
    pub id: String,
    /// Tool name, e.g. `"search_files"`.
    pub name: String,
    /// JSON arguments.
    pub arguments: serde_json::Value,
}

impl ToolCall {
    /// Convert back to the wire representation for assistant-message echo.
    pub fn to_payload(&self) -> ToolCallPayload {
        ToolCallPayload {
            function: FunctionCall {
                name: self.name.clone(),
                arguments: self.arguments.clone(),
            },
        }
    }
}

// ─── Sampling ────────────────────────────────────────────────────────────────

/// Sampling options for a single inference call.
///
/// Maps to Ollama's `options` object. Lower temperature for tool-calling and
/// constrained one-shot turns, higher for conversational turns.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SamplingOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Stop sequences — generation halts when one is produced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    /// Maximum tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<i32>,
}

// ─── Request Bodies ──────────────────────────────────────────────────────────

/// Request body for `POST /api/chat`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<SamplingOptions>,
}

/// Request body for `POST /api/generate`.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<SamplingOptions>,
}

/// Request body for `POST /api/embed`.
#[derive(Debug, Clone, Serialize)]
pub struct EmbedRequest {
    pub model: String,
    pub input: Vec<String>,
}

// ─── Response Bodies ─────────────────────────────────────────────────────────

/// One chat response object — a streamed NDJSON line or a full non-streaming
/// body (same shape either way).
#[derive(Debug, Clone, Deserialize)]
pub struct ChatChunk {
    #[serde(default)]
    pub message: Option<ChunkMessage>,
    #[serde(default)]
    pub done: bool,
}

/// The message portion of a chat response.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkMessage {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallPayload>>,
}

/// Response body for `POST /api/generate` (non-streaming).
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse {
    pub response: String,
}

/// Response body for `POST /api/embed`.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbedResponse {
    pub embeddings: Vec<Vec<f32>>,
}

/// Parsed result of a non-streaming tool-calling chat call: final text,
/// tool calls, or both.
#[derive(Debug, Clone, Default)]
pub struct ChatOutcome {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), r#""assistant""#);
        assert_eq!(serde_json::to_string(&Role::Tool).unwrap(), r#""tool""#);
    }

    #[test]
    fn plain_message_omits_optional_fields() {
        let msg = ChatMessage::user("hello");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("images"));
        assert!(!json.contains("tool_calls"));
        assert!(!json.contains("tool_name"));
    }

    #[test]
    fn image_message_carries_images_array() {
        let msg = ChatMessage::user_with_image("describe", "QUJD".to_string());
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""images":["QUJD"]"#));
    }

    #[test]
    fn tool_message_carries_tool_name() {
        let msg = ChatMessage::tool("search_files", "1. a.txt:1:match");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""role":"tool""#));
        assert!(json.contains(r#""tool_name":"search_files""#));
    }

    #[test]
    fn sampling_options_omitted_when_unset() {
        let req = GenerateRequest {
            model: "m".into(),
            prompt: "p".into(),
            stream: false,
            options: None,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("options"));
    }

    #[test]
    fn sampling_options_serialize_stop_and_budget() {
        let opts = SamplingOptions {
            temperature: Some(0.0),
            stop: Some(vec!["\n".into(), "Input:".into()]),
            num_predict: Some(15),
            ..Default::default()
        };
        let json = serde_json::to_string(&opts).unwrap();
        assert!(json.contains(r#""num_predict":15"#));
        assert!(json.contains("Input:"));
        assert!(!json.contains("top_p"));
    }

    #[test]
    fn chat_chunk_parses_tool_calls() {
        let raw = r#"{"message":{"role":"assistant","content":"","tool_calls":[{"function":{"name":"find_files","arguments":{"name_pattern":"*.rs"}}}]},"done":true}"#;
        let chunk: ChatChunk = serde_json::from_str(raw).unwrap();
        let calls = chunk.message.unwrap().tool_calls.unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function.name, "find_files");
        assert_eq!(calls[0].function.arguments["name_pattern"], "*.rs");
    }

    #[test]
    fn tool_call_round_trips_to_payload() {
        let call = ToolCall {
            id: "call_1".into(),
            name: "search_files".into(),
            arguments: serde_json::json!({"pattern": "fn main"}),
        };
        let payload = call.to_payload();
        assert_eq!(payload.function.name, "search_files");
        assert_eq!(payload.function.arguments["pattern"], "fn main");
    }
}
