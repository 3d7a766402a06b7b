//! Shared types for the orchestration core.
//!
//! Conversation turns, the per-run request snapshot, the event stream
//! vocabulary, and the run-scoped mutable state.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::config::Settings;
use crate::inference::types::{Role, ToolCall};

// ─── Turns & Conversation ───────────────────────────────────────────────────

/// One exchange unit in a conversation transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    /// Image attached to a user turn, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<PathBuf>,
    /// Tool calls carried by an assistant turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// For `tool` turns: which tool produced this result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn user_with_image(content: impl Into<String>, image_path: PathBuf) -> Self {
        Self {
            image_path: Some(image_path),
            ..Self::plain(Role::User, content)
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    pub fn tool(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_name: Some(tool_name.into()),
            ..Self::plain(Role::Tool, content)
        }
    }

    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            image_path: None,
            tool_calls: None,
            tool_name: None,
        }
    }
}

/// An ordered transcript. The first turn is always the system prompt.
///
/// Append-only during a session; `reset` is the single sanctioned
/// replacement (a fresh chat). The orchestrator never mutates this — the
/// caller appends the user turn before a run and the assistant turn after
/// its terminal event.
#[derive(Debug, Clone)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    /// Start a conversation seeded with the system prompt.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::system(system_prompt)],
        }
    }

    /// Replace the transcript with a single fresh system turn.
    pub fn reset(&mut self, system_prompt: impl Into<String>) {
        self.turns = vec![Turn::system(system_prompt)];
    }

    /// Update the system prompt — only while the transcript holds nothing
    /// but the system turn. Once the exchange has started the prompt is
    /// fixed for the session.
    pub fn update_system_prompt(&mut self, system_prompt: impl Into<String>) {
        if self.turns.len() == 1 && self.turns[0].role == Role::System {
            self.turns[0].content = system_prompt.into();
        }
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::user(content));
    }

    pub fn push_user_with_image(&mut self, content: impl Into<String>, image_path: PathBuf) {
        self.turns.push(Turn::user_with_image(content, image_path));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::assistant(content));
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

// ─── GenerationRequest ──────────────────────────────────────────────────────

/// The generation strategy selected for a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Vision model inference on an attached image.
    Vision,
    /// Web-search retrieval-augmented generation.
    WebSearch,
    /// Tool-augmented chat (the agent loop).
    ToolChat,
}

/// Immutable snapshot of everything one run needs, taken at dispatch time.
///
/// Build it after the caller has appended the new user turn — `transcript`
/// must include it. Owned exclusively by one in-flight run.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub main_model: String,
    pub vision_model: String,
    pub system_prompt: String,
    pub transcript: Vec<Turn>,
    pub user_text: String,
    pub image_path: Option<PathBuf>,
    pub web_search: bool,
}

impl GenerationRequest {
    pub fn new(
        settings: &Settings,
        conversation: &Conversation,
        user_text: impl Into<String>,
        image_path: Option<PathBuf>,
        web_search: bool,
    ) -> Self {
        Self {
            main_model: settings.main_model.clone(),
            vision_model: settings.vision_model.clone(),
            system_prompt: settings.system_prompt.clone(),
            transcript: conversation.turns().to_vec(),
            user_text: user_text.into(),
            image_path,
            web_search,
        }
    }

    /// Select the strategy for this turn. An attached image always wins;
    /// web search applies only to non-empty text.
    pub fn strategy(&self) -> Strategy {
        if self.image_path.is_some() {
            Strategy::Vision
        } else if self.web_search && !self.user_text.trim().is_empty() {
            Strategy::WebSearch
        } else {
            Strategy::ToolChat
        }
    }
}

// ─── Run Events ─────────────────────────────────────────────────────────────

/// How a run ended. Every run produces exactly one of these.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The strategy ran to completion.
    Completed {
        /// The full response text (concatenation of all token events).
        response: String,
        /// Number of streamed fragments.
        token_count: u64,
        /// Wall-clock duration of the run.
        duration_secs: f64,
    },
    /// Cancellation was acknowledged at a checkpoint. The partial buffer is
    /// still a valid assistant turn for the caller to append.
    Stopped { partial: String },
    /// A provider fault ended the run. The inline error text has already
    /// been streamed and is included in `partial`.
    Errored { message: String, partial: String },
}

/// Events published by a run, delivered in strict emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// An incremental response fragment.
    Token(String),
    /// A progress label ("Searching...", "Calling search_files...").
    /// An empty label clears the previous one.
    Status(String),
    /// The run's single terminal event. Nothing follows it.
    Terminal(RunOutcome),
}

// ─── RunState ───────────────────────────────────────────────────────────────

/// Per-run mutable state: the response buffer, the fragment counter, the
/// cooperative stop flag, and the event sender. Owned by the active run and
/// destroyed when it terminates.
pub(crate) struct RunState {
    tx: UnboundedSender<RunEvent>,
    stop: Arc<AtomicBool>,
    buffer: String,
    token_count: u64,
    started: Instant,
}

impl RunState {
    pub(crate) fn new(tx: UnboundedSender<RunEvent>, stop: Arc<AtomicBool>) -> Self {
        Self {
            tx,
            stop,
            buffer: String::new(),
            token_count: 0,
            started: Instant::now(),
        }
    }

    /// Append a fragment to the buffer and publish it.
    pub(crate) fn emit_token(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.buffer.push_str(text);
        self.token_count += 1;
        let _ = self.tx.send(RunEvent::Token(text.to_string()));
    }

    /// Publish a status label.
    pub(crate) fn emit_status(&self, label: &str) {
        let _ = self.tx.send(RunEvent::Status(label.to_string()));
    }

    /// Publish the terminal event.
    pub(crate) fn emit_terminal(&self, outcome: RunOutcome) {
        let _ = self.tx.send(RunEvent::Terminal(outcome));
    }

    /// Whether cancellation has been requested.
    pub(crate) fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// The raw stop flag, for collaborators that observe it between steps.
    pub(crate) fn stop_flag(&self) -> &AtomicBool {
        &self.stop
    }

    pub(crate) fn completed(&self) -> RunOutcome {
        RunOutcome::Completed {
            response: self.buffer.clone(),
            token_count: self.token_count,
            duration_secs: self.started.elapsed().as_secs_f64(),
        }
    }

    pub(crate) fn stopped(&self) -> RunOutcome {
        RunOutcome::Stopped {
            partial: self.buffer.clone(),
        }
    }

    /// Stream the inline error text, then build the fault outcome. The
    /// buffer (error text included) remains valid partial output.
    pub(crate) fn errored(&mut self, message: impl Into<String>) -> RunOutcome {
        let message = message.into();
        self.emit_token(&format!("\n\n**Error:** {message}"));
        RunOutcome::Errored {
            message,
            partial: self.buffer.clone(),
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
