//! Turn orchestration: one background run per user turn.
//!
//! `TurnOrchestrator::start` snapshots the request, spawns the run on a
//! background task, and hands the caller a `RunHandle` carrying the event
//! stream and the cooperative stop flag. Each run drives exactly one of
//! three strategies — vision, web-search grounding, or the tool-augmented
//! agent loop — and always ends with exactly one terminal event.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::StreamExt;
use tokio::sync::mpsc::{self, UnboundedReceiver};

use crate::config::DEFAULT_EMBED_MODEL;
use crate::inference::types::{ChatMessage, Role, SamplingOptions};
use crate::inference::GenerationService;
use crate::retrieval::index::DEFAULT_TOP_K;
use crate::retrieval::{
    filter_relevant, rewrite_query, DuckDuckGoSearch, PageFetcher, RetrievalIndex,
    SearchProvider,
};
use crate::tools::ToolRegistry;

use super::errors::OrchestratorError;
use super::types::{GenerationRequest, RunEvent, RunOutcome, RunState, Strategy, Turn};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Hard cap on agent-loop round trips per turn. The cap is a safety valve,
/// not a fault — exhausting it completes the run with a sentinel message.
const MAX_TOOL_ITERATIONS: usize = 5;

/// How many web search results to request.
const SEARCH_RESULT_COUNT: usize = 10;

/// How many URLs go forward to the fetch stage.
const MAX_SOURCES: usize = 3;

/// Pages collected per seed URL.
const MAX_PAGES_PER_SITE: usize = 1;

/// Delay between page fetches against the same host.
const PAGE_FETCH_DELAY: Duration = Duration::from_millis(500);

/// Sentinel streamed when the agent loop exhausts its iteration cap.
const MAX_ITERATIONS_MESSAGE: &str = "Maximum tool iterations reached.";

/// Sampling for agent-loop dispatches.
fn conversational_sampling() -> SamplingOptions {
    SamplingOptions {
        temperature: Some(0.7),
        ..Default::default()
    }
}

/// Sampling for the grounded generation pass — low temperature keeps the
/// answer close to the retrieved context.
fn grounded_sampling() -> SamplingOptions {
    SamplingOptions {
        temperature: Some(0.1),
        ..Default::default()
    }
}

// ─── RunHandle ──────────────────────────────────────────────────────────────

/// Caller-side handle for an in-flight run.
///
/// Events arrive in strict emission order; the channel closes after the
/// terminal event, so `recv` returns `None` once the run is over.
pub struct RunHandle {
    events: UnboundedReceiver<RunEvent>,
    stop: Arc<AtomicBool>,
}

impl RunHandle {
    /// Request cooperative cancellation. Observed at the next checkpoint —
    /// an in-flight network call completes first. Already-streamed content
    /// remains a valid partial assistant turn.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Receive the next event, or `None` once the run has terminated.
    pub async fn recv(&mut self) -> Option<RunEvent> {
        self.events.recv().await
    }
}

// ─── TurnOrchestrator ───────────────────────────────────────────────────────

/// Selects and executes exactly one generation strategy per user turn,
/// with at most one active run at a time.
pub struct TurnOrchestrator {
    service: Arc<dyn GenerationService>,
    search: Arc<dyn SearchProvider>,
    fetcher: PageFetcher,
    registry: Arc<ToolRegistry>,
    active: Arc<AtomicBool>,
}

impl TurnOrchestrator {
    /// Create an orchestrator over the given generation service, with the
    /// default web search provider and page fetcher.
    pub fn new(service: Arc<dyn GenerationService>) -> Result<Self, OrchestratorError> {
        Ok(Self {
            service,
            search: Arc::new(DuckDuckGoSearch::new()?),
            fetcher: PageFetcher::new(MAX_PAGES_PER_SITE, PAGE_FETCH_DELAY)?,
            registry: Arc::new(ToolRegistry::new()),
            active: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Replace the web search provider.
    pub fn with_search_provider(mut self, search: Arc<dyn SearchProvider>) -> Self {
        self.search = search;
        self
    }

    /// Begin asynchronous execution of one turn.
    ///
    /// Fails immediately with `RunActive` — no run started, no events — when
    /// another run is still in flight.
    pub fn start(&self, request: GenerationRequest) -> Result<RunHandle, OrchestratorError> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(OrchestratorError::RunActive);
        }

        let (tx, events) = mpsc::unbounded_channel();
        let stop = Arc::new(AtomicBool::new(false));
        let mut state = RunState::new(tx, stop.clone());

        let service = self.service.clone();
        let search = self.search.clone();
        let fetcher = self.fetcher.clone();
        let registry = self.registry.clone();
        let active = self.active.clone();

        tokio::spawn(async move {
            let outcome = run_turn(service, search, fetcher, registry, &request, &mut state).await;
            tracing::info!(outcome = outcome_label(&outcome), "run terminated");
            // Clear the active flag before publishing the terminal event so a
            // caller reacting to it can immediately start the next turn.
            active.store(false, Ordering::SeqCst);
            state.emit_terminal(outcome);
        });

        Ok(RunHandle { events, stop })
    }
}

fn outcome_label(outcome: &RunOutcome) -> &'static str {
    match outcome {
        RunOutcome::Completed { .. } => "completed",
        RunOutcome::Stopped { .. } => "stopped",
        RunOutcome::Errored { .. } => "errored",
    }
}

// ─── Strategy Dispatch ──────────────────────────────────────────────────────

async fn run_turn(
    service: Arc<dyn GenerationService>,
    search: Arc<dyn SearchProvider>,
    fetcher: PageFetcher,
    registry: Arc<ToolRegistry>,
    request: &GenerationRequest,
    state: &mut RunState,
) -> RunOutcome {
    let strategy = request.strategy();
    tracing::info!(
        strategy = ?strategy,
        model = %request.main_model,
        transcript_len = request.transcript.len(),
        "run started"
    );

    // Cancellation requested before anything was dispatched.
    if state.stop_requested() {
        return state.stopped();
    }

    match strategy {
        Strategy::Vision => run_vision(service.as_ref(), request, state).await,
        Strategy::WebSearch => {
            run_web_search(service.as_ref(), search.as_ref(), &fetcher, &registry, request, state)
                .await
        }
        Strategy::ToolChat => run_tool_chat(service.as_ref(), &registry, request, state).await,
    }
}

// ─── Tool-Augmented Strategy (agent loop) ───────────────────────────────────

/// Bounded dispatch/execute loop: call the model with tool schemas, execute
/// whatever it asks for, feed results back, repeat until it answers in text
/// or the iteration cap trips.
async fn run_tool_chat(
    service: &dyn GenerationService,
    registry: &ToolRegistry,
    request: &GenerationRequest,
    state: &mut RunState,
) -> RunOutcome {
    let tools = registry.definitions();
    let mut messages = transcript_to_messages(&request.transcript);

    for iteration in 0..MAX_TOOL_ITERATIONS {
        if state.stop_requested() {
            return state.stopped();
        }

        let outcome = match service
            .chat_with_tools(
                &request.main_model,
                messages.clone(),
                tools.clone(),
                Some(conversational_sampling()),
            )
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(iteration, error = %e, "agent dispatch failed");
                return state.errored(format!("Agent error: {e}"));
            }
        };

        if outcome.tool_calls.is_empty() {
            state.emit_status("");
            state.emit_token(&outcome.content);
            return state.completed();
        }

        tracing::info!(
            iteration,
            call_count = outcome.tool_calls.len(),
            "model requested tool calls"
        );

        // Echo the calls back so the model can pair them with their results.
        messages.push(ChatMessage {
            role: Role::Assistant,
            content: outcome.content.clone(),
            images: None,
            tool_calls: Some(outcome.tool_calls.iter().map(|c| c.to_payload()).collect()),
            tool_name: None,
        });

        for call in &outcome.tool_calls {
            state.emit_status(&format!("Calling {}...", call.name));
            let result = registry.execute(&call.name, &call.arguments);
            tracing::info!(
                tool = %call.name,
                result_preview = %truncate_utf8(&result, 200),
                "tool executed"
            );
            messages.push(ChatMessage::tool(call.name.clone(), result));

            if state.stop_requested() {
                return state.stopped();
            }
        }

        state.emit_status("Thinking...");
    }

    tracing::warn!(cap = MAX_TOOL_ITERATIONS, "agent loop hit iteration cap");
    state.emit_status("");
    state.emit_token(MAX_ITERATIONS_MESSAGE);
    state.completed()
}

// ─── Vision Strategy ────────────────────────────────────────────────────────

/// Single streamed call against the vision model with a one-turn message:
/// the attached image plus the user's text (or a default prompt).
async fn run_vision(
    service: &dyn GenerationService,
    request: &GenerationRequest,
    state: &mut RunState,
) -> RunOutcome {
    let Some(ref image_path) = request.image_path else {
        return state.errored("vision strategy selected without an image");
    };

    let prompt = if request.user_text.trim().is_empty() {
        "Describe this image."
    } else {
        request.user_text.as_str()
    };

    let image_base64 = match std::fs::read(image_path) {
        Ok(bytes) => BASE64.encode(bytes),
        Err(e) => {
            return state.errored(format!(
                "could not read image '{}': {e}",
                image_path.display()
            ));
        }
    };

    let message = ChatMessage::user_with_image(prompt, image_base64);
    let stream = match service
        .chat_stream(&request.vision_model, vec![message], None)
        .await
    {
        Ok(stream) => stream,
        Err(e) => return state.errored(format!("Vision error: {e}")),
    };

    stream_to_events(stream, state, "Vision error").await
}

// ─── Web-Search Strategy (RAG pipeline) ─────────────────────────────────────

/// Fixed pipeline: rewrite → search → filter → fetch → index → grounded
/// generation. Every stage degrades instead of failing, and the stop flag is
/// observed at each stage boundary.
async fn run_web_search(
    service: &dyn GenerationService,
    search: &dyn SearchProvider,
    fetcher: &PageFetcher,
    registry: &ToolRegistry,
    request: &GenerationRequest,
    state: &mut RunState,
) -> RunOutcome {
    state.emit_status("Optimizing query...");
    let query = rewrite_query(service, &request.main_model, &request.user_text).await;
    if state.stop_requested() {
        return state.stopped();
    }

    state.emit_status("Searching...");
    let results = search.search(&query, SEARCH_RESULT_COUNT).await;
    if results.is_empty() {
        // No grounding available — restart as a plain tool-augmented turn.
        tracing::info!(query = %query, "no search results — falling back to agent loop");
        state.emit_token("No search results found.\n\n");
        return run_tool_chat(service, registry, request, state).await;
    }
    if state.stop_requested() {
        return state.stopped();
    }

    let filtered =
        filter_relevant(service, &request.main_model, &request.user_text, results.clone()).await;
    let pool = if filtered.is_empty() { results } else { filtered };
    let urls: Vec<String> = pool.iter().take(MAX_SOURCES).map(|r| r.url.clone()).collect();

    state.emit_status("Reading content...");
    let pages = fetcher.fetch(&urls, state.stop_flag()).await;
    if state.stop_requested() {
        return state.stopped();
    }

    state.emit_status("Analyzing content...");
    let mut context = String::new();
    if !pages.is_empty() {
        let mut index = RetrievalIndex::new(DEFAULT_EMBED_MODEL);
        if index.ingest(service, &pages).await {
            // Retrieve against the original question, not the rewritten query.
            context = index
                .retrieve(service, &request.user_text, DEFAULT_TOP_K)
                .await;
        }
    }
    if context.is_empty() {
        context = "No readable content could be extracted from the search results.".to_string();
    }

    state.emit_status("Generating response...");
    let grounded_system = format!(
        "{}\n\nCONTEXT FROM WEB SEARCH:\n{}\n\nINSTRUCTION: Answer based on the context above. \
         Do not provide citations or URLs.",
        request.system_prompt, context
    );

    let mut messages = vec![ChatMessage::system(grounded_system)];
    messages.extend(transcript_without_system(&request.transcript));

    let stream = match service
        .chat_stream(&request.main_model, messages, Some(grounded_sampling()))
        .await
    {
        Ok(stream) => stream,
        Err(e) => return state.errored(format!("Generation error: {e}")),
    };

    stream_to_events(stream, state, "Generation error").await
}

// ─── Shared Helpers ─────────────────────────────────────────────────────────

/// Drain a fragment stream into token events, observing the stop flag after
/// every fragment. Stream-level errors terminate the run as a fault.
async fn stream_to_events(
    mut stream: futures::stream::BoxStream<'static, Result<String, crate::inference::InferenceError>>,
    state: &mut RunState,
    error_label: &str,
) -> RunOutcome {
    while let Some(chunk) = stream.next().await {
        if state.stop_requested() {
            return state.stopped();
        }
        match chunk {
            Ok(fragment) => state.emit_token(&fragment),
            Err(e) => return state.errored(format!("{error_label}: {e}")),
        }
    }
    state.completed()
}

/// Map the transcript to chat messages for the agent loop.
fn transcript_to_messages(transcript: &[Turn]) -> Vec<ChatMessage> {
    transcript
        .iter()
        .map(|turn| match turn.role {
            Role::Tool => ChatMessage::tool(
                turn.tool_name.clone().unwrap_or_default(),
                turn.content.clone(),
            ),
            Role::Assistant if turn.tool_calls.is_some() => ChatMessage {
                role: Role::Assistant,
                content: turn.content.clone(),
                images: None,
                tool_calls: turn
                    .tool_calls
                    .as_ref()
                    .map(|calls| calls.iter().map(|c| c.to_payload()).collect()),
                tool_name: None,
            },
            role => ChatMessage {
                role,
                content: turn.content.clone(),
                images: None,
                tool_calls: None,
                tool_name: None,
            },
        })
        .collect()
}

/// Transcript minus the system turn — used when the run substitutes its own
/// system message.
fn transcript_without_system(transcript: &[Turn]) -> Vec<ChatMessage> {
    transcript
        .iter()
        .filter(|turn| turn.role != Role::System)
        .map(|turn| ChatMessage {
            role: turn.role,
            content: turn.content.clone(),
            images: None,
            tool_calls: None,
            tool_name: None,
        })
        .collect()
}

/// Truncate a string to at most `max_bytes` bytes on a valid UTF-8 char
/// boundary. Used for log previews of tool results and page content.
pub(crate) fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// ─── Tests ──────────────────────────────────────────────────────────────────
