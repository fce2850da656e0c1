//! AI explanations of compiler errors.
//!
//! [`build_prompt`] turns a sketch and its diagnostics into a bounded prompt.
//! [`relay`] forwards an upstream completion to a downstream consumer as
//! [`StreamEvent`]s, stopping as soon as the consumer goes away.

use std::fmt::Write as _;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::config::ExplainConfig;
use crate::decoder::{UpstreamDecoder, UpstreamEvent};
use crate::llm::LlmClient;

/// Message sent to the client when the explanation cannot be produced.
pub const GENERIC_ERROR: &str = "Something went wrong while generating the explanation.";

/// Lower and upper bound for the requested sentence count.
pub const SENTENCE_RANGE: std::ops::RangeInclusive<u32> = 1..=6;

// ============================================================================
// Request Types
// ============================================================================

/// What the student asked for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExplainMode {
    /// Explain the cause of each error.
    #[default]
    Explain,
    /// Nudge toward the problem without naming the fix.
    Hint,
}

impl ExplainMode {
    fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "explain" => Some(Self::Explain),
            "hint" => Some(Self::Hint),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for ExplainMode {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid mode '{s}': expected one of 'explain', 'hint'"
            ))
        })
    }
}

/// How long the explanation should be when no sentence count is given.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Verbosity {
    /// Two sentences.
    Brief,
    /// Three sentences.
    #[default]
    Normal,
    /// Five sentences.
    Detailed,
}

impl Verbosity {
    fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "brief" => Some(Self::Brief),
            "normal" => Some(Self::Normal),
            "detailed" => Some(Self::Detailed),
            _ => None,
        }
    }

    /// Sentence budget for this verbosity.
    #[must_use]
    pub const fn sentences(&self) -> u32 {
        match self {
            Self::Brief => 2,
            Self::Normal => 3,
            Self::Detailed => 5,
        }
    }
}

impl<'de> Deserialize<'de> for Verbosity {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid verbosity '{s}': expected one of 'brief', 'normal', 'detailed'"
            ))
        })
    }
}

/// A compiler error as reported by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedError {
    /// 1-based line.
    pub line: u32,
    /// 1-based column, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    /// Compiler message.
    pub message: String,
}

/// Body of `POST /api/explain`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExplainRequest {
    /// The full sketch.
    #[serde(default)]
    pub code: String,
    /// Diagnostics to explain, in compiler order.
    #[serde(default)]
    pub errors: Vec<ReportedError>,
    /// Explain or hint.
    #[serde(default)]
    pub mode: ExplainMode,
    /// Explicit sentence budget; overrides `verbosity`.
    #[serde(default)]
    pub sentences: Option<u32>,
    /// Fallback sentence budget.
    #[serde(default)]
    pub verbosity: Verbosity,
}

impl ExplainRequest {
    /// Sentence budget, clamped to 1..=6.
    #[must_use]
    pub fn sentence_limit(&self) -> u32 {
        self.sentences
            .unwrap_or_else(|| self.verbosity.sentences())
            .clamp(*SENTENCE_RANGE.start(), *SENTENCE_RANGE.end())
    }
}

// ============================================================================
// Prompt
// ============================================================================

/// A two-message chat prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// Rule preamble.
    pub system: String,
    /// Code and diagnostics.
    pub user: String,
}

/// Builds the prompt for one explanation.
#[must_use]
pub fn build_prompt(request: &ExplainRequest, config: &ExplainConfig) -> Prompt {
    Prompt {
        system: preamble(request.mode, request.sentence_limit()),
        user: describe(request, config),
    }
}

fn preamble(mode: ExplainMode, sentences: u32) -> String {
    let task = match mode {
        ExplainMode::Explain => "Explain only the cause of each error in plain language.",
        ExplainMode::Hint => {
            "Give a short hint that points the student toward the problem without stating the fix."
        }
    };
    let unit = if sentences == 1 { "sentence" } else { "sentences" };
    format!(
        "You are a patient Arduino tutor. A student's sketch failed to compile. {task} \
         Do not rewrite the code or show corrected code. Answer in at most {sentences} {unit}."
    )
}

fn describe(request: &ExplainRequest, config: &ExplainConfig) -> String {
    let mut out = String::new();
    let (prefix, truncated) = truncate_chars(&request.code, config.max_code_chars);

    let _ = writeln!(out, "Sketch:");
    let _ = writeln!(out, "```cpp");
    let _ = writeln!(out, "{}", prefix.trim_end_matches('\n'));
    let _ = writeln!(out, "```");
    if truncated {
        let _ = writeln!(
            out,
            "(sketch truncated after {} characters)",
            config.max_code_chars
        );
    }
    let _ = writeln!(out);

    if request.errors.is_empty() {
        let _ = writeln!(out, "The compiler reported no errors.");
        return out;
    }

    let _ = writeln!(out, "Compiler errors:");
    for (i, error) in request.errors.iter().take(config.max_diagnostics).enumerate() {
        let position = error
            .column
            .map_or_else(|| format!("line {}", error.line), |c| format!("line {}, column {c}", error.line));
        let _ = writeln!(out, "{}. {position}: {}", i + 1, error.message);
        let snippet = window(
            &request.code,
            error.line as usize,
            config.context_before,
            config.context_after,
        );
        if !snippet.is_empty() {
            let _ = writeln!(out, "{snippet}");
        }
    }

    let omitted = request.errors.len().saturating_sub(config.max_diagnostics);
    if omitted > 0 {
        let _ = writeln!(out, "({omitted} more errors omitted)");
    }
    out
}

/// Returns at most `max` characters of `text` and whether anything was cut.
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> (&str, bool) {
    match text.char_indices().nth(max) {
        Some((idx, _)) => (&text[..idx], true),
        None => (text, false),
    }
}

/// Line-numbered excerpt around `line` with that line marked `>>`.
///
/// Lines outside the code yield an empty string.
#[must_use]
pub fn window(code: &str, line: usize, before: usize, after: usize) -> String {
    let lines: Vec<&str> = code.lines().collect();
    if line == 0 || line > lines.len() {
        return String::new();
    }

    let start = line.saturating_sub(before).max(1);
    let end = line.saturating_add(after).min(lines.len());
    (start..=end)
        .map(|n| {
            let marker = if n == line { ">>" } else { "  " };
            format!("{marker} {n:>4} | {}", lines[n - 1])
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// Downstream Events
// ============================================================================

/// One event sent to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A piece of the explanation.
    Token(String),
    /// Natural completion.
    Done,
    /// Terminal failure with a client-safe message.
    Error(String),
}

impl StreamEvent {
    /// SSE event name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Token(_) => "token",
            Self::Done => "done",
            Self::Error(_) => "error",
        }
    }

    /// JSON payload for the `data:` line.
    #[must_use]
    pub fn payload(&self) -> String {
        let value = match self {
            Self::Token(token) => serde_json::json!({ "token": token }),
            Self::Done => serde_json::json!({}),
            Self::Error(error) => serde_json::json!({ "error": error }),
        };
        value.to_string()
    }

    /// Complete SSE frame, blank line included.
    #[must_use]
    pub fn to_frame(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.name(), self.payload())
    }

    /// Returns `true` for `Done` and `Error`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error(_))
    }
}

// ============================================================================
// Relay
// ============================================================================

/// How a relay ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Upstream finished and `done` was delivered.
    Completed,
    /// The consumer went away; upstream was released early.
    Cancelled,
    /// Upstream failed and `error` was delivered.
    Failed,
}

/// Forwards an upstream body to `tx`, one event per decoded token.
///
/// Tokens keep upstream order. The relay waits on the consumer and the
/// upstream together, so a disconnect is noticed even while the model is
/// silent; the relay then returns and drops `upstream`, closing the
/// connection. The last event sent is always `Done` or `Error` unless the
/// relay was cancelled.
pub async fn relay<S, B, E>(
    upstream: S,
    mut decoder: UpstreamDecoder,
    tx: &mpsc::Sender<StreamEvent>,
) -> RelayOutcome
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    tokio::pin!(upstream);
    let mut forwarded = 0usize;

    loop {
        let chunk = tokio::select! {
            biased;
            () = tx.closed() => {
                debug!(forwarded, "Consumer gone while waiting for upstream");
                return RelayOutcome::Cancelled;
            }
            chunk = upstream.next() => chunk,
        };
        let Some(chunk) = chunk else { break };
        let events = match chunk {
            Ok(bytes) => decoder.push(bytes.as_ref()),
            Err(e) => {
                warn!(error = %e, forwarded, "Upstream stream failed");
                return fail(tx).await;
            }
        };
        if let Some(outcome) = forward(events, tx, &mut forwarded).await {
            return outcome;
        }
    }

    if let Some(outcome) = forward(decoder.finish(), tx, &mut forwarded).await {
        return outcome;
    }

    debug!(forwarded, "Upstream ended without a done marker");
    finish(tx, StreamEvent::Done, RelayOutcome::Completed).await
}

async fn forward(
    events: Vec<UpstreamEvent>,
    tx: &mpsc::Sender<StreamEvent>,
    forwarded: &mut usize,
) -> Option<RelayOutcome> {
    for event in events {
        match event {
            UpstreamEvent::Token(token) => {
                if tx.is_closed() || tx.send(StreamEvent::Token(token)).await.is_err() {
                    debug!(forwarded = *forwarded, "Consumer disconnected");
                    return Some(RelayOutcome::Cancelled);
                }
                *forwarded += 1;
            }
            UpstreamEvent::Done => {
                info!(forwarded = *forwarded, "Explanation complete");
                return Some(finish(tx, StreamEvent::Done, RelayOutcome::Completed).await);
            }
            UpstreamEvent::Error(message) => {
                warn!(error = %message, forwarded = *forwarded, "Model reported an error");
                return Some(fail(tx).await);
            }
            UpstreamEvent::Ignore => {}
        }
    }
    None
}

async fn fail(tx: &mpsc::Sender<StreamEvent>) -> RelayOutcome {
    finish(
        tx,
        StreamEvent::Error(GENERIC_ERROR.to_string()),
        RelayOutcome::Failed,
    )
    .await
}

async fn finish(
    tx: &mpsc::Sender<StreamEvent>,
    event: StreamEvent,
    outcome: RelayOutcome,
) -> RelayOutcome {
    if tx.send(event).await.is_err() {
        return RelayOutcome::Cancelled;
    }
    outcome
}

/// Runs one explanation end to end: opens the upstream stream and relays it.
///
/// Failures to reach the model become a single `Error` event.
#[instrument(skip_all, fields(model = %client.model()))]
pub async fn explain(
    client: &LlmClient,
    prompt: &Prompt,
    tx: mpsc::Sender<StreamEvent>,
) -> RelayOutcome {
    match client.stream_chat(prompt).await {
        Ok(body) => relay(body, client.decoder(), &tx).await,
        Err(e) => {
            warn!(error = %e, transient = e.is_transient(), "Could not open explanation stream");
            fail(&tx).await
        }
    }
}
