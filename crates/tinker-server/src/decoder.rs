//! Incremental decoding of streamed chat completions.
//!
//! Upstream bodies arrive as arbitrary byte chunks. Decoding is layered:
//!
//! 1. [`Utf8Decoder`] turns bytes into text, holding back a multi-byte
//!    sequence split across chunks.
//! 2. [`FrameAccumulator`] buffers text and yields complete frames: lines for
//!    newline-delimited JSON, blank-line separated blocks for server-sent
//!    events.
//! 3. [`UpstreamDecoder`] parses each frame for the configured dialect into
//!    [`UpstreamEvent`]s.
//!
//! Nothing here performs I/O, so the same decoder serves async relays and
//! plain loops over a buffer alike.

use serde::Deserialize;
use tracing::debug;

use crate::config::LlmApi;

// ============================================================================
// Bytes to text
// ============================================================================

/// UTF-8 decoder that tolerates sequences split across chunks.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Creates an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes as much of `pending + bytes` as forms complete characters.
    ///
    /// Invalid sequences become U+FFFD. An incomplete trailing sequence is
    /// kept for the next call.
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut text = String::new();
        let mut rest: &[u8] = &self.pending;

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    text.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        self.pending = rest.to_vec();
        text
    }

    /// Flushes any held-back bytes.
    pub fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

// ============================================================================
// Text to frames
// ============================================================================

/// Splits a text stream into frames at a fixed delimiter.
///
/// Carriage returns are dropped so `\r\n` line endings split the same way as
/// `\n`.
#[derive(Debug)]
pub struct FrameAccumulator {
    delimiter: &'static str,
    buffer: String,
}

impl FrameAccumulator {
    /// Frames are single lines (newline-delimited JSON).
    #[must_use]
    pub const fn lines() -> Self {
        Self {
            delimiter: "\n",
            buffer: String::new(),
        }
    }

    /// Frames are separated by a blank line (server-sent events).
    #[must_use]
    pub const fn events() -> Self {
        Self {
            delimiter: "\n\n",
            buffer: String::new(),
        }
    }

    /// Appends `text` and returns every frame it completed, in order.
    ///
    /// Blank frames are skipped.
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.buffer.extend(text.chars().filter(|&c| c != '\r'));

        let mut frames = Vec::new();
        while let Some(idx) = self.buffer.find(self.delimiter) {
            let frame: String = self.buffer.drain(..idx + self.delimiter.len()).collect();
            let frame = &frame[..idx];
            if !frame.trim().is_empty() {
                frames.push(frame.to_string());
            }
        }
        frames
    }

    /// Returns the unterminated remainder, if it holds anything.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        if rest.trim().is_empty() {
            None
        } else {
            Some(rest)
        }
    }
}

/// A parsed server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Value of the `event:` field, if present.
    pub event: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
}

impl SseFrame {
    /// Parses one frame. Comment-only frames yield `None`.
    #[must_use]
    pub fn parse(frame: &str) -> Option<Self> {
        let mut event = None;
        let mut data: Option<String> = None;

        for line in frame.lines() {
            if line.starts_with(':') {
                continue;
            }
            let (field, value) = line.split_once(':').unwrap_or((line, ""));
            let value = value.strip_prefix(' ').unwrap_or(value);
            match field {
                "event" => event = Some(value.to_string()),
                "data" => match data.as_mut() {
                    Some(existing) => {
                        existing.push('\n');
                        existing.push_str(value);
                    }
                    None => data = Some(value.to_string()),
                },
                _ => {}
            }
        }

        if event.is_none() && data.is_none() {
            return None;
        }
        Some(Self {
            event,
            data: data.unwrap_or_default(),
        })
    }
}

// ============================================================================
// Frames to events
// ============================================================================

/// One decoded unit of an upstream completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamEvent {
    /// A piece of generated text.
    Token(String),
    /// The model finished.
    Done,
    /// The server reported an error inside the stream.
    Error(String),
    /// Nothing to forward (keep-alives, role headers, malformed frames).
    Ignore,
}

#[derive(Deserialize)]
struct OllamaChunk {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    delta: Option<CompletionDelta>,
}

#[derive(Deserialize)]
struct CompletionDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Full decoding pipeline for one upstream response.
#[derive(Debug)]
pub struct UpstreamDecoder {
    api: LlmApi,
    utf8: Utf8Decoder,
    frames: FrameAccumulator,
}

impl UpstreamDecoder {
    /// Creates a decoder for the given dialect.
    #[must_use]
    pub fn new(api: LlmApi) -> Self {
        let frames = match api {
            LlmApi::Ollama => FrameAccumulator::lines(),
            LlmApi::OpenAi => FrameAccumulator::events(),
        };
        Self {
            api,
            utf8: Utf8Decoder::new(),
            frames,
        }
    }

    /// Feeds a chunk and returns the events it completed, in order.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<UpstreamEvent> {
        let text = self.utf8.push(bytes);
        let frames = self.frames.push(&text);
        frames.iter().flat_map(|frame| self.parse(frame)).collect()
    }

    /// Decodes whatever is left once the body has ended.
    pub fn finish(&mut self) -> Vec<UpstreamEvent> {
        let text = self.utf8.finish();
        let mut frames = self.frames.push(&text);
        frames.extend(self.frames.finish());
        frames.iter().flat_map(|frame| self.parse(frame)).collect()
    }

    fn parse(&self, frame: &str) -> Vec<UpstreamEvent> {
        match self.api {
            LlmApi::Ollama => parse_ollama_line(frame),
            LlmApi::OpenAi => SseFrame::parse(frame)
                .map(|sse| vec![parse_completion_event(&sse)])
                .unwrap_or_default(),
        }
    }
}

/// Parses one line of an Ollama `/api/chat` stream.
///
/// A final chunk may carry both content and `done`, so it can yield two
/// events.
#[must_use]
pub fn parse_ollama_line(line: &str) -> Vec<UpstreamEvent> {
    let chunk: OllamaChunk = match serde_json::from_str(line.trim()) {
        Ok(chunk) => chunk,
        Err(e) => {
            debug!(error = %e, "Skipping malformed upstream line");
            return vec![UpstreamEvent::Ignore];
        }
    };

    if let Some(error) = chunk.error {
        return vec![UpstreamEvent::Error(error)];
    }

    let mut events = Vec::new();
    if let Some(message) = chunk.message {
        if !message.content.is_empty() {
            events.push(UpstreamEvent::Token(message.content));
        }
    }
    if chunk.done {
        events.push(UpstreamEvent::Done);
    }
    if events.is_empty() {
        events.push(UpstreamEvent::Ignore);
    }
    events
}

/// Parses one event of an OpenAI-compatible completion stream.
#[must_use]
pub fn parse_completion_event(frame: &SseFrame) -> UpstreamEvent {
    let data = frame.data.trim();
    if data == "[DONE]" {
        return UpstreamEvent::Done;
    }
    if data.is_empty() {
        return UpstreamEvent::Ignore;
    }

    let chunk: CompletionChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            debug!(error = %e, "Skipping malformed upstream event");
            return UpstreamEvent::Ignore;
        }
    };

    if let Some(error) = chunk.error {
        let message = error
            .get("message")
            .and_then(serde_json::Value::as_str)
            .map_or_else(|| error.to_string(), str::to_string);
        return UpstreamEvent::Error(message);
    }

    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content)
        .filter(|content| !content.is_empty())
        .map_or(UpstreamEvent::Ignore, UpstreamEvent::Token)
}
