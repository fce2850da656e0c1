//! Tinker lesson server
//!
//! Serves the HTTP API for compiling sketches, checking blank answers,
//! drafting answer keys and streaming AI explanations of compiler errors.

pub mod api;
pub mod config;
pub mod decoder;
pub mod error;
pub mod explain;
pub mod lesson;
pub mod llm;
pub mod location;

pub use api::{
    create_router, AnswerKeyRequest, AnswerKeyResponse, AppState, CheckRequest, CheckResponse,
    CompileRequest, CompileResponse, ErrorResponse, HealthResponse, LessonCheckRequest,
};
pub use config::{CompilerConfig, Config, ExplainConfig, LlmApi, LlmConfig};
pub use decoder::{FrameAccumulator, SseFrame, UpstreamDecoder, UpstreamEvent, Utf8Decoder};
pub use error::{LlmErrorKind, Result, TinkerError};
pub use explain::{
    build_prompt, explain, relay, ExplainMode, ExplainRequest, Prompt, RelayOutcome,
    ReportedError, StreamEvent, Verbosity, GENERIC_ERROR,
};
pub use lesson::{Lesson, LessonStore, MAX_LESSON_SIZE};
pub use llm::LlmClient;
pub use location::{LessonLocation, LocationReporter, MemoryReporter, TracingReporter};
