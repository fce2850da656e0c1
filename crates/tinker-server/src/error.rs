//! Error types for the Tinker server.
//!
//! Configuration, lesson loading and language-model failures each get their
//! own variants with an actionable suggestion. Compile and rule-checking
//! problems never show up here: those components report typed results instead.

use std::path::PathBuf;

/// A specialized `Result` type for Tinker server operations.
pub type Result<T> = std::result::Result<T, TinkerError>;

/// Errors that can occur in the Tinker server.
#[derive(Debug, thiserror::Error)]
pub enum TinkerError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// `tinker.json` is not valid JSON or has a field of the wrong type.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your tinker.json with a JSON linter")]
    ConfigParseError {
        /// Config file that failed to parse.
        path: PathBuf,
        /// What serde reported.
        message: String,
    },

    /// A config value parsed but is unusable.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Which value is wrong.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Lesson Loading Errors
    // ========================================================================
    /// Lesson file was not found.
    #[error("Lesson not found: '{path}'\n\nSuggestion: Check the 'lessonsDir' field in tinker.json or create the lesson file")]
    LessonNotFound {
        /// Path where the lesson was expected.
        path: PathBuf,
    },

    /// Lesson file exceeds the 100KB size limit.
    #[error("Lesson exceeds size limit (100KB): '{path}' is {size_kb}KB\n\nSuggestion: Split the lesson into smaller steps")]
    LessonTooLarge {
        /// Path to the oversized lesson.
        path: PathBuf,
        /// Actual size in kilobytes.
        size_kb: u64,
    },

    /// Lesson file contains non-UTF-8 content.
    #[error("Lesson has invalid encoding: '{path}'\n\nSuggestion: Convert the file to UTF-8 encoding")]
    LessonEncodingError {
        /// Path to the lesson with encoding issues.
        path: PathBuf,
    },

    /// Lesson file is not a valid lesson definition.
    #[error("Invalid lesson '{path}': {message}\n\nSuggestion: Regenerate the answers with 'tinker infer' and check the lesson JSON")]
    LessonParseError {
        /// Path to the lesson.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Lesson id contains characters outside `[A-Za-z0-9_-]`.
    #[error("Invalid lesson id '{id}'\n\nSuggestion: Lesson ids may only contain letters, digits, '_' and '-'")]
    InvalidLessonId {
        /// The rejected id.
        id: String,
    },

    // ========================================================================
    // LLM Errors
    // ========================================================================
    /// Language model API returned an error or could not be reached.
    #[error("LLM API error ({kind}): {message}\n\nSuggestion: {suggestion}")]
    LlmApiError {
        /// The kind of API error.
        kind: LlmErrorKind,
        /// Detailed error message.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Wrapped Errors
    // ========================================================================
    /// Lesson file exists but could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Categories of language model API errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// Authentication failure (invalid API key).
    Authentication,
    /// Too many requests (429).
    RateLimit,
    /// Model not available on the server.
    ModelNotFound,
    /// The model server failed (5xx).
    Server,
    /// Connection refused, reset or timed out.
    Network,
    /// Any other status.
    Other,
}

impl std::fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::ModelNotFound => write!(f, "model_not_found"),
            Self::Server => write!(f, "server"),
            Self::Network => write!(f, "network"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl LlmErrorKind {
    /// Classifies an HTTP status returned by the model server.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Authentication,
            404 => Self::ModelNotFound,
            429 => Self::RateLimit,
            500..=599 => Self::Server,
            _ => Self::Other,
        }
    }

    /// What the operator should try for this kind of failure.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::Authentication => "Check the API key for the configured LLM endpoint",
            Self::RateLimit => "Wait a moment before asking for another explanation",
            Self::ModelNotFound => "Pull the model first (e.g. 'ollama pull llama3.2') or fix 'llm.model'",
            Self::Server => "Check the model server logs and retry",
            Self::Network => "Check that the LLM server is running and 'llm.baseUrl' is correct",
            Self::Other => "Check the LLM server logs",
        }
    }
}

impl TinkerError {
    /// Config file at `path` could not be parsed.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Config value rejected by [`Config::validate`](crate::Config::validate).
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `LessonNotFound` error.
    #[must_use]
    pub fn lesson_not_found(path: impl Into<PathBuf>) -> Self {
        Self::LessonNotFound { path: path.into() }
    }

    /// Creates a new `LessonTooLarge` error.
    #[must_use]
    pub fn lesson_too_large(path: impl Into<PathBuf>, size_kb: u64) -> Self {
        Self::LessonTooLarge {
            path: path.into(),
            size_kb,
        }
    }

    /// Creates a new `LessonEncodingError`.
    #[must_use]
    pub fn lesson_encoding(path: impl Into<PathBuf>) -> Self {
        Self::LessonEncodingError { path: path.into() }
    }

    /// Creates a new `LessonParseError`.
    #[must_use]
    pub fn lesson_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::LessonParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `InvalidLessonId` error.
    #[must_use]
    pub fn invalid_lesson_id(id: impl Into<String>) -> Self {
        Self::InvalidLessonId { id: id.into() }
    }

    /// Model server failure; the suggestion follows from `kind`.
    #[must_use]
    pub fn llm_api_error(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        let suggestion = kind.suggestion().to_string();
        Self::LlmApiError {
            kind,
            message: message.into(),
            suggestion,
        }
    }

    /// Returns `true` if the same explain request might succeed later.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::LlmApiError {
                kind: LlmErrorKind::RateLimit | LlmErrorKind::Server | LlmErrorKind::Network,
                ..
            }
        )
    }

    /// Returns `true` if this error means the requested lesson does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::LessonNotFound { .. })
    }
}
