//! Tinker Compile Sandbox
//!
//! Compiles a student's sketch with `arduino-cli` inside a throwaway
//! directory and turns the compiler's output into line-accurate diagnostics.
//!
//! Hardware libraries are not installed where the compiler runs, so includes
//! of a few well-known libraries are satisfied with stub headers that only
//! declare enough for the sketch to parse.
//!
//! # Example
//!
//! ```no_run
//! use tinker_sandbox::{CompileResult, Compiler, CompilerSettings};
//!
//! # async fn example() {
//! let compiler = Compiler::new(CompilerSettings::default());
//! match compiler.compile("void setup() {}\nvoid loop() {}\n").await {
//!     CompileResult::Success { notices } => println!("ok, {} notices", notices.len()),
//!     CompileResult::Failure { diagnostics } => {
//!         for d in diagnostics {
//!             println!("{}:{}: {}", d.line, d.column, d.message);
//!         }
//!     }
//! }
//! # }
//! ```

pub mod compiler;
pub mod diagnostics;
pub mod sandbox;
pub mod stubs;

pub use compiler::{Compiler, CompilerSettings};
pub use sandbox::Sandbox;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Board profile every sketch is compiled for.
pub const BOARD_PROFILE: &str = "arduino:avr:uno";

/// Message of the diagnostic used when stderr had nothing recognizable.
pub const UNRECOGNIZED_FORMAT: &str = "Compilation failed (unrecognized format).";

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while preparing or running a compile.
///
/// These never escape [`Compiler::compile`]; each is turned into a single
/// diagnostic with [`SandboxError::to_diagnostic`].
#[derive(Debug, Error)]
pub enum SandboxError {
    /// Failed to create the sandbox directory.
    #[error("failed to create sandbox: {0}")]
    Create(#[source] std::io::Error),

    /// Failed to write a file into the sandbox.
    #[error("failed to write {path}: {source}")]
    Write {
        /// File that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to start the compiler process.
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        /// Program that was started.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The compiler did not finish in time and was killed.
    #[error("compiler timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Failed to remove the sandbox directory.
    #[error("failed to remove sandbox: {0}")]
    Cleanup(#[source] std::io::Error),
}

impl SandboxError {
    /// Creates a write error for `path`.
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    /// Converts the error into the diagnostic shown to the student.
    #[must_use]
    pub fn to_diagnostic(&self) -> CompileDiagnostic {
        let message = match self {
            Self::Create(_) | Self::Write { .. } | Self::Cleanup(_) => {
                "Could not prepare the compile sandbox.".to_string()
            }
            Self::Spawn { program, .. } => format!("Could not start the compiler ({program})."),
            Self::Timeout(limit) => {
                format!("Compilation timed out after {} seconds.", limit.as_secs())
            }
        };
        CompileDiagnostic::new(1, 1, message)
    }
}

/// Result type for sandbox operations.
pub type Result<T> = std::result::Result<T, SandboxError>;

// ============================================================================
// Compile Results
// ============================================================================

/// A structured compiler error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileDiagnostic {
    /// 1-based line in the sketch.
    pub line: u32,
    /// 1-based column in the sketch.
    pub column: u32,
    /// Compiler message.
    pub message: String,
}

impl CompileDiagnostic {
    /// Creates a diagnostic, clamping line and column to at least 1.
    #[must_use]
    pub fn new(line: u32, column: u32, message: impl Into<String>) -> Self {
        Self {
            line: line.max(1),
            column: column.max(1),
            message: message.into(),
        }
    }

    /// The diagnostic reported when stderr had no recognizable error line.
    #[must_use]
    pub fn unrecognized() -> Self {
        Self::new(1, 1, UNRECOGNIZED_FORMAT)
    }
}

/// Outcome of one compile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CompileResult {
    /// The sketch compiled.
    Success {
        /// Non-fatal compiler output worth showing.
        notices: Vec<String>,
    },
    /// The sketch did not compile. Never empty.
    Failure {
        /// Diagnostics in stderr order.
        diagnostics: Vec<CompileDiagnostic>,
    },
}

impl CompileResult {
    /// Creates a failure, substituting the unrecognized-format diagnostic when
    /// `diagnostics` is empty.
    #[must_use]
    pub fn failure(mut diagnostics: Vec<CompileDiagnostic>) -> Self {
        if diagnostics.is_empty() {
            diagnostics.push(CompileDiagnostic::unrecognized());
        }
        Self::Failure { diagnostics }
    }

    /// Returns `true` for [`CompileResult::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Returns the diagnostics, empty on success.
    #[must_use]
    pub fn diagnostics(&self) -> &[CompileDiagnostic] {
        match self {
            Self::Success { .. } => &[],
            Self::Failure { diagnostics } => diagnostics,
        }
    }
}
