//! The compile orchestrator.
//!
//! [`Compiler::compile`] prepares a sandbox, runs the compiler with a wall
//! clock limit and classifies the output. Every failure along the way ends up
//! as a [`CompileResult::Failure`] with at least one diagnostic.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::diagnostics::{collect_notices, parse_diagnostics};
use crate::sandbox::Sandbox;
use crate::stubs::stubs_for;
use crate::{CompileResult, Result, SandboxError, BOARD_PROFILE};

/// Default compiler program.
pub const DEFAULT_PROGRAM: &str = "arduino-cli";

/// Default wall-clock limit for one compile.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// How to run the compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerSettings {
    /// Program to execute.
    pub program: String,
    /// Arguments placed before `compile ...`, e.g. a wrapper script's own path.
    pub leading_args: Vec<String>,
    /// Wall-clock limit after which the process is killed.
    pub timeout: Duration,
    /// Parent directory for sandboxes; the system temp dir when `None`.
    pub sandbox_root: Option<PathBuf>,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            leading_args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            sandbox_root: None,
        }
    }
}

/// Compiles sketches in per-call sandboxes.
///
/// The compiler holds only immutable settings, so one instance can serve any
/// number of concurrent compiles.
#[derive(Debug, Clone)]
pub struct Compiler {
    settings: CompilerSettings,
}

impl Compiler {
    /// Creates a compiler with the given settings.
    #[must_use]
    pub const fn new(settings: CompilerSettings) -> Self {
        Self { settings }
    }

    /// Returns the settings.
    #[must_use]
    pub const fn settings(&self) -> &CompilerSettings {
        &self.settings
    }

    /// Compiles `code` and reports the outcome.
    ///
    /// Never fails: sandbox, spawn and timeout problems are reported as a
    /// single diagnostic. The sandbox is gone by the time this returns, and
    /// also if the returned future is dropped early.
    #[instrument(skip(self, code), fields(code_len = code.len()))]
    pub async fn compile(&self, code: &str) -> CompileResult {
        let sandbox = match Sandbox::create(self.settings.sandbox_root.as_deref()) {
            Ok(sandbox) => sandbox,
            Err(e) => {
                warn!(error = %e, "Could not create sandbox");
                return CompileResult::failure(vec![e.to_diagnostic()]);
            }
        };

        let result = match self.compile_in(&sandbox, code).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Compile did not complete");
                CompileResult::failure(vec![e.to_diagnostic()])
            }
        };

        if let Err(e) = sandbox.close() {
            warn!(error = %e, "Sandbox cleanup failed");
        }

        info!(success = result.is_success(), "Compile finished");
        result
    }

    async fn compile_in(&self, sandbox: &Sandbox, code: &str) -> Result<CompileResult> {
        let sketch_dir = sandbox.write_sketch(code).await?;
        let stubs_dir = sandbox.write_stubs(&stubs_for(code)).await?;

        let output = self.run(&compile_args(&sketch_dir, &stubs_dir)).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if output.status.success() {
            Ok(CompileResult::Success {
                notices: collect_notices(&stdout, &stderr),
            })
        } else {
            debug!(status = ?output.status.code(), "Compiler reported failure");
            Ok(CompileResult::failure(parse_diagnostics(&stderr)))
        }
    }

    async fn run(&self, args: &[String]) -> Result<Output> {
        let mut command = Command::new(&self.settings.program);
        command
            .args(&self.settings.leading_args)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        debug!(program = %self.settings.program, ?args, "Running compiler");

        // Dropping the output future on timeout drops the child, which kills it.
        tokio::time::timeout(self.settings.timeout, command.output())
            .await
            .map_err(|_| SandboxError::Timeout(self.settings.timeout))?
            .map_err(|source| SandboxError::Spawn {
                program: self.settings.program.clone(),
                source,
            })
    }
}

/// Builds the arguments for compiling `sketch_dir` with `stubs_dir` on the
/// include path.
#[must_use]
pub fn compile_args(sketch_dir: &Path, stubs_dir: &Path) -> Vec<String> {
    vec![
        "compile".to_string(),
        "--fqbn".to_string(),
        BOARD_PROFILE.to_string(),
        "--build-property".to_string(),
        format!("compiler.cpp.extra_flags=-I{}", stubs_dir.display()),
        sketch_dir.display().to_string(),
    ]
}
