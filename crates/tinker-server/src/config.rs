//! Configuration types for the Tinker server.
//!
//! Configuration lives in `tinker.json`. Every field has a default, unknown
//! keys are ignored, and enum values are matched case-insensitively.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tinker_sandbox::CompilerSettings;

use crate::error::{Result, TinkerError};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "tinker.json";

fn default_program() -> String {
    "arduino-cli".to_string()
}

const fn default_compile_timeout() -> u64 {
    60
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3.2".to_string()
}

const fn default_max_code_chars() -> usize {
    4000
}

const fn default_context_lines() -> usize {
    3
}

const fn default_max_diagnostics() -> usize {
    5
}

fn default_lessons_dir() -> String {
    "lessons".to_string()
}

/// Main configuration for the Tinker server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// How sketches are compiled.
    #[serde(default)]
    pub compiler: CompilerConfig,

    /// Which language model explains errors.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Prompt size limits for explanations.
    #[serde(default)]
    pub explain: ExplainConfig,

    /// Directory containing `<id>.json` lesson files.
    #[serde(default = "default_lessons_dir")]
    pub lessons_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            compiler: CompilerConfig::default(),
            llm: LlmConfig::default(),
            explain: ExplainConfig::default(),
            lessons_dir: default_lessons_dir(),
        }
    }
}

impl Config {
    /// Loads configuration from `tinker.json` in the current working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            TinkerError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `tinker.json` in `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// A missing file yields the default configuration.
    ///
    /// # Errors
    ///
    /// Returns `TinkerError::ConfigParseError` if the file cannot be read or
    /// contains invalid JSON or enum values, and
    /// `TinkerError::ConfigValidationError` if a value is out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(TinkerError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| TinkerError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `TinkerError::ConfigValidationError` for the first failing check.
    pub fn validate(&self) -> Result<()> {
        if self.compiler.program.trim().is_empty() {
            return Err(TinkerError::config_validation(
                "compiler.program must not be empty",
                "Set compiler.program to the arduino-cli executable in your tinker.json",
            ));
        }

        if self.compiler.timeout_seconds == 0 {
            return Err(TinkerError::config_validation(
                "compiler.timeoutSeconds must be greater than 0",
                "Set compiler.timeoutSeconds to at least 1 second in your tinker.json",
            ));
        }

        let base_url = self.llm.base_url.trim();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(TinkerError::config_validation(
                format!("llm.baseUrl must be an http(s) URL, got '{base_url}'"),
                "Set llm.baseUrl to e.g. http://localhost:11434 in your tinker.json",
            ));
        }

        if self.llm.model.trim().is_empty() {
            return Err(TinkerError::config_validation(
                "llm.model must not be empty",
                "Set llm.model to an installed model name in your tinker.json",
            ));
        }

        if self.explain.max_code_chars == 0 {
            return Err(TinkerError::config_validation(
                "explain.maxCodeChars must be greater than 0",
                "Set explain.maxCodeChars to at least 1 in your tinker.json",
            ));
        }

        if self.explain.max_diagnostics == 0 {
            return Err(TinkerError::config_validation(
                "explain.maxDiagnostics must be greater than 0",
                "Set explain.maxDiagnostics to at least 1 in your tinker.json",
            ));
        }

        if self.lessons_dir.trim().is_empty() {
            return Err(TinkerError::config_validation(
                "lessonsDir must not be empty",
                "Provide a lessons directory in your tinker.json (use '.' for the current directory)",
            ));
        }

        Ok(())
    }

    /// Returns the lessons directory as a path.
    #[must_use]
    pub fn lessons_path(&self) -> PathBuf {
        PathBuf::from(&self.lessons_dir)
    }
}

/// Compiler process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerConfig {
    /// Compiler executable.
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments inserted before `compile`.
    #[serde(default)]
    pub leading_args: Vec<String>,

    /// Wall-clock limit per compile in seconds.
    #[serde(default = "default_compile_timeout")]
    pub timeout_seconds: u64,

    /// Parent directory for sandboxes. Defaults to the system temp dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_root: Option<String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            leading_args: Vec::new(),
            timeout_seconds: default_compile_timeout(),
            sandbox_root: None,
        }
    }
}

impl CompilerConfig {
    /// Converts into the sandbox crate's settings.
    #[must_use]
    pub fn to_settings(&self) -> CompilerSettings {
        CompilerSettings {
            program: self.program.clone(),
            leading_args: self.leading_args.clone(),
            timeout: Duration::from_secs(self.timeout_seconds),
            sandbox_root: self.sandbox_root.as_ref().map(PathBuf::from),
        }
    }
}

/// Language model endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    /// Wire dialect spoken by the server.
    #[serde(default)]
    pub api: LlmApi,

    /// Server base URL, without the API path.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,

    /// Bearer token for OpenAI-compatible servers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api: LlmApi::default(),
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
        }
    }
}

/// Streaming chat dialects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LlmApi {
    /// Ollama `/api/chat`, newline-delimited JSON (default).
    #[default]
    Ollama,
    /// OpenAI-compatible `/v1/chat/completions`, server-sent events.
    OpenAi,
}

impl LlmApi {
    /// Parses a string into an `LlmApi`, case-insensitively.
    fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Some(Self::Ollama),
            "openai" => Some(Self::OpenAi),
            _ => None,
        }
    }

    /// Returns the chat endpoint path for this dialect.
    #[must_use]
    pub const fn chat_path(&self) -> &'static str {
        match self {
            Self::Ollama => "/api/chat",
            Self::OpenAi => "/v1/chat/completions",
        }
    }
}

impl<'de> Deserialize<'de> for LlmApi {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid LLM api '{s}': expected one of 'ollama', 'openai'"
            ))
        })
    }
}

impl Serialize for LlmApi {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let s = match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
        };
        serializer.serialize_str(s)
    }
}

/// Bounds on the explanation prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplainConfig {
    /// Characters of the sketch included verbatim.
    #[serde(default = "default_max_code_chars")]
    pub max_code_chars: usize,

    /// Lines shown before each diagnostic line.
    #[serde(default = "default_context_lines")]
    pub context_before: usize,

    /// Lines shown after each diagnostic line.
    #[serde(default = "default_context_lines")]
    pub context_after: usize,

    /// Diagnostics included in one prompt.
    #[serde(default = "default_max_diagnostics")]
    pub max_diagnostics: usize,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            max_code_chars: default_max_code_chars(),
            context_before: default_context_lines(),
            context_after: default_context_lines(),
            max_diagnostics: default_max_diagnostics(),
        }
    }
}
