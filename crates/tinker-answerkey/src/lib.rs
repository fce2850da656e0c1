//! Tinker Answer-Key Generation
//!
//! Lesson authors write a template with blanks and a solved sketch. The
//! inferencer in `tinker-blanks` recovers what each blank held; this crate
//! turns those values into answer rules an author can paste into a lesson.
//!
//! # Types
//!
//! - [`AnswerKeyDraft`] - generated rules and unresolved blanks, in blank order
//! - [`DraftEntry`] - one blank's outcome
//! - [`Overrides`] - per-blank binding and kind overrides
//! - [`ValueKind`] - forced classification for a blank
//! - [`RuleClass`] - which classification produced a rule
//!
//! # Generators
//!
//! - [`json::JsonGenerator`] - machine-readable rule set, compact or pretty
//! - [`SourceGenerator`] - an `answers` object literal for lesson sources
//!
//! # Example
//!
//! ```rust
//! use tinker_answerkey::{AnswerKeyDraft, Overrides, SourceGenerator};
//!
//! let inferred = tinker_blanks::infer(
//!     "Serial.begin(__BLANK[BAUD]__);",
//!     "Serial.begin(9600);",
//! );
//! let draft = AnswerKeyDraft::build(&inferred, &Overrides::default());
//!
//! let source = SourceGenerator::new(&draft).generate();
//! assert!(source.contains(r#"BAUD: { type: "one_of", values: ["9600", "0x2580"] },"#));
//! ```

pub mod classify;
pub mod json;
mod source;

pub use source::SourceGenerator;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tinker_blanks::{AnswerKey, AnswerRule, InferredBlank, NO_VALUE_WARNING};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while producing answer-key output.
#[derive(Debug, Error)]
pub enum SnippetError {
    /// Failed to serialize the rule set.
    #[error("failed to serialize answer key: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to write the output file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An override could not be parsed.
    #[error("invalid override '{0}': expected NAME=VALUE")]
    InvalidOverride(String),

    /// A kind override named an unknown kind.
    #[error("unknown kind '{0}': expected auto, id, num or str")]
    UnknownKind(String),
}

/// Result type for answer-key operations.
pub type Result<T> = std::result::Result<T, SnippetError>;

// ============================================================================
// Overrides
// ============================================================================

/// Forced classification for a blank's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueKind {
    /// Classify from the value itself.
    #[default]
    Auto,
    /// Treat the value as an identifier.
    Id,
    /// Treat the value as a number.
    Num,
    /// Treat the value as a string literal.
    Str,
}

impl ValueKind {
    /// Returns the lowercase name used in overrides and JSON.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Id => "id",
            Self::Num => "num",
            Self::Str => "str",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueKind {
    type Err = SnippetError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "id" => Ok(Self::Id),
            "num" => Ok(Self::Num),
            "str" => Ok(Self::Str),
            _ => Err(SnippetError::UnknownKind(s.to_string())),
        }
    }
}

// Case-insensitive, like the rest of the authoring inputs.
impl<'de> Deserialize<'de> for ValueKind {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl Serialize for ValueKind {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// Per-blank overrides supplied by the author.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overrides {
    /// Blank name to the blank whose value it must repeat.
    #[serde(default)]
    pub bind: BTreeMap<String, String>,
    /// Blank name to a forced kind.
    #[serde(default)]
    pub kind: BTreeMap<String, ValueKind>,
}

impl Overrides {
    /// Adds a binding override, builder style.
    #[must_use]
    pub fn with_bind(mut self, blank: impl Into<String>, source: impl Into<String>) -> Self {
        self.bind.insert(blank.into(), source.into());
        self
    }

    /// Adds a kind override, builder style.
    #[must_use]
    pub fn with_kind(mut self, blank: impl Into<String>, kind: ValueKind) -> Self {
        self.kind.insert(blank.into(), kind);
        self
    }

    /// Parses a `NAME=SOURCE` binding argument.
    ///
    /// # Errors
    ///
    /// Returns [`SnippetError::InvalidOverride`] if either side is empty.
    pub fn parse_bind(arg: &str) -> Result<(String, String)> {
        split_pair(arg)
    }

    /// Parses a `NAME=KIND` kind argument.
    ///
    /// # Errors
    ///
    /// Returns [`SnippetError::InvalidOverride`] for a malformed pair or
    /// [`SnippetError::UnknownKind`] for an unknown kind.
    pub fn parse_kind(arg: &str) -> Result<(String, ValueKind)> {
        let (name, kind) = split_pair(arg)?;
        Ok((name, kind.parse()?))
    }
}

fn split_pair(arg: &str) -> Result<(String, String)> {
    match arg.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() && !value.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(SnippetError::InvalidOverride(arg.to_string())),
    }
}

// ============================================================================
// Draft
// ============================================================================

/// Which classification produced a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleClass {
    /// Bound to another blank by override.
    Binding,
    /// Numeric literal.
    Number,
    /// Quoted string or character literal.
    StringLiteral,
    /// Bare identifier.
    Identifier,
    /// Anything else, matched as a code expression.
    Structural,
}

impl RuleClass {
    /// Returns the snake-case label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Binding => "binding",
            Self::Number => "number",
            Self::StringLiteral => "string_literal",
            Self::Identifier => "identifier",
            Self::Structural => "structural",
        }
    }
}

/// A rule generated for one blank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedRule {
    /// Name of the blank.
    pub blank: String,
    /// The inferred value the rule was built from.
    pub value: String,
    /// How the value was classified.
    pub class: RuleClass,
    /// The generated rule.
    pub rule: AnswerRule,
    /// Inference warning carried over, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// A blank that could not be given a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedBlank {
    /// Name of the blank.
    pub blank: String,
    /// Why no value was inferred.
    pub warning: String,
}

/// Outcome for one blank, in template order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DraftEntry {
    /// A rule was generated.
    Rule(GeneratedRule),
    /// No value was inferred; nothing is guessed.
    Unresolved(UnresolvedBlank),
}

impl DraftEntry {
    /// Returns the blank name.
    #[must_use]
    pub fn blank(&self) -> &str {
        match self {
            Self::Rule(rule) => &rule.blank,
            Self::Unresolved(unresolved) => &unresolved.blank,
        }
    }
}

/// Generated answer key for a lesson, before it is pasted into the lesson.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerKeyDraft {
    /// One entry per blank, in first-occurrence order.
    pub entries: Vec<DraftEntry>,
}

impl AnswerKeyDraft {
    /// Builds rules for every inferred blank.
    ///
    /// Binding overrides win over everything else. Otherwise a forced kind
    /// selects the rule shape directly, and `auto` classifies the value.
    /// Blanks with `ok = false` become [`DraftEntry::Unresolved`].
    #[must_use]
    pub fn build(inferred: &[InferredBlank], overrides: &Overrides) -> Self {
        let bindings = binding_sources(inferred, overrides);

        let entries = inferred
            .iter()
            .map(|blank| {
                if !blank.ok {
                    return DraftEntry::Unresolved(UnresolvedBlank {
                        blank: blank.name.clone(),
                        warning: blank
                            .warning
                            .clone()
                            .unwrap_or_else(|| NO_VALUE_WARNING.to_string()),
                    });
                }

                let (class, rule) = match overrides.bind.get(&blank.name) {
                    Some(source) => (RuleClass::Binding, AnswerRule::bound(source.as_str())),
                    None => {
                        let class = match overrides.kind.get(&blank.name).copied().unwrap_or_default() {
                            ValueKind::Auto => classify::classify(&blank.value),
                            ValueKind::Id => RuleClass::Identifier,
                            ValueKind::Num => RuleClass::Number,
                            ValueKind::Str => RuleClass::StringLiteral,
                        };
                        (class, classify::rule_for(class, &blank.value, &bindings))
                    }
                };

                DraftEntry::Rule(GeneratedRule {
                    blank: blank.name.clone(),
                    value: blank.value.clone(),
                    class,
                    rule,
                    warning: blank.warning.clone(),
                })
            })
            .collect();

        Self { entries }
    }

    /// Returns the generated rules.
    pub fn rules(&self) -> impl Iterator<Item = &GeneratedRule> {
        self.entries.iter().filter_map(|entry| match entry {
            DraftEntry::Rule(rule) => Some(rule),
            DraftEntry::Unresolved(_) => None,
        })
    }

    /// Returns the blanks left without a rule.
    pub fn unresolved(&self) -> impl Iterator<Item = &UnresolvedBlank> {
        self.entries.iter().filter_map(|entry| match entry {
            DraftEntry::Rule(_) => None,
            DraftEntry::Unresolved(unresolved) => Some(unresolved),
        })
    }

    /// Collects the generated rules into an [`AnswerKey`].
    #[must_use]
    pub fn answer_key(&self) -> AnswerKey {
        self.rules()
            .map(|generated| (generated.blank.clone(), generated.rule.clone()))
            .collect()
    }
}

/// Maps identifier values of bound-to blanks to the blank name.
///
/// Only blanks that another blank is bound to, and whose own value is a
/// resolved identifier, take part.
fn binding_sources(inferred: &[InferredBlank], overrides: &Overrides) -> HashMap<String, String> {
    overrides
        .bind
        .values()
        .filter_map(|source| inferred.iter().find(|blank| &blank.name == source))
        .filter(|blank| blank.ok && classify::is_identifier(&blank.value))
        .map(|blank| (blank.value.clone(), blank.name.clone()))
        .collect()
}
