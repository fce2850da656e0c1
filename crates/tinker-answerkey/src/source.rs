//! Lesson-source generation for answer-key drafts.
//!
//! [`SourceGenerator`] renders a draft as an `answers` object literal that can
//! be pasted straight into a lesson definition. Blanks without an inferred
//! value appear only as comments so that nothing is guessed.
//!
//! # Example
//!
//! ```rust
//! use tinker_answerkey::{AnswerKeyDraft, Overrides, SourceGenerator};
//! use tinker_blanks::InferredBlank;
//!
//! let inferred = vec![InferredBlank::resolved("LEVEL", "HIGH")];
//! let draft = AnswerKeyDraft::build(&inferred, &Overrides::default());
//!
//! let source = SourceGenerator::new(&draft).generate();
//! assert!(source.contains(r#"LEVEL: { type: "equals", value: "HIGH" },"#));
//! ```

use std::fmt::Write;

use tinker_blanks::AnswerRule;

use crate::{AnswerKeyDraft, DraftEntry};

const INDENT: &str = "  ";

/// Renders an [`AnswerKeyDraft`] as lesson source.
pub struct SourceGenerator<'a> {
    draft: &'a AnswerKeyDraft,
}

impl<'a> SourceGenerator<'a> {
    /// Creates a generator for the given draft.
    #[must_use]
    pub const fn new(draft: &'a AnswerKeyDraft) -> Self {
        Self { draft }
    }

    /// Generates the `answers: { ... },` block.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "answers: {{");

        for entry in &self.draft.entries {
            match entry {
                DraftEntry::Rule(generated) => {
                    let _ = write!(
                        output,
                        "{INDENT}{}: {}, // {}",
                        object_key(&generated.blank),
                        rule_literal(&generated.rule),
                        generated.class.as_str()
                    );
                    if let Some(warning) = &generated.warning {
                        let _ = write!(output, "; check: {warning}");
                    }
                    let _ = writeln!(output);
                }
                DraftEntry::Unresolved(unresolved) => {
                    let _ = writeln!(
                        output,
                        "{INDENT}// {}: unresolved ({})",
                        object_key(&unresolved.blank),
                        unresolved.warning
                    );
                }
            }
        }

        let _ = writeln!(output, "}},");
        output
    }
}

/// Renders a rule as an object literal.
fn rule_literal(rule: &AnswerRule) -> String {
    match rule {
        AnswerRule::Equals { value } => {
            format!("{{ type: \"equals\", value: {} }}", quote(value))
        }
        AnswerRule::OneOf { values } => {
            format!("{{ type: \"one_of\", values: {} }}", quote_list(values))
        }
        AnswerRule::Matches { pattern, one_of } => match one_of {
            Some(values) => format!(
                "{{ type: \"matches\", pattern: {}, one_of: {} }}",
                quote(pattern),
                quote_list(values)
            ),
            None => format!("{{ type: \"matches\", pattern: {} }}", quote(pattern)),
        },
        AnswerRule::BoundIdentifier { source } => {
            format!("{{ type: \"bound_identifier\", source: {} }}", quote(source))
        }
        AnswerRule::Unknown => "{ type: \"unknown\" }".to_string(),
    }
}

/// Blank names are bare keys when they are plain identifiers.
fn object_key(name: &str) -> String {
    let plain = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        name.to_string()
    } else {
        quote(name)
    }
}

fn quote_list(values: &[String]) -> String {
    let items: Vec<String> = values.iter().map(|v| quote(v)).collect();
    format!("[{}]", items.join(", "))
}

/// Double-quotes `s`, escaping as a JavaScript string literal.
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
