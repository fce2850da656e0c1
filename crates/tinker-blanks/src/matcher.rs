//! Evaluation of student answers against answer rules.
//!
//! [`check`] runs on every keystroke in the lesson UI, so it never panics and
//! never returns an error: anything it cannot evaluate counts as incorrect.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::rule::{resolve_references, AnswerKey, AnswerRule};

/// Outcome of checking one blank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Name of the blank.
    pub blank: String,
    /// Whether the current value satisfies the blank's rule.
    pub correct: bool,
}

impl Verdict {
    /// Creates a verdict.
    #[must_use]
    pub fn new(blank: impl Into<String>, correct: bool) -> Self {
        Self {
            blank: blank.into(),
            correct,
        }
    }
}

/// Checks `candidate` for `blank` against `rule`.
///
/// Comparisons trim both sides and are case-sensitive. `current_values`
/// supplies the values of other blanks for bound identifiers and `${NAME}`
/// pattern references; a missing referent makes the check fail.
#[must_use]
pub fn check(
    blank: &str,
    candidate: &str,
    rule: &AnswerRule,
    current_values: &HashMap<String, String>,
) -> bool {
    let candidate = candidate.trim();
    match rule {
        AnswerRule::Equals { value } => candidate == value.trim(),
        AnswerRule::OneOf { values } => in_set(candidate, values),
        AnswerRule::Matches { pattern, one_of } => {
            let set_ok = one_of
                .as_ref()
                .map_or(true, |values| in_set(candidate, values));
            set_ok && pattern_matches(blank, candidate, pattern, current_values)
        }
        AnswerRule::BoundIdentifier { source } => current_values
            .get(source)
            .is_some_and(|bound| candidate == bound.trim()),
        AnswerRule::Unknown => {
            warn!(blank = %blank, "Unknown rule type, treating answer as incorrect");
            false
        }
    }
}

/// Checks every rule in `key` against `values`.
///
/// Blanks without a value are checked as empty strings. Verdicts follow the
/// key's name order.
#[must_use]
pub fn check_all(key: &AnswerKey, values: &HashMap<String, String>) -> Vec<Verdict> {
    key.iter()
        .map(|(blank, rule)| {
            let candidate = values.get(blank).map_or("", String::as_str);
            Verdict::new(blank, check(blank, candidate, rule, values))
        })
        .collect()
}

fn in_set(candidate: &str, values: &[String]) -> bool {
    values.iter().any(|value| value.trim() == candidate)
}

fn pattern_matches(
    blank: &str,
    candidate: &str,
    pattern: &str,
    current_values: &HashMap<String, String>,
) -> bool {
    let Some(resolved) = resolve_references(pattern, |name| {
        current_values.get(name).map(String::as_str)
    }) else {
        return false;
    };

    match Regex::new(&format!("^(?:{resolved})$")) {
        Ok(re) => re.is_match(candidate),
        Err(e) => {
            warn!(blank = %blank, pattern = %pattern, error = %e, "Invalid answer pattern");
            false
        }
    }
}
