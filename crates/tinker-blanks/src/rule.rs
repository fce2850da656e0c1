//! Answer rules attached to lesson blanks.
//!
//! Rules are authored offline (usually starting from the output of the
//! answer-key generator) and stored in lesson definitions as JSON:
//!
//! ```json
//! {
//!   "BAUD": { "type": "one_of", "values": ["9600", "115200"] },
//!   "PIN": { "type": "bound_identifier", "source": "LED_PIN" },
//!   "READ": { "type": "matches", "pattern": "analogRead\\s*\\(\\s*${SENSOR}\\s*\\)" }
//! }
//! ```

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[allow(clippy::expect_used)]
static REFERENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z0-9_:\-]+)\}").expect("reference pattern is valid"));

/// Validation policy for a single blank.
///
/// Serialized with a `type` tag. Unrecognized tags deserialize to
/// [`AnswerRule::Unknown`], which never accepts a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnswerRule {
    /// Candidate must equal the value after trimming.
    Equals {
        /// Expected value.
        value: String,
    },
    /// Candidate must equal one of the values after trimming.
    OneOf {
        /// Accepted values.
        values: Vec<String>,
    },
    /// Candidate must match the anchored pattern, and the optional set.
    ///
    /// The pattern may reference other blanks as `${NAME}`.
    Matches {
        /// Regular expression, implicitly anchored at both ends.
        pattern: String,
        /// Accepted values that must also contain the candidate.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        one_of: Option<Vec<String>>,
    },
    /// Candidate must equal the current value of another blank.
    BoundIdentifier {
        /// Name of the blank that defines the identifier.
        source: String,
    },
    /// A rule type this version does not understand.
    #[serde(other)]
    Unknown,
}

impl AnswerRule {
    /// Creates an [`AnswerRule::Equals`] rule.
    #[must_use]
    pub fn equals(value: impl Into<String>) -> Self {
        Self::Equals {
            value: value.into(),
        }
    }

    /// Creates an [`AnswerRule::OneOf`] rule.
    #[must_use]
    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::OneOf {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates an [`AnswerRule::Matches`] rule without a value set.
    #[must_use]
    pub fn matches(pattern: impl Into<String>) -> Self {
        Self::Matches {
            pattern: pattern.into(),
            one_of: None,
        }
    }

    /// Creates an [`AnswerRule::BoundIdentifier`] rule.
    #[must_use]
    pub fn bound(source: impl Into<String>) -> Self {
        Self::BoundIdentifier {
            source: source.into(),
        }
    }

    /// Returns the tag used when serializing this rule.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Equals { .. } => "equals",
            Self::OneOf { .. } => "one_of",
            Self::Matches { .. } => "matches",
            Self::BoundIdentifier { .. } => "bound_identifier",
            Self::Unknown => "unknown",
        }
    }

    /// Returns the names of the other blanks this rule reads.
    ///
    /// A bound identifier depends on its source; a pattern depends on every
    /// `${NAME}` it references.
    #[must_use]
    pub fn dependencies(&self) -> Vec<&str> {
        match self {
            Self::BoundIdentifier { source } => vec![source.as_str()],
            Self::Matches { pattern, .. } => pattern_references(pattern),
            Self::Equals { .. } | Self::OneOf { .. } | Self::Unknown => Vec::new(),
        }
    }
}

/// Returns the blank names referenced as `${NAME}` in `pattern`, in order.
#[must_use]
pub fn pattern_references(pattern: &str) -> Vec<&str> {
    REFERENCE_RE
        .captures_iter(pattern)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect()
}

/// Replaces `${NAME}` references with escaped values from `lookup`.
///
/// Returns `None` if any referenced blank has no value.
pub(crate) fn resolve_references<'v>(
    pattern: &str,
    lookup: impl Fn(&str) -> Option<&'v str>,
) -> Option<String> {
    let mut resolved = String::with_capacity(pattern.len());
    let mut cursor = 0;
    for caps in REFERENCE_RE.captures_iter(pattern) {
        let whole = caps.get(0)?;
        let name = caps.get(1)?.as_str();
        let value = lookup(name)?;
        resolved.push_str(&pattern[cursor..whole.start()]);
        resolved.push_str(&regex::escape(value.trim()));
        cursor = whole.end();
    }
    resolved.push_str(&pattern[cursor..]);
    Some(resolved)
}

/// The full set of rules for one lesson, keyed by blank name.
///
/// Holding the rules in a map guarantees exactly one rule per blank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerKey {
    rules: BTreeMap<String, AnswerRule>,
}

impl AnswerKey {
    /// Creates an empty answer key.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the rule for `blank`, replacing any previous rule.
    pub fn insert(&mut self, blank: impl Into<String>, rule: AnswerRule) -> Option<AnswerRule> {
        self.rules.insert(blank.into(), rule)
    }

    /// Adds a rule, builder style.
    #[must_use]
    pub fn with_rule(mut self, blank: impl Into<String>, rule: AnswerRule) -> Self {
        self.insert(blank, rule);
        self
    }

    /// Returns the rule for `blank`.
    #[must_use]
    pub fn get(&self, blank: &str) -> Option<&AnswerRule> {
        self.rules.get(blank)
    }

    /// Iterates over `(blank, rule)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AnswerRule)> {
        self.rules.iter().map(|(name, rule)| (name.as_str(), rule))
    }

    /// Returns the number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns `true` if the key has no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl FromIterator<(String, AnswerRule)> for AnswerKey {
    fn from_iter<T: IntoIterator<Item = (String, AnswerRule)>>(iter: T) -> Self {
        Self {
            rules: iter.into_iter().collect(),
        }
    }
}
