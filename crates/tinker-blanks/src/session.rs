//! Live answer checking with explicit cross-blank dependencies.
//!
//! A [`BlankSession`] holds the values a student has typed so far. Rules that
//! read other blanks (bound identifiers, `${NAME}` pattern references) are
//! recorded as edges `source -> dependent`; whenever a value changes, the
//! changed blank and everything downstream of it is re-evaluated. The final
//! verdicts therefore do not depend on the order in which blanks are filled.
//!
//! # Example
//!
//! ```rust
//! use tinker_blanks::{AnswerKey, AnswerRule, BlankSession};
//!
//! let key = AnswerKey::new()
//!     .with_rule("PIN", AnswerRule::one_of(["13", "LED_BUILTIN"]))
//!     .with_rule("WRITE_PIN", AnswerRule::bound("PIN"));
//! let mut session = BlankSession::new(key);
//!
//! session.set_value("WRITE_PIN", "13");
//! let changed = session.set_value("PIN", "13");
//!
//! assert_eq!(changed.len(), 2);
//! assert!(changed.iter().all(|v| v.correct));
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use tracing::debug;

use crate::matcher::{check, Verdict};
use crate::rule::AnswerKey;

/// Tracks student values for one lesson and keeps verdicts current.
#[derive(Debug, Clone)]
pub struct BlankSession {
    key: AnswerKey,
    values: HashMap<String, String>,
    dependents: BTreeMap<String, BTreeSet<String>>,
    verdicts: BTreeMap<String, bool>,
}

impl BlankSession {
    /// Creates a session for `key` with every blank empty.
    #[must_use]
    pub fn new(key: AnswerKey) -> Self {
        let mut dependents: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (blank, rule) in key.iter() {
            for source in rule.dependencies() {
                dependents
                    .entry(source.to_string())
                    .or_default()
                    .insert(blank.to_string());
            }
        }

        let mut session = Self {
            key,
            values: HashMap::new(),
            dependents,
            verdicts: BTreeMap::new(),
        };
        let blanks: Vec<String> = session.key.iter().map(|(b, _)| b.to_string()).collect();
        for blank in blanks {
            session.evaluate(&blank);
        }
        session
    }

    /// Creates a session and applies `values` in iteration order.
    #[must_use]
    pub fn with_values<I, K, V>(key: AnswerKey, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut session = Self::new(key);
        for (blank, value) in values {
            session.set_value(blank, value);
        }
        session
    }

    /// Records a new value for `blank` and re-evaluates it and its dependents.
    ///
    /// Returns the verdict of every blank that was re-evaluated, starting with
    /// `blank` itself (when it has a rule) and continuing breadth-first along
    /// the dependency edges. Each blank appears at most once.
    pub fn set_value(&mut self, blank: impl Into<String>, value: impl Into<String>) -> Vec<Verdict> {
        let blank = blank.into();
        self.values.insert(blank.clone(), value.into());

        let mut queue = VecDeque::from([blank]);
        let mut visited = HashSet::new();
        let mut changed = Vec::new();

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(correct) = self.evaluate(&current) {
                changed.push(Verdict::new(current.as_str(), correct));
            }
            if let Some(next) = self.dependents.get(&current) {
                queue.extend(next.iter().cloned());
            }
        }

        debug!(reevaluated = changed.len(), "Blank value updated");
        changed
    }

    /// Returns the current value of `blank`.
    #[must_use]
    pub fn value(&self, blank: &str) -> Option<&str> {
        self.values.get(blank).map(String::as_str)
    }

    /// Returns the blanks whose rules read `blank`.
    #[must_use]
    pub fn dependents_of(&self, blank: &str) -> Vec<&str> {
        self.dependents
            .get(blank)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Returns the verdict of every blank with a rule, in name order.
    #[must_use]
    pub fn verdicts(&self) -> Vec<Verdict> {
        self.verdicts
            .iter()
            .map(|(blank, correct)| Verdict::new(blank.as_str(), *correct))
            .collect()
    }

    /// Returns `true` if every blank with a rule is currently correct.
    #[must_use]
    pub fn all_correct(&self) -> bool {
        self.verdicts.values().all(|correct| *correct)
    }

    fn evaluate(&mut self, blank: &str) -> Option<bool> {
        let rule = self.key.get(blank)?;
        let candidate = self.values.get(blank).map_or("", String::as_str);
        let correct = check(blank, candidate, rule, &self.values);
        self.verdicts.insert(blank.to_string(), correct);
        Some(correct)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::rule::AnswerRule;

    fn define_then_reuse_key() -> AnswerKey {
        AnswerKey::new()
            .with_rule("SENSOR_PIN", AnswerRule::one_of(["A0", "A1"]))
            .with_rule("READ_PIN", AnswerRule::bound("SENSOR_PIN"))
            .with_rule(
                "READ",
                AnswerRule::matches(r"analogRead\(\s*${READ_PIN}\s*\)"),
            )
    }

    #[test]
    fn dependents_are_recorded_per_source() {
        let session = BlankSession::new(define_then_reuse_key());
        assert_eq!(session.dependents_of("SENSOR_PIN"), vec!["READ_PIN"]);
        assert_eq!(session.dependents_of("READ_PIN"), vec!["READ"]);
        assert!(session.dependents_of("READ").is_empty());
    }

    #[test]
    fn source_change_reevaluates_dependents_transitively() {
        let mut session = BlankSession::new(define_then_reuse_key());
        session.set_value("READ_PIN", "A1");
        session.set_value("READ", "analogRead(A1)");
        assert!(!session.all_correct());

        let changed = session.set_value("SENSOR_PIN", "A1");
        let names: Vec<_> = changed.iter().map(|v| v.blank.as_str()).collect();
        assert_eq!(names, vec!["SENSOR_PIN", "READ_PIN", "READ"]);
        assert!(session.all_correct());

        let changed = session.set_value("SENSOR_PIN", "A0");
        assert_eq!(
            changed,
            vec![
                Verdict::new("SENSOR_PIN", true),
                Verdict::new("READ_PIN", false),
                Verdict::new("READ", true),
            ]
        );
    }

    #[test]
    fn fill_order_does_not_change_final_verdicts() {
        let forward = BlankSession::with_values(
            define_then_reuse_key(),
            [
                ("SENSOR_PIN", "A0"),
                ("READ_PIN", "A0"),
                ("READ", "analogRead(A0)"),
            ],
        );
        let backward = BlankSession::with_values(
            define_then_reuse_key(),
            [
                ("READ", "analogRead(A0)"),
                ("READ_PIN", "A0"),
                ("SENSOR_PIN", "A0"),
            ],
        );

        assert_eq!(forward.verdicts(), backward.verdicts());
        assert!(forward.all_correct());
    }

    #[test]
    fn cyclic_bindings_terminate() {
        let key = AnswerKey::new()
            .with_rule("A", AnswerRule::bound("B"))
            .with_rule("B", AnswerRule::bound("A"));
        let mut session = BlankSession::new(key);

        let changed = session.set_value("A", "x");
        assert_eq!(changed.len(), 2);
        let changed = session.set_value("B", "x");
        assert_eq!(changed.len(), 2);
        assert!(session.all_correct());
    }

    #[test]
    fn values_for_blanks_without_rules_still_notify_dependents() {
        let key = AnswerKey::new().with_rule("USE", AnswerRule::bound("FREE"));
        let mut session = BlankSession::new(key);

        let changed = session.set_value("FREE", "led");
        assert_eq!(changed, vec![Verdict::new("USE", false)]);
        assert_eq!(session.value("FREE"), Some("led"));
    }

    #[test]
    fn new_session_starts_with_empty_verdicts() {
        let key = AnswerKey::new()
            .with_rule("A", AnswerRule::equals("1"))
            .with_rule("B", AnswerRule::equals(""));
        let session = BlankSession::new(key);

        assert_eq!(
            session.verdicts(),
            vec![Verdict::new("A", false), Verdict::new("B", true)]
        );
    }
}
