//! Recovering blank values from a solved reference sketch.
//!
//! Lesson authors write a template with blanks and a fully solved version of
//! the same sketch. [`infer`] lines the two up and reports what each blank
//! must have contained.
//!
//! The walk is deliberately forgiving. Template text that does not appear at
//! the cursor is searched for further ahead and the cursor jumps there without
//! a warning; a blank whose closing text cannot be found swallows the rest of
//! the solved code and is flagged but kept. Only when template text is missing
//! altogether does inference stop, leaving the remaining blanks unresolved.
//!
//! Known limitation: when the same literal text appears several times in the
//! solved code, realignment lands on the nearest occurrence after the cursor,
//! which is not necessarily the intended one.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::template::{Segment, Template};

/// Warning attached to blanks that inference never reached.
pub const NO_VALUE_WARNING: &str = "No value inferred.";

/// Warning attached to blanks after the solved code stopped lining up.
pub const ALIGNMENT_WARNING: &str = "Could not reliably align solved code with template";

/// Warning attached to a blank whose closing text was not found.
pub const BOUNDARY_WARNING: &str =
    "Text following this blank was not found in the solved code; used the remainder";

/// The value recovered for one blank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferredBlank {
    /// Name of the blank.
    pub name: String,
    /// Recovered value, trimmed. Empty when `ok` is `false`.
    pub value: String,
    /// Whether a value was recovered.
    pub ok: bool,
    /// Why the value is missing or uncertain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl InferredBlank {
    /// Creates an unresolved entry with the given warning.
    #[must_use]
    pub fn unresolved(name: impl Into<String>, warning: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: String::new(),
            ok: false,
            warning: Some(warning.into()),
        }
    }

    /// Creates a resolved entry.
    #[must_use]
    pub fn resolved(name: impl Into<String>, value: &str) -> Self {
        Self {
            name: name.into(),
            value: value.trim().to_string(),
            ok: true,
            warning: None,
        }
    }

    /// Attaches a warning, builder style.
    #[must_use]
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }
}

/// Infers blank values by aligning `solved` against `template`.
///
/// Returns one entry per distinct blank in first-occurrence order. A template
/// without blanks returns an empty vector without looking at `solved`.
#[must_use]
pub fn infer(template: &str, solved: &str) -> Vec<InferredBlank> {
    let parsed = Template::parse(template);
    if parsed.is_empty() {
        return Vec::new();
    }

    let order: Vec<&str> = parsed.blanks().iter().map(|span| span.name).collect();
    let mut results: HashMap<&str, InferredBlank> = order
        .iter()
        .map(|name| (*name, InferredBlank::unresolved(*name, NO_VALUE_WARNING)))
        .collect();

    let (texts, blanks) = split_segments(&parsed.segments());
    let mut pos = 0;

    for (index, blank) in blanks.iter().enumerate() {
        let before = texts[index];
        match align(solved, pos, before) {
            Some(next) => pos = next,
            None => {
                debug!(blank = %blank, "Lost alignment with solved code");
                for entry in results.values_mut().filter(|entry| !entry.ok) {
                    entry.warning = Some(ALIGNMENT_WARNING.to_string());
                }
                break;
            }
        }

        let following = texts[index + 1..].iter().find(|text| !text.is_empty());
        let entry = match following {
            Some(text) => match solved[pos..].find(*text) {
                Some(offset) => {
                    let value = &solved[pos..pos + offset];
                    pos += offset;
                    InferredBlank::resolved(*blank, value)
                }
                None => {
                    let value = &solved[pos..];
                    pos = solved.len();
                    InferredBlank::resolved(*blank, value).with_warning(BOUNDARY_WARNING)
                }
            },
            None => {
                let value = &solved[pos..];
                pos = solved.len();
                InferredBlank::resolved(*blank, value)
            }
        };

        if let Some(slot) = results.get_mut(blank) {
            if !slot.ok {
                *slot = entry;
            }
        }
    }

    order
        .into_iter()
        .filter_map(|name| results.remove(name))
        .collect()
}

/// Splits alternating segments into the text pieces and the blank names.
///
/// `texts` always has exactly one more element than `blanks`.
fn split_segments<'a>(segments: &[Segment<'a>]) -> (Vec<&'a str>, Vec<&'a str>) {
    let mut texts = Vec::with_capacity(segments.len() / 2 + 1);
    let mut blanks = Vec::with_capacity(segments.len() / 2);
    for segment in segments {
        match segment {
            Segment::Text(text) => texts.push(*text),
            Segment::Blank(name) => blanks.push(*name),
        }
    }
    (texts, blanks)
}

/// Consumes `text` at or after `pos`, returning the cursor after it.
fn align(solved: &str, pos: usize, text: &str) -> Option<usize> {
    if text.is_empty() {
        return Some(pos);
    }
    let rest = &solved[pos..];
    if rest.starts_with(text) {
        return Some(pos + text.len());
    }
    rest.find(text).map(|offset| pos + offset + text.len())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::template::Template;

    fn by_name<'a>(inferred: &'a [InferredBlank], name: &str) -> &'a InferredBlank {
        inferred.iter().find(|b| b.name == name).unwrap()
    }

    #[test]
    fn infers_single_blank() {
        let inferred = infer("Serial.begin(__BLANK[BAUD]__);", "Serial.begin(9600);");
        assert_eq!(inferred, vec![InferredBlank::resolved("BAUD", "9600")]);
    }

    #[test]
    fn infers_multiple_blanks_in_first_occurrence_order() {
        let template = "void setup() {\n  pinMode(__BLANK[PIN]__, __BLANK[MODE]__);\n}\n\
                        void loop() {\n  digitalWrite(__BLANK[PIN]__, __BLANK[LEVEL]__);\n}\n";
        let solved = "void setup() {\n  pinMode(13, OUTPUT);\n}\n\
                      void loop() {\n  digitalWrite(13, HIGH);\n}\n";
        let inferred = infer(template, solved);

        let names: Vec<_> = inferred.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["PIN", "MODE", "LEVEL"]);
        assert!(inferred.iter().all(|b| b.ok && b.warning.is_none()));
        assert_eq!(by_name(&inferred, "PIN").value, "13");
        assert_eq!(by_name(&inferred, "MODE").value, "OUTPUT");
        assert_eq!(by_name(&inferred, "LEVEL").value, "HIGH");
    }

    #[test]
    fn values_are_trimmed() {
        let inferred = infer("x = __BLANK[V]__;", "x =   42  ;");
        assert_eq!(by_name(&inferred, "V").value, "42");
    }

    #[test]
    fn trailing_blank_consumes_rest_without_warning() {
        let inferred = infer("int n = __BLANK[TAIL]__", "int n = analogRead(A0);\n");
        assert_eq!(inferred, vec![InferredBlank::resolved("TAIL", "analogRead(A0);")]);
    }

    #[test]
    fn missing_following_text_takes_remainder_with_warning() {
        let inferred = infer("delay(__BLANK[MS]__);", "delay(500)");
        let entry = by_name(&inferred, "MS");

        assert!(entry.ok);
        assert_eq!(entry.value, "500)");
        assert_eq!(entry.warning.as_deref(), Some(BOUNDARY_WARNING));
    }

    #[test]
    fn misaligned_prefix_realigns_silently() {
        let inferred = infer(
            "Serial.begin(__BLANK[BAUD]__);",
            "// solved\nSerial.begin(115200);",
        );
        assert_eq!(inferred, vec![InferredBlank::resolved("BAUD", "115200")]);
    }

    #[test]
    fn lost_alignment_marks_remaining_blanks() {
        let template = "a(__BLANK[X]__); b(__BLANK[Y]__); c(__BLANK[Z]__);";
        let solved = "a(1); b(2); r(3);";
        let inferred = infer(template, solved);

        let x = by_name(&inferred, "X");
        assert!(x.ok);
        assert_eq!(x.value, "1");
        assert!(x.warning.is_none());

        let y = by_name(&inferred, "Y");
        assert!(y.ok);
        assert_eq!(y.value, "2); r(3);");
        assert_eq!(y.warning.as_deref(), Some(BOUNDARY_WARNING));

        let z = by_name(&inferred, "Z");
        assert!(!z.ok);
        assert!(z.value.is_empty());
        assert_eq!(z.warning.as_deref(), Some(ALIGNMENT_WARNING));
    }

    #[test]
    fn unmatched_leading_text_fails_every_blank() {
        let inferred = infer("setup(__BLANK[A]__); loop(__BLANK[B]__);", "begin(1);");

        assert_eq!(inferred.len(), 2);
        for entry in &inferred {
            assert!(!entry.ok);
            assert_eq!(entry.warning.as_deref(), Some(ALIGNMENT_WARNING));
        }
    }

    #[test]
    fn empty_template_returns_empty() {
        assert!(infer("void loop() {}", "anything at all").is_empty());
        assert!(infer("", "").is_empty());
    }

    #[test]
    fn adjacent_blanks_give_first_blank_the_span() {
        let inferred = infer("x(__BLANK[A]____BLANK[B]__);", "x(12);");
        assert_eq!(by_name(&inferred, "A").value, "12");
        assert!(by_name(&inferred, "B").ok);
        assert_eq!(by_name(&inferred, "B").value, "");
    }

    #[test]
    fn round_trip_recovers_substituted_values() {
        let template = "#define LED __BLANK[LED]__\nvoid setup() { Serial.begin(__BLANK[BAUD]__); }\n\
                        void loop() { int v = analogRead(__BLANK[SENSOR]__); delay(__BLANK[MS]__); }";
        let values: HashMap<String, String> = [
            ("LED", "13"),
            ("BAUD", "9600"),
            ("SENSOR", "A0"),
            ("MS", "250"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let solved = Template::parse(template).substitute(&values);

        let inferred = infer(template, &solved);
        assert_eq!(inferred.len(), 4);
        for entry in &inferred {
            assert!(entry.ok, "{} not ok", entry.name);
            assert_eq!(&entry.value, &values[&entry.name]);
        }
    }

    #[test]
    fn inference_is_idempotent() {
        let template = "a(__BLANK[X]__); b(__BLANK[Y]__);";
        let solved = "a(1); zz b(2);";
        assert_eq!(infer(template, solved), infer(template, solved));
    }

    #[test]
    fn repeated_blank_keeps_first_value() {
        let inferred = infer(
            "int __BLANK[N]__ = 0; __BLANK[N]__++;",
            "int count = 0; count++;",
        );
        assert_eq!(inferred, vec![InferredBlank::resolved("N", "count")]);
    }

    #[test]
    fn warning_is_omitted_from_json_when_absent() {
        let json = serde_json::to_string(&InferredBlank::resolved("A", "1")).unwrap();
        assert_eq!(json, r#"{"name":"A","value":"1","ok":true}"#);
    }
}
