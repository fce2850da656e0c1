//! Blank extraction for lesson code templates.
//!
//! A template is ordinary sketch source containing placeholder markers of the
//! form `__BLANK[NAME]__`. Names consist of ASCII letters, digits, `_`, `:` or
//! `-`. Anything that does not match that exact shape (an unterminated
//! `__BLANK[`, an empty name, a stray bracket) is treated as plain text.
//!
//! # Example
//!
//! ```rust
//! use tinker_blanks::{extract_blanks, Template};
//!
//! let blanks = extract_blanks("pinMode(__BLANK[PIN]__, OUTPUT);");
//! assert_eq!(blanks.len(), 1);
//! assert_eq!(blanks[0].name, "PIN");
//!
//! let template = Template::parse("int a = __BLANK[X]__; int b = __BLANK[X]__;");
//! assert_eq!(template.blanks().len(), 1);
//! assert_eq!(template.occurrences().len(), 2);
//! ```

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Opening half of a blank marker.
pub const BLANK_OPEN: &str = "__BLANK[";

/// Closing half of a blank marker.
pub const BLANK_CLOSE: &str = "]__";

#[allow(clippy::expect_used)]
static BLANK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"__BLANK\[([A-Za-z0-9_:\-]+)\]__").expect("blank pattern is valid"));

/// A blank marker located in a template.
///
/// Offsets are byte offsets into the template and cover the whole marker,
/// including the `__BLANK[` and `]__` delimiters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlankToken {
    /// Name between the brackets.
    pub name: String,
    /// Byte offset of the first character of the marker.
    pub start: usize,
    /// Byte offset one past the last character of the marker.
    pub end: usize,
}

/// A single occurrence of a blank, borrowing its name from the template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlankSpan<'a> {
    /// Name between the brackets.
    pub name: &'a str,
    /// Byte offset of the first character of the marker.
    pub start: usize,
    /// Byte offset one past the last character of the marker.
    pub end: usize,
}

impl BlankSpan<'_> {
    /// Converts the borrowed span into an owned [`BlankToken`].
    #[must_use]
    pub fn to_token(&self) -> BlankToken {
        BlankToken {
            name: self.name.to_string(),
            start: self.start,
            end: self.end,
        }
    }
}

/// One piece of a template split at blank boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Literal template text (possibly empty between adjacent blanks).
    Text(&'a str),
    /// A blank occurrence.
    Blank(&'a str),
}

/// A parsed lesson template.
///
/// Parsing happens once; every accessor afterwards works on the stored spans
/// without re-scanning the source.
#[derive(Debug, Clone)]
pub struct Template<'a> {
    source: &'a str,
    occurrences: Vec<BlankSpan<'a>>,
}

impl<'a> Template<'a> {
    /// Parses `source`, recording every blank occurrence in source order.
    #[must_use]
    pub fn parse(source: &'a str) -> Self {
        let occurrences = BLANK_RE
            .captures_iter(source)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let name = caps.get(1)?;
                Some(BlankSpan {
                    name: name.as_str(),
                    start: whole.start(),
                    end: whole.end(),
                })
            })
            .collect();

        Self {
            source,
            occurrences,
        }
    }

    /// Returns the template source.
    #[must_use]
    pub const fn source(&self) -> &'a str {
        self.source
    }

    /// Returns every blank occurrence, including repeated names.
    #[must_use]
    pub fn occurrences(&self) -> &[BlankSpan<'a>] {
        &self.occurrences
    }

    /// Returns `true` if the template contains no blanks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.occurrences.is_empty()
    }

    /// Returns the distinct blanks in first-occurrence order.
    ///
    /// Repeated names collapse onto the position of their first occurrence.
    #[must_use]
    pub fn blanks(&self) -> Vec<BlankSpan<'a>> {
        let mut seen = HashSet::new();
        self.occurrences
            .iter()
            .filter(|span| seen.insert(span.name))
            .copied()
            .collect()
    }

    /// Splits the template into alternating text and blank segments.
    ///
    /// The result always starts and ends with a [`Segment::Text`], so a
    /// template with `n` blank occurrences yields `2n + 1` segments.
    #[must_use]
    pub fn segments(&self) -> Vec<Segment<'a>> {
        let mut segments = Vec::with_capacity(self.occurrences.len() * 2 + 1);
        let mut cursor = 0;
        for span in &self.occurrences {
            segments.push(Segment::Text(&self.source[cursor..span.start]));
            segments.push(Segment::Blank(span.name));
            cursor = span.end;
        }
        segments.push(Segment::Text(&self.source[cursor..]));
        segments
    }

    /// Replaces every blank occurrence with its value from `values`.
    ///
    /// Blanks without a value are left as their original marker.
    #[must_use]
    pub fn substitute(&self, values: &HashMap<String, String>) -> String {
        let mut output = String::with_capacity(self.source.len());
        let mut cursor = 0;
        for span in &self.occurrences {
            output.push_str(&self.source[cursor..span.start]);
            match values.get(span.name) {
                Some(value) => output.push_str(value),
                None => output.push_str(&self.source[span.start..span.end]),
            }
            cursor = span.end;
        }
        output.push_str(&self.source[cursor..]);
        output
    }
}

/// Extracts the distinct blanks of `template` in first-occurrence order.
#[must_use]
pub fn extract_blanks(template: &str) -> Vec<BlankToken> {
    Template::parse(template)
        .blanks()
        .iter()
        .map(BlankSpan::to_token)
        .collect()
}

/// Formats a blank marker for `name`.
#[must_use]
pub fn blank_marker(name: &str) -> String {
    format!("{BLANK_OPEN}{name}{BLANK_CLOSE}")
}
