//! JSON output for answer-key drafts.
//!
//! The JSON form is what lesson files store: `rules` is an answer key that
//! `tinker-blanks` deserializes directly, and `unresolved` lists the blanks
//! the author still has to fill in by hand.
//!
//! # Example
//!
//! ```rust
//! use tinker_answerkey::{AnswerKeyDraft, Overrides};
//! use tinker_answerkey::json::JsonGenerator;
//! use tinker_blanks::InferredBlank;
//!
//! let inferred = vec![InferredBlank::resolved("LEVEL", "HIGH")];
//! let draft = AnswerKeyDraft::build(&inferred, &Overrides::default());
//!
//! let json = JsonGenerator::new(&draft).generate().unwrap();
//! assert_eq!(
//!     json,
//!     r#"{"rules":{"LEVEL":{"type":"equals","value":"HIGH"}},"unresolved":[]}"#
//! );
//! ```

use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tinker_blanks::AnswerKey;

use crate::{AnswerKeyDraft, Result, SnippetError, UnresolvedBlank};

#[derive(Serialize)]
struct JsonAnswerKey<'a> {
    rules: AnswerKey,
    unresolved: Vec<&'a UnresolvedBlank>,
}

/// JSON answer-key generator.
pub struct JsonGenerator<'a> {
    draft: &'a AnswerKeyDraft,
}

impl<'a> JsonGenerator<'a> {
    /// Creates a new JSON generator for the given draft.
    #[must_use]
    pub const fn new(draft: &'a AnswerKeyDraft) -> Self {
        Self { draft }
    }

    fn document(&self) -> JsonAnswerKey<'a> {
        JsonAnswerKey {
            rules: self.draft.answer_key(),
            unresolved: self.draft.unresolved().collect(),
        }
    }

    /// Generates compact JSON output.
    ///
    /// # Errors
    ///
    /// Returns [`SnippetError::Serialization`] if JSON serialization fails.
    pub fn generate(&self) -> Result<String> {
        serde_json::to_string(&self.document()).map_err(SnippetError::from)
    }

    /// Generates pretty-printed JSON output with indentation.
    ///
    /// # Errors
    ///
    /// Returns [`SnippetError::Serialization`] if JSON serialization fails.
    pub fn generate_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.document()).map_err(SnippetError::from)
    }

    /// Writes the JSON answer key to a file, creating or overwriting it.
    ///
    /// # Errors
    ///
    /// Returns [`SnippetError::Serialization`] if JSON serialization fails.
    /// Returns [`SnippetError::Io`] if file creation or writing fails.
    pub fn write_to_file(&self, path: &Path, pretty: bool) -> Result<()> {
        let json = if pretty {
            self.generate_pretty()?
        } else {
            self.generate()?
        };

        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;

        Ok(())
    }
}
