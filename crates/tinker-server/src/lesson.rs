//! Lesson loading.
//!
//! A lesson is a JSON file `<lessons dir>/<id>.json` holding the sketch
//! template shown to the student and the answer key for its blanks:
//!
//! ```json
//! {
//!   "id": "blink",
//!   "title": "Blink an LED",
//!   "template": "void setup() { pinMode(__BLANK[PIN]__, OUTPUT); }",
//!   "answers": { "PIN": { "type": "one_of", "values": ["13", "LED_BUILTIN"] } }
//! }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tinker_blanks::{check_all, extract_blanks, AnswerKey, BlankToken, Verdict};
use tracing::{debug, warn};

use crate::error::{Result, TinkerError};

/// Maximum allowed lesson file size in bytes (100KB).
pub const MAX_LESSON_SIZE: u64 = 100 * 1024;

#[allow(clippy::expect_used)]
static LESSON_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("lesson id pattern is valid"));

/// A guided lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    /// Lesson identifier, matching the file stem.
    pub id: String,

    /// Display title.
    #[serde(default)]
    pub title: String,

    /// Sketch template containing `__BLANK[NAME]__` markers.
    pub template: String,

    /// One rule per blank.
    #[serde(default)]
    pub answers: AnswerKey,
}

impl Lesson {
    /// Loads a lesson from the given file path.
    ///
    /// # Errors
    ///
    /// Returns `TinkerError::LessonNotFound` if the file doesn't exist,
    /// `TinkerError::LessonTooLarge` above 100KB,
    /// `TinkerError::LessonEncodingError` for non-UTF-8 content and
    /// `TinkerError::LessonParseError` for invalid JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let metadata = std::fs::metadata(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TinkerError::lesson_not_found(path)
            } else {
                TinkerError::Io(e)
            }
        })?;

        let file_size = metadata.len();
        if file_size > MAX_LESSON_SIZE {
            return Err(TinkerError::lesson_too_large(path, file_size / 1024));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::InvalidData {
                TinkerError::lesson_encoding(path)
            } else {
                TinkerError::Io(e)
            }
        })?;

        let lesson: Self = serde_json::from_str(&content)
            .map_err(|e| TinkerError::lesson_parse(path, e.to_string()))?;

        for unknown in lesson.rules_without_blanks() {
            warn!(lesson = %lesson.id, blank = %unknown, "Answer key names a blank not in the template");
        }
        debug!(lesson = %lesson.id, blanks = lesson.blanks().len(), "Loaded lesson");
        Ok(lesson)
    }

    /// Returns the distinct blanks of the template in first-occurrence order.
    #[must_use]
    pub fn blanks(&self) -> Vec<BlankToken> {
        extract_blanks(&self.template)
    }

    /// Checks student values against the answer key.
    #[must_use]
    pub fn check(&self, values: &HashMap<String, String>) -> Vec<Verdict> {
        check_all(&self.answers, values)
    }

    fn rules_without_blanks(&self) -> Vec<String> {
        let blanks = self.blanks();
        self.answers
            .iter()
            .filter(|(name, _)| !blanks.iter().any(|b| b.name == *name))
            .map(|(name, _)| name.to_string())
            .collect()
    }
}

/// Loads lessons by id from a directory.
#[derive(Debug, Clone)]
pub struct LessonStore {
    dir: PathBuf,
}

impl LessonStore {
    /// Creates a store reading from `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the lessons directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Loads the lesson with the given id.
    ///
    /// # Errors
    ///
    /// Returns `TinkerError::InvalidLessonId` for ids outside
    /// `[A-Za-z0-9_-]+`, otherwise any error of [`Lesson::load`].
    pub fn load(&self, id: &str) -> Result<Lesson> {
        if !LESSON_ID_RE.is_match(id) {
            return Err(TinkerError::invalid_lesson_id(id));
        }
        Lesson::load(self.dir.join(format!("{id}.json")))
    }
}
