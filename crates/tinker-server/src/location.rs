//! Where students are in their lessons.
//!
//! Handlers receive a [`LocationReporter`] through the application state and
//! call it after every lesson check. What happens to the report is up to the
//! implementation.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// A student's position in a lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonLocation {
    /// Lesson id.
    pub lesson: String,
    /// Step within the lesson, when the client tracks steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,
    /// When the location was reported.
    pub reported_at: DateTime<Utc>,
}

impl LessonLocation {
    /// Creates a location stamped with the current time.
    #[must_use]
    pub fn now(lesson: impl Into<String>, step: Option<u32>) -> Self {
        Self {
            lesson: lesson.into(),
            step,
            reported_at: Utc::now(),
        }
    }
}

/// Receives lesson locations.
pub trait LocationReporter: Send + Sync + std::fmt::Debug {
    /// Records `location`. Must not block.
    fn report(&self, location: LessonLocation);
}

/// Logs every location at `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl LocationReporter for TracingReporter {
    fn report(&self, location: LessonLocation) {
        info!(
            lesson = %location.lesson,
            step = ?location.step,
            reported_at = %location.reported_at,
            "Lesson location"
        );
    }
}

/// Keeps the latest location per lesson in memory.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    latest: Mutex<HashMap<String, LessonLocation>>,
}

impl MemoryReporter {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest location reported for `lesson`.
    #[must_use]
    pub fn latest(&self, lesson: &str) -> Option<LessonLocation> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(lesson)
            .cloned()
    }

    /// Every lesson's latest location, most recent first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<LessonLocation> {
        let mut all: Vec<_> = self
            .latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| b.reported_at.cmp(&a.reported_at));
        all
    }
}

impl LocationReporter for MemoryReporter {
    fn report(&self, location: LessonLocation) {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(location.lesson.clone(), location);
    }
}
