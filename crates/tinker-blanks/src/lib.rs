//! Tinker Lesson Blanks
//!
//! Guided lessons present a sketch template with named blanks
//! (`__BLANK[NAME]__`) for the student to fill in. This crate holds the
//! text-level machinery behind them:
//!
//! - [`template`] - locating blanks in a template
//! - [`rule`] - the answer rule vocabulary and per-lesson [`AnswerKey`]
//! - [`matcher`] - checking a student's value against a rule
//! - [`session`] - live checking with cross-blank dependencies
//! - [`infer`] - recovering blank values from a solved reference sketch

pub mod infer;
pub mod matcher;
pub mod rule;
pub mod session;
pub mod template;

pub use infer::{infer, InferredBlank, ALIGNMENT_WARNING, BOUNDARY_WARNING, NO_VALUE_WARNING};
pub use matcher::{check, check_all, Verdict};
pub use rule::{pattern_references, AnswerKey, AnswerRule};
pub use session::BlankSession;
pub use template::{blank_marker, extract_blanks, BlankSpan, BlankToken, Segment, Template};
