//! Parsing compiler output into diagnostics and notices.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::CompileDiagnostic;

#[allow(clippy::expect_used)]
static ERROR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.*?):(\d+):(?:(\d+):)?\s*(?:fatal\s+)?error:\s*(.+)$")
        .expect("diagnostic pattern is valid")
});

/// Stdout prefixes of the memory-usage summary printed after a build.
const USAGE_PREFIXES: &[&str] = &["Sketch uses", "Global variables"];

/// Extracts `<file>:<line>:<column>: error: <message>` lines from stderr.
///
/// Diagnostics keep stderr order. `fatal error:` lines are included and a
/// missing column is reported as column 1.
#[must_use]
pub fn parse_diagnostics(stderr: &str) -> Vec<CompileDiagnostic> {
    stderr
        .lines()
        .filter_map(|line| {
            let captures = ERROR_RE.captures(line.trim_end())?;
            let line_no = captures.get(2).map_or(1, |m| parse_position(m.as_str()));
            let column = captures.get(3).map_or(1, |m| parse_position(m.as_str()));
            let message = captures.get(4)?.as_str().trim();
            Some(CompileDiagnostic::new(line_no, column, message))
        })
        .collect()
}

fn parse_position(digits: &str) -> u32 {
    digits.parse().unwrap_or(1)
}

/// Collects the output worth showing after a successful compile.
///
/// That is every non-empty stderr line (warnings) followed by the memory usage
/// lines from stdout.
#[must_use]
pub fn collect_notices(stdout: &str, stderr: &str) -> Vec<String> {
    let warnings = stderr
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty());
    let usage = stdout
        .lines()
        .map(str::trim)
        .filter(|line| USAGE_PREFIXES.iter().any(|prefix| line.starts_with(prefix)));

    warnings.chain(usage).map(str::to_string).collect()
}
