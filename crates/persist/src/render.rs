//! Canonical show-format rendering
//!
//! Persisted lines use the single canonical format:
//!
//! ```text
//! MM-DD HH:MM:SS.mmm  <pid>  <tid> <L> <domain>/<tag>: <segment>
//! ```
//!
//! Multi-line content is split on `\n`; every non-empty segment becomes one
//! rendered line and empty segments are skipped.

use chrono::DateTime;

use ember_protocol::{level_char, LogRecord};

/// Render a record into one line per non-empty content segment.
///
/// Lines are built from the record's own content; nothing is shared across
/// calls.
pub fn render_lines(record: &LogRecord) -> Vec<String> {
    record
        .content
        .split('\n')
        .filter(|segment| !segment.is_empty())
        .map(|segment| show_line(record, segment))
        .collect()
}

fn show_line(record: &LogRecord, segment: &str) -> String {
    let time = DateTime::from_timestamp(record.ts.sec as i64, record.ts.nsec)
        .unwrap_or(DateTime::UNIX_EPOCH);
    format!(
        "{} {:>5} {:>5} {} {:05x}/{}: {}",
        time.format("%m-%d %H:%M:%S%.3f"),
        record.pid,
        record.tid,
        level_char(record.level),
        record.domain,
        record.tag,
        segment
    )
}

#[cfg(test)]
#[path = "render_test.rs"]
mod render_test;
