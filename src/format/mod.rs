//! Output formatting: the `%(name)` pattern layout engine and the
//! newline-delimited JSON sink encoder.

pub mod json;
pub mod pattern;

use chrono::{DateTime, Utc};

use crate::levels::Level;

/// Everything the formatters need to render one record, gathered by the
/// backend after it has decoded a record's payload and run it through the
/// [`crate::message`] template substitution.
pub struct RecordView<'a> {
    pub wall_time: DateTime<Utc>,
    pub level: Level,
    pub logger: &'a str,
    pub file: &'a str,
    pub line: u32,
    pub function: &'a str,
    pub thread_id: u64,
    pub thread_name: Option<&'a str>,
    pub process_id: u32,
    /// The call site's raw format template, e.g. `"{method} to {endpoint}"`.
    pub format_str: &'a str,
    /// The format template with arguments substituted in.
    pub message: &'a str,
    /// `(name, formatted value)` pairs for every named placeholder in
    /// `format_str`, in argument order. Empty for positional-only templates.
    pub named_args: &'a [(String, String)],
    /// Arbitrary key=value tags attached to the logger or the process.
    pub tags: &'a [(String, String)],
}
