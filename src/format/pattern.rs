//! The templated layout engine: compiles a `%(name)` pattern string
//! once per logger and applies it to a [`super::RecordView`] on every
//! record.
//!
//! Compilation is a linear scan that splits the pattern into literal runs
//! and field placeholders; formatting is a second linear scan over the
//! cached segment list, so a hot logger never re-parses its own pattern.

use chrono::{DateTime, Local, Utc};

use super::RecordView;
use crate::clock::{format_sub_second, SubSecondPrecision};
use crate::error::{Error, Result};
use crate::message::join_named_args;

/// The closed set of placeholder names recognized inside `%(...)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldName {
    Time,
    FileName,
    FullPath,
    CallerFunction,
    LogLevel,
    LogLevelShortCode,
    LineNumber,
    Logger,
    Message,
    ThreadId,
    ThreadName,
    ProcessId,
    SourceLocation,
    ShortSourceLocation,
    Tags,
    NamedArgs,
}

impl FieldName {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "time" => Self::Time,
            "file_name" => Self::FileName,
            "full_path" => Self::FullPath,
            "caller_function" => Self::CallerFunction,
            "log_level" => Self::LogLevel,
            "log_level_short_code" => Self::LogLevelShortCode,
            "line_number" => Self::LineNumber,
            "logger" => Self::Logger,
            "message" => Self::Message,
            "thread_id" => Self::ThreadId,
            "thread_name" => Self::ThreadName,
            "process_id" => Self::ProcessId,
            "source_location" => Self::SourceLocation,
            "short_source_location" => Self::ShortSourceLocation,
            "tags" => Self::Tags,
            "named_args" => Self::NamedArgs,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy)]
struct FieldSpec {
    name: FieldName,
    align: Option<Align>,
    width: usize,
}

enum Segment {
    Literal(String),
    Field(FieldSpec),
}

/// Timezone used to render the `time` placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeZoneSelector {
    #[default]
    Gmt,
    Local,
}

/// Directory depth for `file_name`/`full_path`/`source_location`/
/// `short_source_location`: `0` = filename only, `N` = last `N` path
/// segments, `-1` = full path.
pub type PathDepth = i32;

/// A pattern string plus its timestamp format, timezone, and path-depth
/// options, parsed once and cached with the owning logger.
pub struct CompiledPattern {
    segments: Vec<Segment>,
    time_format: Vec<TimeSegment>,
    tz: TimeZoneSelector,
    path_depth: PathDepth,
}

enum TimeSegment {
    Strftime(String),
    SubSecond(SubSecondPrecision),
}

impl CompiledPattern {
    /// Parses `pattern` (the `%(name)` layout) and `time_format` (a
    /// `strftime` string with `%Qms`/`%Qus`/`%Qns` extensions). Fails fast
    /// with [`Error::Config`] on any placeholder outside the closed set.
    pub fn compile(
        pattern: &str,
        time_format: &str,
        tz: TimeZoneSelector,
        path_depth: PathDepth,
    ) -> Result<Self> {
        Ok(Self {
            segments: parse_pattern(pattern)?,
            time_format: parse_time_format(time_format),
            tz,
            path_depth,
        })
    }

    /// Renders one record by a linear scan over the cached segments.
    pub fn format(&self, ctx: &RecordView<'_>) -> String {
        let mut out = String::with_capacity(128);
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Field(spec) => {
                    let rendered = self.render_field(spec.name, ctx);
                    push_aligned(&mut out, &rendered, spec.align, spec.width);
                }
            }
        }
        out
    }

    fn render_field(&self, name: FieldName, ctx: &RecordView<'_>) -> String {
        match name {
            FieldName::Time => self.render_time(ctx.wall_time),
            FieldName::FileName => shorten_path(ctx.file, 0),
            FieldName::FullPath => shorten_path(ctx.file, -1),
            FieldName::CallerFunction => ctx.function.to_string(),
            FieldName::LogLevel => ctx.level.label().to_string(),
            FieldName::LogLevelShortCode => ctx.level.short_code().to_string(),
            FieldName::LineNumber => ctx.line.to_string(),
            FieldName::Logger => ctx.logger.to_string(),
            FieldName::Message => ctx.message.to_string(),
            FieldName::ThreadId => ctx.thread_id.to_string(),
            FieldName::ThreadName => ctx.thread_name.unwrap_or("").to_string(),
            FieldName::ProcessId => ctx.process_id.to_string(),
            FieldName::SourceLocation => {
                format!("{}:{}", shorten_path(ctx.file, self.path_depth), ctx.line)
            }
            FieldName::ShortSourceLocation => format!("{}:{}", shorten_path(ctx.file, 0), ctx.line),
            FieldName::Tags => ctx
                .tags
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(","),
            FieldName::NamedArgs => join_named_args(
                &ctx.named_args.iter().map(|(k, v)| (k.clone(), v.clone())).collect::<Vec<_>>(),
            ),
        }
    }

    fn render_time(&self, wall_time: DateTime<Utc>) -> String {
        let mut out = String::new();
        match self.tz {
            TimeZoneSelector::Gmt => self.render_time_into(&mut out, wall_time),
            TimeZoneSelector::Local => {
                let local = wall_time.with_timezone(&Local);
                self.render_time_into(&mut out, local)
            }
        }
        out
    }

    fn render_time_into<Tz: chrono::TimeZone>(&self, out: &mut String, dt: DateTime<Tz>)
    where
        Tz::Offset: std::fmt::Display,
    {
        for seg in &self.time_format {
            match seg {
                TimeSegment::Strftime(fmt) => {
                    out.push_str(&dt.format(fmt).to_string());
                }
                TimeSegment::SubSecond(precision) => {
                    out.push_str(&format_sub_second(dt.with_timezone(&Utc), *precision));
                }
            }
        }
    }
}

/// Parses a `%(name)` / `%(name:<width)` / `%(name:>width)` pattern.
/// Literal `%` sequences that don't open a recognized placeholder are kept
/// verbatim.
fn parse_pattern(pattern: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '%' && chars.get(i + 1) == Some(&'(') {
            let close = chars[i + 2..].iter().position(|&c| c == ')').map(|p| p + i + 2);
            if let Some(close_idx) = close {
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                let inner: String = chars[i + 2..close_idx].iter().collect();
                segments.push(Segment::Field(parse_field_spec(&inner)?));
                i = close_idx + 1;
                continue;
            }
        }
        literal.push(chars[i]);
        i += 1;
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

fn parse_field_spec(inner: &str) -> Result<FieldSpec> {
    let (name_part, align_part) = match inner.split_once(':') {
        Some((n, a)) => (n, Some(a)),
        None => (inner, None),
    };
    let name = FieldName::parse(name_part)
        .ok_or_else(|| Error::Config(format!("unknown placeholder %({name_part})")))?;

    let (align, width) = match align_part {
        None => (None, 0),
        Some(a) => {
            let (align, width_str) = if let Some(w) = a.strip_prefix('<') {
                (Some(Align::Left), w)
            } else if let Some(w) = a.strip_prefix('>') {
                (Some(Align::Right), w)
            } else {
                (None, a)
            };
            let width = width_str
                .parse::<usize>()
                .map_err(|_| Error::Config(format!("bad width in %({inner})")))?;
            (align, width)
        }
    };
    Ok(FieldSpec { name, align, width })
}

fn push_aligned(out: &mut String, value: &str, align: Option<Align>, width: usize) {
    match align {
        None => out.push_str(value),
        Some(Align::Left) => out.push_str(&format!("{value:<width$}")),
        Some(Align::Right) => out.push_str(&format!("{value:>width$}")),
    }
}

/// Parses a timestamp format string, splitting out the `%Qms`/`%Qus`/`%Qns`
/// extensions (not part of `strftime`) from ordinary `strftime` runs, which
/// are handed to `chrono` verbatim.
fn parse_time_format(format: &str) -> Vec<TimeSegment> {
    let mut segments = Vec::new();
    let mut rest = format;
    loop {
        let next = ["%Qms", "%Qus", "%Qns"]
            .iter()
            .filter_map(|tok| rest.find(tok).map(|pos| (pos, *tok)))
            .min_by_key(|(pos, _)| *pos);

        match next {
            None => {
                if !rest.is_empty() {
                    segments.push(TimeSegment::Strftime(rest.to_string()));
                }
                break;
            }
            Some((pos, tok)) => {
                if pos > 0 {
                    segments.push(TimeSegment::Strftime(rest[..pos].to_string()));
                }
                let precision = match tok {
                    "%Qms" => SubSecondPrecision::Millis,
                    "%Qus" => SubSecondPrecision::Micros,
                    _ => SubSecondPrecision::Nanos,
                };
                segments.push(TimeSegment::SubSecond(precision));
                rest = &rest[pos + tok.len()..];
            }
        }
    }
    segments
}

/// Shortens a `/`-separated path to the filename only (`depth == 0`), the
/// last `depth` segments, or the full path (`depth < 0`).
pub fn shorten_path(path: &str, depth: PathDepth) -> String {
    if depth < 0 {
        return path.to_string();
    }
    let segments: Vec<&str> = path.split('/').collect();
    let take = (depth as usize) + 1;
    let start = segments.len().saturating_sub(take);
    segments[start..].join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levels::Level;

    fn ctx<'a>(message: &'a str, named_args: &'a [(String, String)]) -> RecordView<'a> {
        RecordView {
            wall_time: DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
            level: Level::Info,
            logger: "app",
            file: "src/main.rs",
            line: 42,
            function: "handle_request",
            thread_id: 7,
            thread_name: Some("worker-1"),
            process_id: 1234,
            format_str: "x={}",
            message,
            named_args,
            tags: &[],
        }
    }

    #[test]
    fn s1_basic_info_pattern() {
        let pattern = CompiledPattern::compile(
            "%(log_level) %(message)",
            "%Y-%m-%d",
            TimeZoneSelector::Gmt,
            0,
        )
        .unwrap();
        let view = ctx("x=42", &[]);
        assert_eq!(pattern.format(&view), "INFO x=42");
    }

    #[test]
    fn s2_named_args_hybrid_pattern() {
        let pattern = CompiledPattern::compile(
            "%(message) [%(named_args)]",
            "%Y-%m-%d",
            TimeZoneSelector::Gmt,
            0,
        )
        .unwrap();
        let named = vec![
            ("method".to_string(), "POST".to_string()),
            ("endpoint".to_string(), "http://".to_string()),
            ("elapsed".to_string(), "20".to_string()),
        ];
        let view = ctx("POST to http:// took 20 ms", &named);
        assert_eq!(
            pattern.format(&view),
            "POST to http:// took 20 ms [method: POST, endpoint: http://, elapsed: 20]"
        );
    }

    #[test]
    fn unknown_placeholder_is_config_error() {
        let err = CompiledPattern::compile("%(bogus)", "%Y", TimeZoneSelector::Gmt, 0).unwrap_err();
        assert!(err.to_string().contains("unknown placeholder"));
    }

    #[test]
    fn alignment_and_width_pad_fields() {
        let pattern =
            CompiledPattern::compile("[%(log_level:<9)]", "%Y", TimeZoneSelector::Gmt, 0).unwrap();
        let view = ctx("m", &[]);
        assert_eq!(pattern.format(&view), "[INFO     ]");
    }

    #[test]
    fn path_depth_controls_file_name_rendering() {
        assert_eq!(shorten_path("src/backend/file.rs", 0), "file.rs");
        assert_eq!(shorten_path("src/backend/file.rs", 1), "backend/file.rs");
        assert_eq!(shorten_path("src/backend/file.rs", -1), "src/backend/file.rs");
    }

    #[test]
    fn sub_second_specifiers_are_parsed_out_of_strftime() {
        let pattern =
            CompiledPattern::compile("%(time)", "%H:%M:%S.%Qms", TimeZoneSelector::Gmt, 0).unwrap();
        let view = ctx("m", &[]);
        let rendered = pattern.format(&view);
        assert!(rendered.contains(':'));
        assert_eq!(rendered.len(), "00:00:00.000".len());
    }
}
