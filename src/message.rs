//! The message-template formatter: substitutes decoded argument [`Value`]s
//! into a call site's format string.
//!
//! Supports `{}` positional, `{name}` named, and `{:SPEC}` format-spec
//! placeholders, plus the `named_args` side-channel the pattern formatter's
//! `%(named_args)` placeholder reads.

use crate::codec::Value;

/// One placeholder or literal run inside a parsed message template.
enum Piece {
    Literal(String),
    /// A `{}` or `{name}` placeholder, with an optional `:SPEC` tail.
    Placeholder { name: Option<String>, spec: Option<String> },
}

/// A message template, parsed once per call site's metadata (conceptually;
/// in this crate it is re-parsed per call since templates are `&'static
/// str` and parsing is cheap relative to the I/O it ultimately triggers).
pub struct Template {
    pieces: Vec<Piece>,
}

impl Template {
    pub fn parse(template: &str) -> Self {
        let mut pieces = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    if !literal.is_empty() {
                        pieces.push(Piece::Literal(std::mem::take(&mut literal)));
                    }
                    let mut inner = String::new();
                    for c2 in chars.by_ref() {
                        if c2 == '}' {
                            break;
                        }
                        inner.push(c2);
                    }
                    let (name_part, spec) = match inner.split_once(':') {
                        Some((n, s)) => (n, Some(s.to_string())),
                        None => (inner.as_str(), None),
                    };
                    let name = if name_part.is_empty() { None } else { Some(name_part.to_string()) };
                    pieces.push(Piece::Placeholder { name, spec });
                }
                _ => literal.push(c),
            }
        }
        if !literal.is_empty() {
            pieces.push(Piece::Literal(literal));
        }
        Self { pieces }
    }

    /// Substitutes `args` into the template in declaration order (one
    /// `Value` per placeholder, regardless of whether it is named), and
    /// returns the rendered message plus the `(name, formatted_value)`
    /// pairs for every *named* placeholder, in the order they appeared.
    ///
    /// With positional-only placeholders `named_args` is empty.
    pub fn render(&self, args: &[Value<'_>]) -> (String, Vec<(String, String)>) {
        let mut out = String::new();
        let mut named_args = Vec::new();
        let mut arg_idx = 0;

        for piece in &self.pieces {
            match piece {
                Piece::Literal(s) => out.push_str(s),
                Piece::Placeholder { name, spec } => {
                    let formatted = match args.get(arg_idx) {
                        Some(v) => format_value(v, spec.as_deref()),
                        None => "<missing>".to_string(),
                    };
                    arg_idx += 1;
                    if let Some(n) = name {
                        named_args.push((n.clone(), formatted.clone()));
                    }
                    out.push_str(&formatted);
                }
            }
        }
        (out, named_args)
    }
}

/// Formats a single decoded value, honoring a `{:SPEC}` tail. Supports
/// fixed-precision floats (`.2f`) and left/right alignment with width
/// (`<8`, `>8`).
fn format_value(value: &Value<'_>, spec: Option<&str>) -> String {
    let Some(spec) = spec else {
        return value.to_string();
    };

    if let Some(precision_str) = spec.strip_suffix('f').and_then(|s| s.strip_prefix('.')) {
        if let Ok(precision) = precision_str.parse::<usize>() {
            let as_f64 = match value {
                Value::F64(f) => *f,
                Value::I64(i) => *i as f64,
                Value::U64(u) => *u as f64,
                _ => return value.to_string(),
            };
            return format!("{as_f64:.precision$}");
        }
    }

    let base = value.to_string();
    if let Some(width_str) = spec.strip_prefix('<') {
        if let Ok(width) = width_str.parse::<usize>() {
            return format!("{base:<width$}");
        }
    }
    if let Some(width_str) = spec.strip_prefix('>') {
        if let Ok(width) = width_str.parse::<usize>() {
            return format!("{base:>width$}");
        }
    }
    base
}

/// Joins `named_args` pairs the way `%(named_args)` renders them:
/// `"name: value, name: value"` in argument order.
pub fn join_named_args(named_args: &[(String, String)]) -> String {
    named_args
        .iter()
        .map(|(k, v)| format!("{k}: {v}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Renders the `LOGV_*` variant: a non-braced template followed by its
/// named arguments in brackets, e.g. `"<template> [a: 1, b: 2]"`.
/// Accepts at most 20 named arguments.
pub fn render_verbose(template: &str, named: &[(&str, Value<'_>)]) -> String {
    let pairs: Vec<(String, String)> = named
        .iter()
        .take(20)
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();
    if pairs.is_empty() {
        return template.to_string();
    }
    format!("{} [{}]", template, join_named_args(&pairs))
}
