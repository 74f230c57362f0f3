//! The JSON sink's record encoder: one JSON object per record, ignoring
//! the logger's human pattern entirely.

use serde_json::{Map, Value as Json};

use super::RecordView;

/// Builds the fixed-field JSON object for one record: `timestamp`,
/// `file_name`, `line_number`, `thread_id`, `logger`, `log_level`,
/// `message` (the *raw* template, named placeholders preserved verbatim),
/// plus every named argument as a top-level key with its formatted value.
pub fn render(ctx: &RecordView<'_>) -> Json {
    let mut map = Map::new();
    map.insert("timestamp".to_string(), Json::String(ctx.wall_time.to_rfc3339()));
    map.insert("file_name".to_string(), Json::String(super::pattern::shorten_path(ctx.file, 0)));
    map.insert("line_number".to_string(), Json::Number(ctx.line.into()));
    map.insert("thread_id".to_string(), Json::Number(ctx.thread_id.into()));
    map.insert("logger".to_string(), Json::String(ctx.logger.to_string()));
    map.insert("log_level".to_string(), Json::String(ctx.level.label().to_string()));
    map.insert("message".to_string(), Json::String(ctx.format_str.to_string()));
    for (name, value) in ctx.named_args {
        map.insert(name.clone(), Json::String(value.clone()));
    }
    Json::Object(map)
}

/// Renders one record as a single newline-delimited JSON line (no trailing
/// newline; the sink appends it).
pub fn render_line(ctx: &RecordView<'_>) -> String {
    serde_json::to_string(&render(ctx)).expect("json values never fail to serialize")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levels::Level;
    use chrono::{DateTime, Utc};

    #[test]
    fn s2_json_line_has_fixed_and_named_fields() {
        let named = vec![
            ("method".to_string(), "POST".to_string()),
            ("endpoint".to_string(), "http://".to_string()),
            ("elapsed".to_string(), "20".to_string()),
        ];
        let view = RecordView {
            wall_time: DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
            level: Level::Info,
            logger: "app",
            file: "src/main.rs",
            line: 10,
            function: "handle",
            thread_id: 1,
            thread_name: None,
            process_id: 1,
            format_str: "{method} to {endpoint} took {elapsed} ms",
            message: "POST to http:// took 20 ms",
            named_args: &named,
            tags: &[],
        };
        let line = render_line(&view);
        let parsed: serde_json::Value = serde_json::from_str(&line).expect("valid json");
        assert_eq!(parsed["message"], "{method} to {endpoint} took {elapsed} ms");
        assert_eq!(parsed["method"], "POST");
        assert_eq!(parsed["endpoint"], "http://");
        assert_eq!(parsed["elapsed"], "20");
        assert_eq!(parsed["log_level"], "INFO");
    }

    #[test]
    fn every_line_is_a_well_formed_json_object() {
        let view = RecordView {
            wall_time: DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
            level: Level::Warning,
            logger: "app",
            file: "a.rs",
            line: 1,
            function: "f",
            thread_id: 0,
            thread_name: None,
            process_id: 0,
            format_str: "no args here",
            message: "no args here",
            named_args: &[],
            tags: &[],
        };
        let line = render_line(&view);
        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert!(parsed.is_object());
        for field in ["timestamp", "file_name", "line_number", "thread_id", "logger", "log_level", "message"] {
            assert!(parsed.get(field).is_some(), "missing field {field}");
        }
    }
}
