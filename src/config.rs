//! Backend-wide configuration and the size/duration string parsers shared
//! by sinks and the registry.
//!
//! `parse_size` adds a terabyte unit to the usual byte-count suffixes, and
//! `parse_duration` covers the duration grammar (`"500ms"`, `"30s"`, `"5m"`)
//! used by the backend's sleep-interval and timeout options.

use std::time::Duration;

use crate::error::{Error, Result};

/// Full-queue behavior; re-exported here for configuration call sites that
/// don't want to depend on `crate::queue` directly.
pub use crate::queue::OverflowPolicy;

/// Rotation cadence for a file sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationPolicy {
    #[default]
    Never,
    Daily,
    Hourly,
    Minutely,
    /// Rotate once the file reaches a configured byte size.
    Size,
    /// Whichever of time or size triggers first.
    SizeOrTime,
}

/// How a file sink names its rotated siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateStyle {
    /// No date suffix: only one physical file, truncated/rotated in place.
    None,
    /// Date inserted before the extension: `app.2026-07-30.log`.
    #[default]
    StartDate,
    /// Date and time prefixed to the file name: `2026-07-30_10-00.app.log`.
    StartDateTime,
}

/// `open_mode` for a file sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    #[default]
    Append,
    Truncate,
}

/// Process-wide backend tuning, covering every knob named in the external
/// interfaces section: thread naming/affinity, shutdown behavior, idle
/// back-off bounds, strict-order grace, transit-event thresholds, and
/// clock resync cadence.
#[derive(Debug, Clone)]
pub struct BackendOptions {
    pub backend_thread_name: String,
    pub thread_affinity: Option<usize>,
    pub shutdown_timeout: Duration,
    pub sleep_duration_min: Duration,
    pub sleep_duration_max: Duration,
    /// `None` disables strict-order mode (the default).
    pub strict_order_grace: Option<Duration>,
    /// Record backlog (enqueued minus processed) above which the backend
    /// burst-drains instead of interleaving one record per loop iteration.
    pub transit_events_soft_limit: usize,
    /// Record backlog above which the backend additionally reports a
    /// backend error once per excursion, until the backlog falls back
    /// under `transit_events_soft_limit`.
    pub transit_events_hard_limit: usize,
    pub rdtsc_resync_interval: Duration,
    /// How often the backend flushes sinks, rotates due files, and emits
    /// a metrics summary.
    pub housekeeping_interval: Duration,
    /// User-visible labels for the nine levels, in ascending severity.
    pub log_level_descriptions: [&'static str; 9],
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            backend_thread_name: "fluxlog-backend".to_string(),
            thread_affinity: None,
            shutdown_timeout: Duration::from_secs(2),
            sleep_duration_min: Duration::from_micros(50),
            sleep_duration_max: Duration::from_millis(10),
            strict_order_grace: None,
            transit_events_soft_limit: 4096,
            transit_events_hard_limit: 1_000_000,
            rdtsc_resync_interval: Duration::from_secs(30),
            housekeeping_interval: Duration::from_millis(200),
            log_level_descriptions: [
                "TRACE_L3", "TRACE_L2", "TRACE_L1", "DEBUG", "INFO", "WARNING", "ERROR",
                "CRITICAL", "BACKTRACE",
            ],
        }
    }
}

/// Parses a byte size string such as `"5KB"`, `"10MB"`, `"1GB"`, `"2TB"`, or
/// a bare number (bytes). Case-insensitive; trims surrounding whitespace.
pub fn parse_size(size_str: &str) -> Result<u64> {
    let s = size_str.trim();
    if s.is_empty() {
        return Err(Error::Config(format!("empty size string")));
    }

    let mut num_end = 0;
    for (i, c) in s.chars().enumerate() {
        if !c.is_ascii_digit() {
            num_end = i;
            break;
        }
        num_end = i + 1;
    }
    if num_end == 0 {
        return Err(Error::Config(format!("no numeric prefix in size '{size_str}'")));
    }

    let num_str = &s[..num_end];
    let unit = s[num_end..].trim().to_uppercase();
    let multiplier: u64 = match unit.as_str() {
        "B" | "" => 1,
        "KB" | "K" => 1024,
        "MB" | "M" => 1024 * 1024,
        "GB" | "G" => 1024 * 1024 * 1024,
        "TB" | "T" => 1024u64 * 1024 * 1024 * 1024,
        other => return Err(Error::Config(format!("unknown size unit '{other}'"))),
    };

    num_str
        .parse::<u64>()
        .map(|n| n * multiplier)
        .map_err(|_| Error::Config(format!("invalid size number in '{size_str}'")))
}

/// Parses a duration string such as `"500ms"`, `"30s"`, `"5m"`, `"2h"`, or a
/// bare number (milliseconds).
pub fn parse_duration(duration_str: &str) -> Result<Duration> {
    let s = duration_str.trim();
    if s.is_empty() {
        return Err(Error::Config(format!("empty duration string")));
    }

    let mut num_end = 0;
    for (i, c) in s.chars().enumerate() {
        if !c.is_ascii_digit() && c != '.' {
            num_end = i;
            break;
        }
        num_end = i + 1;
    }
    if num_end == 0 {
        return Err(Error::Config(format!("no numeric prefix in duration '{duration_str}'")));
    }

    let num_str = &s[..num_end];
    let unit = s[num_end..].trim().to_lowercase();
    let value: f64 = num_str
        .parse()
        .map_err(|_| Error::Config(format!("invalid duration number in '{duration_str}'")))?;

    let millis = match unit.as_str() {
        "ms" | "" => value,
        "s" => value * 1_000.0,
        "m" => value * 60_000.0,
        "h" => value * 3_600_000.0,
        other => return Err(Error::Config(format!("unknown duration unit '{other}'"))),
    };

    Ok(Duration::from_micros((millis * 1_000.0) as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_byte_sizes() {
        assert_eq!(parse_size("100").unwrap(), 100);
        assert_eq!(parse_size("5KB").unwrap(), 5 * 1024);
        assert_eq!(parse_size("10mb").unwrap(), 10 * 1024 * 1024);
        assert_eq!(parse_size("1G").unwrap(), 1024 * 1024 * 1024);
        assert_eq!(parse_size("2TB").unwrap(), 2 * 1024u64 * 1024 * 1024 * 1024);
        assert!(parse_size("bogus").is_err());
        assert!(parse_size("").is_err());
    }

    #[test]
    fn parses_durations() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert!(parse_duration("nope").is_err());
    }

    #[test]
    fn backend_options_default_is_sane() {
        let opts = BackendOptions::default();
        assert!(opts.sleep_duration_min < opts.sleep_duration_max);
        assert_eq!(opts.log_level_descriptions.len(), 9);
        assert!(opts.strict_order_grace.is_none());
    }
}
