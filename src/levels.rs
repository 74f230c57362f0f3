//! Log level enum and its string/short-code representations.
//!
//! Nine levels ordered from most verbose (`TraceL3`) to most severe
//! (`Backtrace`). Ordering is used directly for the per-logger threshold
//! check in [`Level::should_log`].

use std::fmt;

/// Severity/verbosity of a log record, ordered least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Level {
    TraceL3 = 0,
    TraceL2 = 1,
    TraceL1 = 2,
    Debug = 3,
    Info = 4,
    Warning = 5,
    Error = 6,
    Critical = 7,
    Backtrace = 8,
}

impl Level {
    pub const ALL: [Level; 9] = [
        Level::TraceL3,
        Level::TraceL2,
        Level::TraceL1,
        Level::Debug,
        Level::Info,
        Level::Warning,
        Level::Error,
        Level::Critical,
        Level::Backtrace,
    ];

    /// Full user-visible label, e.g. `"WARNING"`.
    pub fn label(self) -> &'static str {
        match self {
            Level::TraceL3 => "TRACE_L3",
            Level::TraceL2 => "TRACE_L2",
            Level::TraceL1 => "TRACE_L1",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
            Level::Backtrace => "BACKTRACE",
        }
    }

    /// Short code used by compact patterns, e.g. `"W"`.
    pub fn short_code(self) -> &'static str {
        match self {
            Level::TraceL3 => "T3",
            Level::TraceL2 => "T2",
            Level::TraceL1 => "T1",
            Level::Debug => "D",
            Level::Info => "I",
            Level::Warning => "W",
            Level::Error => "E",
            Level::Critical => "C",
            Level::Backtrace => "BT",
        }
    }

    /// Parse a level from its label or short code, case-insensitively.
    /// Accepts a handful of common aliases (`"warn"`, `"crit"`, `"trace"`).
    pub fn parse(name: &str) -> Option<Level> {
        let upper = name.to_ascii_uppercase();
        match upper.as_str() {
            "TRACE_L3" | "T3" => Some(Level::TraceL3),
            "TRACE_L2" | "T2" => Some(Level::TraceL2),
            "TRACE_L1" | "T1" | "TRACE" => Some(Level::TraceL1),
            "DEBUG" | "D" => Some(Level::Debug),
            "INFO" | "I" => Some(Level::Info),
            "WARNING" | "WARN" | "W" => Some(Level::Warning),
            "ERROR" | "ERR" | "E" => Some(Level::Error),
            "CRITICAL" | "CRIT" | "C" => Some(Level::Critical),
            "BACKTRACE" | "BT" => Some(Level::Backtrace),
            _ => None,
        }
    }

    /// Cheap threshold check: does a record at `self` pass a logger gated at `threshold`?
    #[inline]
    pub fn should_log(self, threshold: Level) -> bool {
        self >= threshold
    }

    /// Recovers a `Level` from its `repr(u8)` discriminant, as stored in a
    /// logger's atomic threshold. Out-of-range values saturate to `Backtrace`.
    #[inline]
    pub fn from_u8(value: u8) -> Level {
        Level::ALL.get(value as usize).copied().unwrap_or(Level::Backtrace)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Default for Level {
    fn default() -> Self {
        Level::Info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_severity() {
        assert!(Level::TraceL3 < Level::Info);
        assert!(Level::Info < Level::Error);
        assert!(Level::Error < Level::Backtrace);
    }

    #[test]
    fn parse_round_trips_labels_and_codes() {
        for lvl in Level::ALL {
            assert_eq!(Level::parse(lvl.label()), Some(lvl));
            assert_eq!(Level::parse(lvl.short_code()), Some(lvl));
            assert_eq!(Level::parse(&lvl.label().to_lowercase()), Some(lvl));
        }
        assert_eq!(Level::parse("nonsense"), None);
    }

    #[test]
    fn should_log_gates_by_threshold() {
        assert!(Level::Error.should_log(Level::Warning));
        assert!(!Level::Debug.should_log(Level::Info));
        assert!(Level::Info.should_log(Level::Info));
    }
}
