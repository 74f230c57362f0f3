//! Error types for configuration-time and backend-reported failures.
//!
//! Per the error handling design: hot-path failures (`QueueFull`,
//! `EncodeOverflow`) are never returned to the caller as a `Result` — they
//! are recorded as counters and surfaced later as a backend summary record.
//! Only configuration-time calls (`create_or_get_sink`, pattern compilation)
//! return `Result<_, Error>` directly, because those fail fast at creation
//! time and never during logging.

use std::fmt;

/// Errors raised by `fluxlog` configuration and sink I/O.
#[derive(Debug)]
pub enum Error {
    /// A producer's queue had insufficient free space under a non-block
    /// overflow policy. Carries the number of bytes that were requested.
    QueueFull { requested: usize },
    /// A sink's `write`/`flush` failed. Carries the sink name and the
    /// underlying OS error.
    SinkIo { sink: String, source: std::io::Error },
    /// A sink was retrieved with a kind that does not match how it was
    /// created, an unknown placeholder appeared in a pattern, or a
    /// timestamp format string was malformed.
    Config(String),
    /// A single record's computed payload size exceeded the ring's total
    /// capacity, so it could not be serialized even into an empty ring.
    EncodeOverflow { needed: usize, capacity: usize },
    /// `enqueue` was called after the backend had already stopped.
    Shutdown,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::QueueFull { requested } => {
                write!(f, "producer queue full (requested {requested} bytes)")
            }
            Error::SinkIo { sink, source } => {
                write!(f, "sink '{sink}' I/O error: {source}")
            }
            Error::Config(msg) => write!(f, "configuration error: {msg}"),
            Error::EncodeOverflow { needed, capacity } => write!(
                f,
                "record of {needed} bytes cannot fit in a ring of capacity {capacity}"
            ),
            Error::Shutdown => write!(f, "logger is shut down, no further records are accepted"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::SinkIo { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Convenience alias for `fluxlog`'s fallible, configuration-time operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_descriptive() {
        let e = Error::QueueFull { requested: 64 };
        assert!(e.to_string().contains("64 bytes"));

        let e = Error::EncodeOverflow { needed: 200, capacity: 128 };
        assert!(e.to_string().contains("200"));
        assert!(e.to_string().contains("128"));

        let e = Error::Config("unknown placeholder %(bogus)".into());
        assert!(e.to_string().contains("unknown placeholder"));
    }

    #[test]
    fn sink_io_exposes_source() {
        use std::error::Error as _;
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let e = Error::SinkIo { sink: "app.log".into(), source: io };
        assert!(e.source().is_some());
    }
}
