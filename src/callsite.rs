//! The macro frontend: the ergonomic `log_*!` entry points application
//! code actually calls.
//!
//! Each `log_*!` invocation expands to: a file-scoped `static META:
//! OnceLock<Metadata>` (lazily built exactly once, the first time that
//! call site fires) plus a call to [`crate::logger::enqueue`]. The logger
//! name is always a `&'static str` literal at the call site, not a
//! runtime handle, so it can be embedded directly in the `'static`
//! metadata without leaking or indirecting through the registry.
//!
//! `function` is approximated with `module_path!()`: Rust has no stable
//! `function!()` macro, and a true caller-name trick needs a proc macro
//! this crate does not carry.

/// Builds a `should_log` + `enqueue` call for one severity level. Not
/// meant to be invoked directly; see [`log_trace_l3`] .. [`log_backtrace`].
#[macro_export]
macro_rules! fluxlog_log {
    ($level:expr, $registry:expr, $logger:expr, $logger_name:literal, $fmt:literal $(, $arg:expr)* $(,)?) => {{
        static META: ::std::sync::OnceLock<$crate::record::Metadata> = ::std::sync::OnceLock::new();
        let level = $level;
        if $logger.should_log(level) {
            let args = ($($arg,)*);
            let meta = META.get_or_init(|| {
                $crate::record::Metadata::new(
                    $logger_name,
                    $fmt,
                    file!(),
                    line!(),
                    module_path!(),
                    level,
                    $crate::codec::decode_fn_for_value(&args),
                )
            });
            $crate::logger::enqueue($registry, $logger, meta, args);
        }
    }};
}

/// `LOG_TRACE_L3(registry, logger, "name", "fmt", args...)`.
#[macro_export]
macro_rules! log_trace_l3 {
    ($registry:expr, $logger:expr, $logger_name:literal, $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::fluxlog_log!($crate::levels::Level::TraceL3, $registry, $logger, $logger_name, $fmt $(, $arg)*)
    };
}

#[macro_export]
macro_rules! log_trace_l2 {
    ($registry:expr, $logger:expr, $logger_name:literal, $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::fluxlog_log!($crate::levels::Level::TraceL2, $registry, $logger, $logger_name, $fmt $(, $arg)*)
    };
}

#[macro_export]
macro_rules! log_trace_l1 {
    ($registry:expr, $logger:expr, $logger_name:literal, $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::fluxlog_log!($crate::levels::Level::TraceL1, $registry, $logger, $logger_name, $fmt $(, $arg)*)
    };
}

#[macro_export]
macro_rules! log_debug {
    ($registry:expr, $logger:expr, $logger_name:literal, $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::fluxlog_log!($crate::levels::Level::Debug, $registry, $logger, $logger_name, $fmt $(, $arg)*)
    };
}

#[macro_export]
macro_rules! log_info {
    ($registry:expr, $logger:expr, $logger_name:literal, $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::fluxlog_log!($crate::levels::Level::Info, $registry, $logger, $logger_name, $fmt $(, $arg)*)
    };
}

#[macro_export]
macro_rules! log_warning {
    ($registry:expr, $logger:expr, $logger_name:literal, $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::fluxlog_log!($crate::levels::Level::Warning, $registry, $logger, $logger_name, $fmt $(, $arg)*)
    };
}

#[macro_export]
macro_rules! log_error {
    ($registry:expr, $logger:expr, $logger_name:literal, $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::fluxlog_log!($crate::levels::Level::Error, $registry, $logger, $logger_name, $fmt $(, $arg)*)
    };
}

#[macro_export]
macro_rules! log_critical {
    ($registry:expr, $logger:expr, $logger_name:literal, $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::fluxlog_log!($crate::levels::Level::Critical, $registry, $logger, $logger_name, $fmt $(, $arg)*)
    };
}

#[macro_export]
macro_rules! log_backtrace {
    ($registry:expr, $logger:expr, $logger_name:literal, $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::fluxlog_log!($crate::levels::Level::Backtrace, $registry, $logger, $logger_name, $fmt $(, $arg)*)
    };
}

#[cfg(test)]
mod tests {
    use crate::config::BackendOptions;
    use crate::format::pattern::{CompiledPattern, TimeZoneSelector};
    use crate::levels::Level;
    use crate::queue::OverflowPolicy;
    use crate::registry::Registry;
    use crate::sink::{ConsoleSink, ConsoleTarget, NullSink};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn s1_basic_info_end_to_end() {
        let registry = Registry::new();
        registry.start(BackendOptions::default()).unwrap();

        let pattern = CompiledPattern::compile(
            "%(log_level) %(message)",
            "%Y-%m-%d",
            TimeZoneSelector::Gmt,
            0,
        )
        .unwrap();
        let sink: Arc<Mutex<dyn crate::sink::Sink>> =
            Arc::new(Mutex::new(NullSink::new("console")));
        let logger = registry.create_or_get_logger(
            "app",
            vec![sink],
            pattern,
            Level::Info,
            OverflowPolicy::Drop,
            65536,
        );

        log_info!(&registry, &logger, "app", "x={}", 42i64);
        crate::logger::flush_sync(&registry, std::time::Duration::from_secs(1)).unwrap();
        registry.stop();

        let (total, _, _, _) = registry.metrics.snapshot();
        assert_eq!(total, 1);
    }

    #[test]
    fn level_gate_drops_before_touching_the_queue() {
        let registry = Registry::new();
        registry.start(BackendOptions::default()).unwrap();
        let pattern =
            CompiledPattern::compile("%(message)", "%Y", TimeZoneSelector::Gmt, 0).unwrap();
        let sink: Arc<Mutex<dyn crate::sink::Sink>> =
            Arc::new(Mutex::new(ConsoleSink::new("c", ConsoleTarget::Stdout, false)));
        let logger = registry.create_or_get_logger(
            "quiet",
            vec![sink],
            pattern,
            Level::Error,
            OverflowPolicy::Drop,
            4096,
        );

        log_debug!(&registry, &logger, "quiet", "hidden {}", 1i64);
        registry.stop();

        let (total, _, _, _) = registry.metrics.snapshot();
        assert_eq!(total, 0);
    }
}
