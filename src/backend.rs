//! The backend loop: the single dedicated thread that drains every
//! producer queue, orders records by timestamp, formats them, and
//! dispatches to sinks.
//!
//! Each iteration snapshots every registered queue, selects the
//! oldest-timestamped record across them, formats and dispatches it, then
//! advances that queue's read cursor. A housekeeping phase runs on a timer
//! to flush sinks and emit a metrics summary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::WallClockMapping;
use crate::codec::Value;
use crate::config::BackendOptions;
use crate::format::json;
use crate::format::RecordView;
use crate::levels::Level;
use crate::message::Template;
use crate::record::RecordHeader;
use crate::registry::{QueueSlot, Registry};
use crate::sink::SinkKind;

/// One pass over every registered queue's visible header, used by both
/// the select phase and the shutdown drain to decide which queue (if any)
/// has the oldest unprocessed record.
fn peek_oldest(slots: &[Arc<QueueSlot>]) -> Option<usize> {
    let mut best: Option<(usize, crate::clock::Ticks)> = None;
    for (idx, slot) in slots.iter().enumerate() {
        let guard = slot.queue.load();
        while guard.skip_wrap_marker() {}
        let peek = guard.peek();
        if peek.bytes.len() < RecordHeader::ENCODED_SIZE {
            continue;
        }
        let header = RecordHeader::read(peek.bytes);
        if peek.bytes.len() < header.total_size as usize {
            continue;
        }
        match best {
            Some((_, ts)) if ts <= header.timestamp => {}
            _ => best = Some((idx, header.timestamp)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Formats and dispatches the single oldest-visible record on `slot`,
/// then consumes it. Returns `true` if a record was actually processed.
fn process_one(registry: &Registry, slot: &QueueSlot, wall: &WallClockMapping) -> bool {
    let guard = slot.queue.load();
    while guard.skip_wrap_marker() {}
    let peek = guard.peek();
    if peek.bytes.len() < RecordHeader::ENCODED_SIZE {
        return false;
    }
    let header = RecordHeader::read(peek.bytes);
    let total = header.total_size as usize;
    if peek.bytes.len() < total {
        return false;
    }

    // SAFETY: `metadata_ptr` was written by `RecordHeader::new` from a
    // genuine `&'static Metadata`; every record in the ring came from
    // `crate::logger::enqueue`, which never writes anything else.
    let meta = unsafe { header.metadata() };
    let payload = &peek.bytes[RecordHeader::ENCODED_SIZE..total];
    let (decoded, _) = (meta.decode)(payload);
    let args = match decoded {
        Value::Seq(items) => items,
        other => vec![other],
    };

    let template = Template::parse(meta.format_str);
    let (message, named_args) = template.render(&args);
    let wall_time = wall.to_datetime(header.timestamp);

    let view = RecordView {
        wall_time,
        level: meta.level,
        logger: meta.logger,
        file: meta.file,
        line: meta.line,
        function: meta.function,
        thread_id: slot.thread_id,
        thread_name: slot.thread_name.as_deref(),
        process_id: std::process::id(),
        format_str: meta.format_str,
        message: &message,
        named_args: &named_args,
        tags: &[],
    };

    match registry.get_logger(meta.logger) {
        Some(logger) => {
            for sink in logger.sinks() {
                let mut sink = sink.lock();
                let line = match sink.kind() {
                    SinkKind::Text => logger.pattern().format(&view),
                    SinkKind::Json => json::render_line(&view),
                };
                if let Err(err) = sink.write(meta.level, &line) {
                    registry.metrics.errors_count.fetch_add(1, Ordering::Relaxed);
                    report_backend_error(&format!("sink '{}' write failed: {err}", sink.name()));
                }
            }
        }
        None => {
            registry.metrics.errors_count.fetch_add(1, Ordering::Relaxed);
            report_backend_error(&format!("no logger registered for '{}'", meta.logger));
        }
    }

    guard.consume(total);
    registry.metrics.processed_logs.fetch_add(1, Ordering::Relaxed);
    true
}

/// Processes additional records, past the one `run`'s main iteration
/// already handled, while the backlog (enqueued minus processed, across
/// every queue) stays above `transit_events_soft_limit`. Keeps a producer
/// burst from being stretched thin across many housekeeping ticks. Once
/// the backlog also crosses `transit_events_hard_limit`, reports a single
/// backend error per excursion instead of one every loop iteration.
fn drain_backlog(
    registry: &Registry,
    options: &BackendOptions,
    wall: &WallClockMapping,
    hard_limit_reported: &mut bool,
) {
    loop {
        let backlog = registry.metrics.backlog();
        if backlog <= options.transit_events_soft_limit {
            *hard_limit_reported = false;
            return;
        }
        if backlog >= options.transit_events_hard_limit && !*hard_limit_reported {
            report_backend_error(&format!(
                "record backlog ({backlog}) reached the hard limit ({}); draining as fast as possible",
                options.transit_events_hard_limit
            ));
            *hard_limit_reported = true;
        }

        let slots = registry.intake_snapshot();
        match peek_oldest(&slots) {
            Some(idx) => {
                process_one(registry, &slots[idx], wall);
            }
            None => return,
        }
    }
}

/// Default backend-error handler: writes to standard error. A single
/// failing sink or unknown logger never halts the loop.
fn report_backend_error(message: &str) {
    eprintln!("fluxlog backend error: {message}");
}

/// Flushes every registered sink and rotates file sinks that are due.
fn run_housekeeping(registry: &Registry, now: chrono::DateTime<chrono::Utc>) {
    for sink in registry.all_sinks() {
        let mut sink = sink.lock();
        if let Err(err) = sink.rotate_if_needed(now) {
            report_backend_error(&format!("sink '{}' rotate failed: {err}", sink.name()));
        }
        if let Err(err) = sink.flush() {
            report_backend_error(&format!("sink '{}' flush failed: {err}", sink.name()));
        }
    }
}

/// Emits a self-hosted WARNING summary record of dropped/error counts
/// since the last summary, directly to every known sink's console/file
/// text rendering path (no logger round-trip, since this runs on the
/// backend thread itself and must never depend on a producer queue).
fn emit_diagnostic_summary(registry: &Registry, last: &mut (usize, usize)) {
    let (_, _, errors, dropped) = registry.metrics.snapshot();
    if errors == last.0 && dropped == last.1 {
        return;
    }
    let line = format!(
        "WARNING fluxlog summary: {} dropped record(s), {} sink/backend error(s) so far",
        dropped, errors
    );
    for sink in registry.all_sinks() {
        let mut sink = sink.lock();
        let _ = sink.write(Level::Warning, &line);
    }
    *last = (errors, dropped);
}

/// The backend thread's entry point, spawned by [`Registry::start`].
/// Runs the snapshot/select/format/dispatch/advance/housekeeping loop
/// until `stop_flag` is raised, then drains every queue (bounded by
/// `options.shutdown_timeout`) and flushes every sink before returning.
pub fn run(registry: Arc<Registry>, options: BackendOptions, stop_flag: Arc<AtomicBool>) {
    let mut wall = WallClockMapping::calibrate(&registry.clock_origin);
    let mut last_resync = Instant::now();
    let mut last_housekeeping = Instant::now();
    let mut last_summary = (0usize, 0usize);
    let mut sleep = options.sleep_duration_min;
    let mut hard_limit_reported = false;

    loop {
        if stop_flag.load(Ordering::Acquire) {
            break;
        }

        if last_resync.elapsed() >= options.rdtsc_resync_interval {
            wall.resync(&registry.clock_origin);
            last_resync = Instant::now();
        }

        let slots = registry.intake_snapshot();
        match peek_oldest(&slots) {
            Some(idx) => {
                process_one(&registry, &slots[idx], &wall);
                sleep = options.sleep_duration_min;
                drain_backlog(&registry, &options, &wall, &mut hard_limit_reported);
            }
            None => {
                std::thread::sleep(sleep);
                sleep = (sleep * 2).min(options.sleep_duration_max);
            }
        }

        if last_housekeeping.elapsed() >= options.housekeeping_interval {
            run_housekeeping(&registry, chrono::Utc::now());
            emit_diagnostic_summary(&registry, &mut last_summary);
            last_housekeeping = Instant::now();
        }
    }

    // Shutdown: drain every queue until empty or the timeout expires.
    let deadline = Instant::now() + options.shutdown_timeout;
    loop {
        let slots = registry.intake_snapshot();
        match peek_oldest(&slots) {
            Some(idx) => {
                process_one(&registry, &slots[idx], &wall);
            }
            None => break,
        }
        if Instant::now() >= deadline {
            report_backend_error("shutdown timeout expired with records still queued");
            break;
        }
    }

    run_housekeeping(&registry, chrono::Utc::now());
    emit_diagnostic_summary(&registry, &mut last_summary);
}
