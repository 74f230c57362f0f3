//! The `Logger` handle: a name, an ordered list of sinks, a compiled
//! pattern, and an atomically-readable level threshold.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::codec::{ScratchEncode, SizeScratch};
use crate::error::{Error, Result};
use crate::format::pattern::CompiledPattern;
use crate::levels::Level;
use crate::queue::{ByteQueue, OverflowPolicy};
use crate::record::{Metadata, RecordHeader};
use crate::registry::Registry;
use crate::sink::Sink;

/// A named logger: the unit of sink routing, pattern formatting, and
/// level gating.
pub struct Logger {
    name: String,
    sinks: Vec<Arc<Mutex<dyn Sink>>>,
    pattern: CompiledPattern,
    threshold: AtomicU8,
    overflow_policy: OverflowPolicy,
    queue_capacity: usize,
}

impl Logger {
    pub fn new(
        name: String,
        sinks: Vec<Arc<Mutex<dyn Sink>>>,
        pattern: CompiledPattern,
        threshold: Level,
        overflow_policy: OverflowPolicy,
        queue_capacity: usize,
    ) -> Self {
        Self {
            name,
            sinks,
            pattern,
            threshold: AtomicU8::new(threshold as u8),
            overflow_policy,
            queue_capacity,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sinks(&self) -> &[Arc<Mutex<dyn Sink>>] {
        &self.sinks
    }

    pub fn pattern(&self) -> &CompiledPattern {
        &self.pattern
    }

    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.overflow_policy
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    #[inline]
    pub fn threshold(&self) -> Level {
        Level::from_u8(self.threshold.load(Ordering::Relaxed))
    }

    pub fn set_threshold(&self, level: Level) {
        self.threshold.store(level as u8, Ordering::Relaxed);
    }

    /// Constant-time level check.
    #[inline]
    pub fn should_log(&self, level: Level) -> bool {
        level.should_log(self.threshold())
    }
}

thread_local! {
    /// Reused across every record this thread publishes: the size pass
    /// caches each argument's computed size here so the encode pass reads
    /// offsets back instead of asking each argument to recompute them.
    static SIZE_SCRATCH: RefCell<SizeScratch> = RefCell::new(SizeScratch::new());
}

/// Encodes `args` and publishes a record on the calling thread's queue.
/// Never blocks unless the thread's ring is under [`OverflowPolicy::Block`].
/// Returns immediately, without touching the queue at all, if the registry
/// isn't running or the level is gated out.
pub fn enqueue<T: ScratchEncode>(
    registry: &Registry,
    logger: &Logger,
    metadata: &'static Metadata,
    args: T,
) {
    use crate::registry::LifecycleState;
    if registry.state() != LifecycleState::Running {
        return;
    }
    if !logger.should_log(metadata.level) {
        return;
    }

    let slot = registry.producer_slot(logger.queue_capacity(), logger.overflow_policy());
    let ticks = registry.clock_origin.ticks_now();
    let payload_len = SIZE_SCRATCH.with(|scratch| args.size_into_scratch(&mut scratch.borrow_mut()));
    let total = RecordHeader::ENCODED_SIZE + payload_len;

    let mut current = slot.queue.load_full();
    loop {
        if total + 4 > current.capacity() {
            match current.overflow_policy() {
                OverflowPolicy::Unbounded => {
                    let grown = Arc::new(ByteQueue::new(
                        (total + 4).next_power_of_two(),
                        OverflowPolicy::Unbounded,
                    ));
                    slot.queue.store(Arc::clone(&grown));
                    current = grown;
                    continue;
                }
                _ => {
                    registry.metrics.dropped_logs.fetch_add(1, Ordering::Relaxed);
                    current.record_drop();
                    return;
                }
            }
        }

        match current.reserve(total) {
            Ok(mut reservation) => {
                let header = RecordHeader::new(payload_len, ticks, metadata);
                let buf = reservation.as_mut_slice();
                let (header_buf, payload_buf) = buf.split_at_mut(RecordHeader::ENCODED_SIZE);
                header.write(header_buf);
                SIZE_SCRATCH.with(|scratch| args.encode_cached(payload_buf, &scratch.borrow()));
                reservation.commit();
                registry.metrics.total_logs.fetch_add(1, Ordering::Relaxed);
                registry.metrics.bytes_written.fetch_add(total, Ordering::Relaxed);
                return;
            }
            Err(_) => match current.overflow_policy() {
                OverflowPolicy::Block => {
                    std::hint::spin_loop();
                    continue;
                }
                OverflowPolicy::Drop => {
                    registry.metrics.dropped_logs.fetch_add(1, Ordering::Relaxed);
                    current.record_drop();
                    return;
                }
                OverflowPolicy::Unbounded => {
                    if current.is_drained() {
                        let grown = Arc::new(ByteQueue::new(
                            current.capacity() * 2,
                            OverflowPolicy::Unbounded,
                        ));
                        slot.queue.store(Arc::clone(&grown));
                        current = grown;
                    } else {
                        std::hint::spin_loop();
                    }
                    continue;
                }
            },
        }
    }
}

/// Producer-side wait until the backend has drained this thread's queue.
/// Polls with a short sleep rather than blocking on a condition variable,
/// since the backend thread never signals producers directly.
pub fn flush_sync(registry: &Registry, timeout: std::time::Duration) -> Result<()> {
    let slot = registry.producer_slot(4096, OverflowPolicy::Drop);
    let deadline = std::time::Instant::now() + timeout;
    loop {
        if slot.queue.load().is_drained() {
            return Ok(());
        }
        if std::time::Instant::now() >= deadline {
            return Err(Error::Shutdown);
        }
        std::thread::sleep(std::time::Duration::from_micros(200));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode_fn_for_value, DecodeFn};
    use crate::format::pattern::TimeZoneSelector;
    use crate::sink::NullSink;
    use std::sync::OnceLock;

    fn decode_i64(buf: &[u8]) -> (crate::codec::Value<'_>, usize) {
        <(i64,) as Encode>::decode(buf)
    }

    fn metadata(decode: DecodeFn) -> &'static Metadata {
        static META: OnceLock<Metadata> = OnceLock::new();
        META.get_or_init(|| {
            Metadata::new("app", "x={}", "src/logger.rs", 1, "test", Level::Info, decode)
        })
    }

    #[test]
    fn should_log_reflects_threshold() {
        let logger = Logger::new(
            "app".into(),
            vec![],
            CompiledPattern::compile("%(message)", "%Y", TimeZoneSelector::Gmt, 0).unwrap(),
            Level::Warning,
            OverflowPolicy::Drop,
            4096,
        );
        assert!(!logger.should_log(Level::Debug));
        assert!(logger.should_log(Level::Error));
        logger.set_threshold(Level::Debug);
        assert!(logger.should_log(Level::Debug));
    }

    #[test]
    fn enqueue_is_a_no_op_when_registry_is_not_running() {
        let registry = Registry::new();
        let logger = Logger::new(
            "app".into(),
            vec![Arc::new(Mutex::new(NullSink::new("n")))],
            CompiledPattern::compile("%(message)", "%Y", TimeZoneSelector::Gmt, 0).unwrap(),
            Level::Info,
            OverflowPolicy::Drop,
            4096,
        );
        let meta = metadata(decode_i64);
        enqueue(&registry, &logger, meta, (42i64,));
        assert_eq!(registry.metrics.total_logs.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn enqueue_gates_on_level_before_touching_the_queue() {
        let registry = Registry::new();
        registry.start(crate::config::BackendOptions::default()).unwrap();
        let logger = Logger::new(
            "app".into(),
            vec![],
            CompiledPattern::compile("%(message)", "%Y", TimeZoneSelector::Gmt, 0).unwrap(),
            Level::Error,
            OverflowPolicy::Drop,
            4096,
        );
        let meta = metadata(decode_fn_for_value(&(1i64,)));
        enqueue(&registry, &logger, meta, (1i64,));
        assert_eq!(registry.metrics.total_logs.load(Ordering::Relaxed), 0);
        registry.stop();
    }
}
