//! Process-wide registry: lifecycle state machine, idempotent
//! logger/sink creation, and the thread-safe intake list of producer
//! queues that the backend polls every iteration.
//!
//! Loggers and sinks are held behind plain `Arc<Mutex<dyn Sink>>` handles
//! rather than callback objects, and lifecycle moves through an explicit
//! `uninitialized -> running -> stopping -> stopped` state machine.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use ahash::AHashMap;
use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::clock::ClockOrigin;
use crate::config::BackendOptions;
use crate::error::{Error, Result};
use crate::format::pattern::CompiledPattern;
use crate::logger::Logger;
use crate::queue::{ByteQueue, OverflowPolicy};
use crate::sink::{Sink, SinkKind};

/// Process-wide lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Running,
    Stopping,
    Stopped,
}

/// One producer thread's queue plus the bookkeeping the backend needs to
/// poll it. The `queue` itself is swapped out in place (not replaced at
/// this handle's level) when [`crate::queue::OverflowPolicy::Unbounded`]
/// grows the ring, so the backend and the producer always agree on which
/// ring is current.
pub struct QueueSlot {
    pub queue: ArcSwap<ByteQueue>,
    pub thread_id: u64,
    pub thread_name: Option<String>,
    /// Registration order, used as the stable select-phase tie-break.
    pub registration_order: usize,
}

impl QueueSlot {
    fn new(capacity: usize, policy: OverflowPolicy, registration_order: usize) -> Self {
        let thread = std::thread::current();
        Self {
            queue: ArcSwap::new(Arc::new(ByteQueue::new(capacity, policy))),
            thread_id: thread_id_as_u64(),
            thread_name: thread.name().map(str::to_string),
            registration_order,
        }
    }
}

fn thread_id_as_u64() -> u64 {
    // `std::thread::ThreadId` carries no stable numeric accessor; we derive
    // a per-process-unique value from a monotonic counter assigned the
    // first time each thread touches a registry.
    thread_local! {
        static LOCAL_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
    }
    LOCAL_ID.with(|id| *id)
}

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

/// Aggregate counters surfaced periodically as a backend-emitted WARNING
/// summary record.
#[derive(Default)]
pub struct LoggerMetrics {
    pub total_logs: AtomicUsize,
    pub bytes_written: AtomicUsize,
    pub errors_count: AtomicUsize,
    pub dropped_logs: AtomicUsize,
    /// Records the backend has fully formatted and dispatched; always
    /// `<= total_logs`. Used with `total_logs` to compute the backend's
    /// in-flight record backlog.
    pub processed_logs: AtomicUsize,
}

impl LoggerMetrics {
    pub fn snapshot(&self) -> (usize, usize, usize, usize) {
        (
            self.total_logs.load(Ordering::Relaxed),
            self.bytes_written.load(Ordering::Relaxed),
            self.errors_count.load(Ordering::Relaxed),
            self.dropped_logs.load(Ordering::Relaxed),
        )
    }

    /// Records enqueued but not yet processed by the backend, summed
    /// across every producer queue.
    pub fn backlog(&self) -> usize {
        self.total_logs
            .load(Ordering::Relaxed)
            .saturating_sub(self.processed_logs.load(Ordering::Relaxed))
    }
}

struct SinkEntry {
    kind: SinkKind,
    sink: Arc<Mutex<dyn Sink>>,
}

/// The process-wide registry. Held behind an `Arc` so the backend thread
/// can be handed a clone while the application side keeps using the
/// original to create loggers/sinks and to call [`Registry::stop`].
pub struct Registry {
    state: Mutex<LifecycleState>,
    loggers: Mutex<AHashMap<String, Arc<Logger>>>,
    sinks: Mutex<AHashMap<String, SinkEntry>>,
    intake: Mutex<Vec<Arc<QueueSlot>>>,
    next_registration: AtomicUsize,
    pub clock_origin: ClockOrigin,
    pub metrics: Arc<LoggerMetrics>,
    backend_thread: Mutex<Option<JoinHandle<()>>>,
    stop_flag: Arc<AtomicBool>,
}

thread_local! {
    /// One queue per thread, shared by every logger that thread happens to
    /// log through. Whichever logger is first to log on a given thread
    /// decides that thread's ring capacity and overflow policy; this is a
    /// deliberate simplification documented in DESIGN.md.
    static LOCAL_SLOT: RefCell<Option<Arc<QueueSlot>>> = const { RefCell::new(None) };
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(LifecycleState::Uninitialized),
            loggers: Mutex::new(AHashMap::new()),
            sinks: Mutex::new(AHashMap::new()),
            intake: Mutex::new(Vec::new()),
            next_registration: AtomicUsize::new(0),
            clock_origin: ClockOrigin::capture(),
            metrics: Arc::new(LoggerMetrics::default()),
            backend_thread: Mutex::new(None),
            stop_flag: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// `uninitialized -> running`: spawns the dedicated backend thread.
    /// A no-op (besides returning success) if already running.
    pub fn start(self: &Arc<Self>, options: BackendOptions) -> Result<()> {
        let mut state = self.state.lock();
        if *state == LifecycleState::Running {
            return Ok(());
        }
        if *state == LifecycleState::Stopping || *state == LifecycleState::Stopped {
            return Err(Error::Config("registry already stopped; create a new one".into()));
        }
        self.stop_flag.store(false, Ordering::Relaxed);
        let registry = Arc::clone(self);
        let stop_flag = Arc::clone(&self.stop_flag);
        let name = options.backend_thread_name.clone();
        let handle = std::thread::Builder::new()
            .name(name)
            .spawn(move || crate::backend::run(registry, options, stop_flag))
            .expect("spawning the backend thread");
        *self.backend_thread.lock() = Some(handle);
        *state = LifecycleState::Running;
        Ok(())
    }

    /// `running -> stopping -> stopped`: raises the stop flag and joins
    /// the backend thread, which drains every queue and flushes every
    /// sink before returning.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock();
            if *state != LifecycleState::Running {
                return;
            }
            *state = LifecycleState::Stopping;
        }
        self.stop_flag.store(true, Ordering::Release);
        if let Some(handle) = self.backend_thread.lock().take() {
            let _ = handle.join();
        }
        *self.state.lock() = LifecycleState::Stopped;
    }

    /// Idempotent lookup/creation: an existing logger is returned
    /// unchanged, with `sinks`/`pattern` ignored.
    pub fn create_or_get_logger(
        &self,
        name: &str,
        sinks: Vec<Arc<Mutex<dyn Sink>>>,
        pattern: CompiledPattern,
        threshold: crate::levels::Level,
        overflow_policy: OverflowPolicy,
        queue_capacity: usize,
    ) -> Arc<Logger> {
        let mut loggers = self.loggers.lock();
        if let Some(existing) = loggers.get(name) {
            return Arc::clone(existing);
        }
        let logger = Arc::new(Logger::new(
            name.to_string(),
            sinks,
            pattern,
            threshold,
            overflow_policy,
            queue_capacity,
        ));
        loggers.insert(name.to_string(), Arc::clone(&logger));
        logger
    }

    pub fn get_logger(&self, name: &str) -> Option<Arc<Logger>> {
        self.loggers.lock().get(name).cloned()
    }

    /// Idempotent lookup/creation for a sink. `kind` must match the kind
    /// the sink was originally created with, or this fails
    /// `ConfigError`.
    pub fn create_or_get_sink(
        &self,
        name: &str,
        kind: SinkKind,
        make: impl FnOnce() -> Arc<Mutex<dyn Sink>>,
    ) -> Result<Arc<Mutex<dyn Sink>>> {
        let mut sinks = self.sinks.lock();
        if let Some(entry) = sinks.get(name) {
            if entry.kind != kind {
                return Err(Error::Config(format!(
                    "sink '{name}' already exists with a different kind"
                )));
            }
            return Ok(Arc::clone(&entry.sink));
        }
        let sink = make();
        sinks.insert(name.to_string(), SinkEntry { kind, sink: Arc::clone(&sink) });
        Ok(sink)
    }

    pub fn get_sink(&self, name: &str) -> Result<Arc<Mutex<dyn Sink>>> {
        self.sinks
            .lock()
            .get(name)
            .map(|e| Arc::clone(&e.sink))
            .ok_or_else(|| Error::Config(format!("no sink named '{name}'")))
    }

    /// Returns this thread's [`QueueSlot`], lazily creating and
    /// registering it with the intake list on first use.
    pub fn producer_slot(&self, capacity: usize, policy: OverflowPolicy) -> Arc<QueueSlot> {
        LOCAL_SLOT.with(|cell| {
            if let Some(slot) = cell.borrow().as_ref() {
                return Arc::clone(slot);
            }
            let order = self.next_registration.fetch_add(1, Ordering::Relaxed);
            let slot = Arc::new(QueueSlot::new(capacity, policy, order));
            self.intake.lock().push(Arc::clone(&slot));
            *cell.borrow_mut() = Some(Arc::clone(&slot));
            slot
        })
    }

    /// A snapshot of every registered producer queue, in registration
    /// order, for the backend's poll/select phases.
    pub fn intake_snapshot(&self) -> Vec<Arc<QueueSlot>> {
        self.intake.lock().clone()
    }

    pub fn all_sinks(&self) -> Vec<Arc<Mutex<dyn Sink>>> {
        self.sinks.lock().values().map(|e| Arc::clone(&e.sink)).collect()
    }

    /// Test-only: flips the lifecycle straight to `Running` without
    /// spawning a backend thread, simulating a backend that is paused
    /// (not draining) so overflow-policy tests can force real contention.
    #[cfg(test)]
    pub fn force_running_without_backend(&self) {
        *self.state.lock() = LifecycleState::Running;
    }
}

impl Default for Arc<Registry> {
    fn default() -> Self {
        Registry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::pattern::{CompiledPattern, TimeZoneSelector};
    use crate::levels::Level;
    use crate::sink::NullSink;
    use parking_lot::Mutex as PMutex;

    fn pattern() -> CompiledPattern {
        CompiledPattern::compile("%(message)", "%Y", TimeZoneSelector::Gmt, 0).unwrap()
    }

    #[test]
    fn starts_uninitialized_and_transitions_on_start_stop() {
        let registry = Registry::new();
        assert_eq!(registry.state(), LifecycleState::Uninitialized);
        registry.start(BackendOptions::default()).unwrap();
        assert_eq!(registry.state(), LifecycleState::Running);
        registry.stop();
        assert_eq!(registry.state(), LifecycleState::Stopped);
    }

    #[test]
    fn create_or_get_logger_is_idempotent() {
        let registry = Registry::new();
        let sink: Arc<PMutex<dyn Sink>> = Arc::new(PMutex::new(NullSink::new("null")));
        let l1 = registry.create_or_get_logger(
            "app",
            vec![Arc::clone(&sink)],
            pattern(),
            Level::Info,
            OverflowPolicy::Drop,
            4096,
        );
        let l2 = registry.create_or_get_logger(
            "app",
            vec![],
            pattern(),
            Level::Error,
            OverflowPolicy::Block,
            8,
        );
        assert!(Arc::ptr_eq(&l1, &l2));
        assert_eq!(l2.threshold(), Level::Info);
    }

    #[test]
    fn create_or_get_sink_rejects_kind_mismatch() {
        let registry = Registry::new();
        let _ = registry
            .create_or_get_sink("s", SinkKind::Text, || {
                Arc::new(PMutex::new(NullSink::new("s"))) as Arc<PMutex<dyn Sink>>
            })
            .unwrap();
        let err = registry
            .create_or_get_sink("s", SinkKind::Json, || {
                Arc::new(PMutex::new(NullSink::new("s"))) as Arc<PMutex<dyn Sink>>
            })
            .unwrap_err();
        assert!(err.to_string().contains("different kind"));
    }

    #[test]
    fn get_sink_fails_for_unknown_name() {
        let registry = Registry::new();
        assert!(registry.get_sink("missing").is_err());
    }

    #[test]
    fn producer_slot_is_stable_within_a_thread() {
        let registry = Registry::new();
        let a = registry.producer_slot(64, OverflowPolicy::Drop);
        let b = registry.producer_slot(64, OverflowPolicy::Drop);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.intake_snapshot().len(), 1);
    }
}
