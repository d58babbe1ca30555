use crate::counter::{LiveCounter, Release};
use crate::event::{RegistryEvent, TraceCallback};
use crate::record::TeardownRecord;
use crate::stack::TeardownStack;
use crate::sync::atomic::{AtomicBool, Ordering};
use crate::sync::Mutex;
use crate::Anomaly;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::Arc;

#[cfg(not(loom))]
static SHARED_REGISTRY: Registry = Registry::new();

#[cfg(loom)]
loom::lazy_static! {
    static ref SHARED_REGISTRY: Registry = Registry::new();
}

/// Coordination point for construction bookkeeping and teardown.
///
/// A registry owns the two structures shared by every singleton registered with it: the
/// teardown stack, which remembers the order in which singletons finished construction, and
/// the live counter, which tracks how many of them have not been destroyed yet. Nothing else
/// reads or writes them.
///
/// Most programs only ever use the [global registry](Registry::global), which every slot
/// declared without an explicit registry belongs to. Separate registries are useful when a
/// group of singletons must be torn down independently of the rest of the process, tests
/// being the usual example.
///
/// ## Teardown
///
/// Rust never runs destructors for statics, so teardown is an explicit step, normally the
/// last thing `main` does through [`shutdown`](crate::shutdown). Teardown pops records
/// newest-first and destroys each singleton in place. Since a singleton whose constructor used
/// another singleton always finishes construction _after_ it, it is always destroyed _before_
/// it, without anyone declaring the dependency.
///
/// Teardown happens once per registry. Singletons constructed after it began are still built
/// (with a warning) and destroyed if teardown has not finished popping by then; otherwise they
/// are leaked.
pub struct Registry {
    stack: TeardownStack,
    live: LiveCounter,
    tearing_down: AtomicBool,
    // Serializes diagnostic traversals against teardown's pops. Pushes never take it.
    report: Mutex<()>,
    trace: std::sync::Mutex<Option<Arc<TraceCallback>>>,
}

// Macro to make new const only when not in loom.
macro_rules! new {
    ($($decl:tt)*) => {
        /// Construct a new, empty registry.
        ///
        /// Registries are meant to live in a `static`; slots hold `&'static` references to
        /// the registry they belong to.
        pub $($decl)*() -> Self {
            Self {
                stack: TeardownStack::new(),
                live: LiveCounter::new(),
                tearing_down: AtomicBool::new(false),
                report: Mutex::new(()),
                trace: std::sync::Mutex::new(None),
            }
        }
    };
}

impl Registry {
    #[cfg(not(loom))]
    new!(const fn new);
    #[cfg(loom)]
    new!(fn new);

    /// Get a handle to the process-wide registry.
    pub fn global() -> &'static Self {
        &SHARED_REGISTRY
    }

    /// Number of registered singletons that have not been destroyed.
    pub fn live(&self) -> isize {
        self.live.get()
    }

    /// Number of records on the teardown stack.
    ///
    /// This walks the stack and is meant for diagnostics only. With no construction or
    /// teardown in flight it equals [`live`](Self::live).
    pub fn len(&self) -> usize {
        let _report = self.report.lock().unwrap_or_else(|p| p.into_inner());
        self.stack.size()
    }

    /// True when nothing is waiting to be torn down.
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Log every record on the teardown stack, newest first, and return their labels.
    ///
    /// The first label is the singleton that will be destroyed first.
    pub fn report(&self) -> Vec<&'static str> {
        let _report = self.report.lock().unwrap_or_else(|p| p.into_inner());
        let labels: Vec<_> = self.stack.labels().collect();
        #[cfg(feature = "diagnostics")]
        for (index, label) in labels.iter().enumerate() {
            tracing::info!(index, singleton = *label, "teardown stack");
        }
        labels
    }

    /// Whether [`teardown`](Self::teardown) has been entered.
    pub fn is_tearing_down(&self) -> bool {
        self.tearing_down.load(Ordering::Acquire)
    }

    /// Put `record` on top of the teardown stack and count it as live.
    ///
    /// Returns the live count including the new record. [`Slot`](crate::Slot) calls this when
    /// a singleton finishes construction; it is public so other process-lifetime objects can
    /// join the same ordered teardown.
    ///
    /// # Safety
    ///
    /// 1. `payload` is valid to pass to the record's destructor until teardown runs it.
    /// 2. `record` is registered at most once, with exactly one registry.
    pub unsafe fn register(&self, record: &'static TeardownRecord, payload: *const ()) -> isize {
        record.attach(payload);
        // Count first: a racing teardown must never pop a record the counter does not know of.
        let live = self.live.acquire();
        self.stack.push(record);
        live
    }

    /// Destroy every registered singleton, newest first.
    ///
    /// Only the first call does anything, so racing callers destroy each singleton exactly
    /// once between them. Returns the number of singletons this call destroyed.
    ///
    /// A destructor that panics does not stop teardown: the remaining singletons are still
    /// destroyed, each panic is reported as [`Anomaly::DestructorPanicked`], and the first
    /// panic is resumed once the stack is empty.
    ///
    /// # Safety
    ///
    /// No reference obtained from a singleton of this registry may be used once its
    /// destructor has started, on any thread.
    pub unsafe fn teardown(&self) -> usize {
        if self.tearing_down.swap(true, Ordering::AcqRel) {
            diag!(debug!("teardown already entered"));
            return 0;
        }
        diag!(info!(live = self.live(), "teardown started"));
        self.emit(&RegistryEvent::TeardownStarted);

        let mut destroyed = 0;
        let mut panicked = None;
        loop {
            let record = {
                let _report = self.report.lock().unwrap_or_else(|p| p.into_inner());
                self.stack.pop()
            };
            let Some(record) = record else { break };

            diag!(debug!(index = destroyed, singleton = record.label(), "destroying"));
            // Safety: the record was attached to its payload by `register`, and the caller
            // promises the payload is no longer in use.
            let consumed = catch_unwind(AssertUnwindSafe(|| unsafe { record.consume() }));
            let consumed = consumed.unwrap_or_else(|payload| {
                // The value is gone either way; keep the remaining records on schedule.
                self.anomaly(Anomaly::DestructorPanicked {
                    label: record.label(),
                });
                panicked.get_or_insert(payload);
                true
            });
            if consumed {
                destroyed += 1;
                self.released(record.label());
            }
        }

        diag!(info!(destroyed, "teardown complete"));
        if let Some(payload) = panicked {
            resume_unwind(payload);
        }
        destroyed
    }

    fn released(&self, label: &'static str) {
        match self.live.release() {
            Release::Remaining(live) => {
                self.emit(&RegistryEvent::Destroyed { label, live });
            }
            Release::Last => {
                self.emit(&RegistryEvent::Destroyed { label, live: 0 });
                diag!(info!(singleton = label, "last live singleton destroyed"));
                self.emit(&RegistryEvent::TeardownFinished);
            }
            Release::Underflow(value) => {
                self.emit(&RegistryEvent::Destroyed { label, live: value });
                self.anomaly(Anomaly::NegativeCounter { value });
            }
        }
    }

    pub(crate) fn anomaly(&self, anomaly: Anomaly) {
        diag!(warn!("{}", anomaly));
        self.emit(&RegistryEvent::Anomaly(anomaly));
    }

    /// Sets a tracing callback that will be invoked for every event of this registry.
    ///
    /// # Example
    /// ```rust
    /// use init_singleton::Registry;
    ///
    /// Registry::global().set_trace_callback(|event| println!("[singletons] {event}"));
    /// ```
    pub fn set_trace_callback(&self, callback: impl Fn(&RegistryEvent) + Send + Sync + 'static) {
        let mut guard = self.trace.lock().unwrap_or_else(|p| p.into_inner());
        *guard = Some(Arc::new(callback));
    }

    /// Clears the tracing callback.
    pub fn clear_trace_callback(&self) {
        let mut guard = self.trace.lock().unwrap_or_else(|p| p.into_inner());
        *guard = None;
    }

    pub(crate) fn emit(&self, event: &RegistryEvent) {
        // Don't hold the lock while calling out; the callback may touch this registry.
        let callback = self
            .trace
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        if let Some(callback) = callback {
            callback(event);
        }
    }

    /// Whether the teardown stack's double-word compare-and-swap is lock-free on this target.
    #[cfg(not(loom))]
    pub fn is_lock_free() -> bool {
        crate::sync::atomic::AtomicWide::is_lock_free()
    }
}

impl core::fmt::Debug for Registry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Registry")
            .field("live", &self.live())
            .field("tearing_down", &self.is_tearing_down())
            .finish_non_exhaustive()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Tracked {
        hits: AtomicUsize,
        record: TeardownRecord,
    }

    unsafe fn hit(payload: *const ()) -> bool {
        let tracked = unsafe { &*(payload as *const Tracked) };
        tracked.hits.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn tracked(label: &'static str) -> &'static Tracked {
        Box::leak(Box::new(Tracked {
            hits: AtomicUsize::new(0),
            record: TeardownRecord::new(label, hit),
        }))
    }

    fn register(registry: &Registry, t: &'static Tracked) -> isize {
        unsafe { registry.register(&t.record, t as *const Tracked as *const ()) }
    }

    #[test]
    fn live_count_matches_stack() {
        let registry = Registry::new();
        assert!(registry.is_empty());
        assert_eq!(register(&registry, tracked("a")), 1);
        assert_eq!(register(&registry, tracked("b")), 2);
        assert_eq!(registry.live(), registry.len() as isize);
        assert_eq!(registry.report(), ["b", "a"]);
    }

    #[test]
    fn teardown_destroys_newest_first_and_once() {
        let registry = Registry::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen = Arc::clone(&order);
        registry.set_trace_callback(move |e| seen.lock().unwrap().push(e.clone()));

        let a = tracked("a");
        let b = tracked("b");
        register(&registry, a);
        register(&registry, b);

        assert_eq!(unsafe { registry.teardown() }, 2);
        assert_eq!(unsafe { registry.teardown() }, 0);
        assert!(registry.is_tearing_down());
        assert_eq!(a.hits.load(Ordering::SeqCst), 1);
        assert_eq!(b.hits.load(Ordering::SeqCst), 1);
        assert_eq!(registry.live(), 0);

        assert_eq!(
            *order.lock().unwrap(),
            [
                RegistryEvent::TeardownStarted,
                RegistryEvent::Destroyed { label: "b", live: 1 },
                RegistryEvent::Destroyed { label: "a", live: 0 },
                RegistryEvent::TeardownFinished,
            ]
        );
    }

    #[test]
    fn cleared_callback_is_not_called() {
        let registry = Registry::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        registry.set_trace_callback(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        registry.emit(&RegistryEvent::TeardownStarted);
        registry.clear_trace_callback();
        registry.emit(&RegistryEvent::TeardownStarted);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    unsafe fn explode(_: *const ()) -> bool {
        panic!("destructor failed");
    }

    #[test]
    fn panicking_destructor_does_not_strand_older_records() {
        let registry = Registry::new();
        let events = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen = Arc::clone(&events);
        registry.set_trace_callback(move |e| seen.lock().unwrap().push(e.clone()));

        let oldest = tracked("oldest");
        let faulty: &'static TeardownRecord =
            Box::leak(Box::new(TeardownRecord::new("faulty", explode)));
        let newest = tracked("newest");
        register(&registry, oldest);
        unsafe { registry.register(faulty, faulty as *const TeardownRecord as *const ()) };
        register(&registry, newest);

        let result = catch_unwind(AssertUnwindSafe(|| unsafe { registry.teardown() }));
        assert!(result.is_err());
        assert_eq!(newest.hits.load(Ordering::SeqCst), 1);
        assert_eq!(oldest.hits.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
        assert_eq!(registry.live(), 0);

        let events = events.lock().unwrap();
        assert!(events.contains(&RegistryEvent::Anomaly(Anomaly::DestructorPanicked {
            label: "faulty"
        })));
        assert_eq!(events.last(), Some(&RegistryEvent::TeardownFinished));
    }

    #[test]
    #[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
    fn teardown_stack_is_lock_free_on_wide_cas_targets() {
        assert!(Registry::is_lock_free());
    }

    #[test]
    fn global_is_one_registry() {
        assert!(core::ptr::eq(Registry::global(), Registry::global()));
    }
}
