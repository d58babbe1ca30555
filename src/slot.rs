use crate::record::TeardownRecord;
use crate::registry::Registry;
use crate::sync::atomic::{AtomicPtr, AtomicU8, AtomicUsize, Ordering};
use crate::sync::{thread_token, SpinLock, UNKNOWN_THREAD};
use crate::{Anomaly, InitPolicy, Lazy, RegistryEvent, SingletonError};
use core::cell::UnsafeCell;
use core::mem::MaybeUninit;

const EMPTY: u8 = 0;
const CONSTRUCTING: u8 = 1;
const READY: u8 = 2;
const DESTROYED: u8 = 3;

/// Storage and bookkeeping for one process-wide instance of `T`.
///
/// A slot lives in a `static` and goes through `Empty → Constructing → Ready → Destroyed`,
/// never backwards except that a construction that fails (its constructor panicked) returns
/// the slot to `Empty`.
///
/// The first access constructs `T` in place, under a spin guard that is private to this slot,
/// and then publishes a pointer to it. Every later access is a single acquire load of that
/// pointer; the guard is never touched again. Construction also pushes the slot's embedded
/// [`TeardownRecord`] onto its registry, which is what later destroys `T` in the right order.
///
/// Most code declares slots through [`singleton!`](crate::singleton). Declaring one by hand
/// works for any type, including ones the orphan rule keeps out of
/// [`Singleton`](crate::Singleton):
///
/// ```rust
/// use init_singleton::Slot;
/// use std::sync::atomic::{AtomicU64, Ordering};
///
/// static REQUESTS: Slot<AtomicU64> = Slot::new("requests", AtomicU64::default);
///
/// REQUESTS.get().fetch_add(1, Ordering::Relaxed);
/// assert_eq!(REQUESTS.get().load(Ordering::Relaxed), 1);
/// ```
pub struct Slot<T> {
    // Null until construction succeeds, then the address of `value` until teardown.
    ready: AtomicPtr<T>,
    state: AtomicU8,
    guard: SpinLock,
    // Token of the thread currently running `init`, 0 when none is.
    constructing_on: AtomicUsize,
    init_count: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
    record: TeardownRecord,
    init: fn() -> T,
    prepare: fn(),
    eager: bool,
    policy: &'static str,
    registry: Option<&'static Registry>,
}

// Safety: `value` is written once, under the guard, before it is published with release
// ordering, and only shared immutably afterwards. Teardown may drop it on another thread.
unsafe impl<T: Send + Sync> Sync for Slot<T> {}

impl<T> Slot<T> {
    /// A slot in the [global registry](Registry::global) that constructs its value with
    /// `init`.
    pub const fn new(label: &'static str, init: fn() -> T) -> Self {
        Self::build(None, label, init)
    }

    /// A slot whose teardown is managed by `registry` instead of the global one.
    pub const fn in_registry(
        registry: &'static Registry,
        label: &'static str,
        init: fn() -> T,
    ) -> Self {
        Self::build(Some(registry), label, init)
    }

    /// Run `prepare` before every construction attempt. See [`InitHelper`](crate::InitHelper).
    pub const fn with_helper(mut self, prepare: fn()) -> Self {
        self.prepare = prepare;
        self
    }

    /// Declare when the instance is expected to be constructed. Slots are [`Lazy`] unless
    /// told otherwise; an [`Eager`](crate::Eager) slot first constructed outside
    /// [`Startup::run`](crate::Startup::run) is reported as an anomaly.
    pub const fn with_policy<P: InitPolicy>(mut self) -> Self {
        self.eager = P::EAGER;
        self.policy = P::NAME;
        self
    }

    const fn build(
        registry: Option<&'static Registry>,
        label: &'static str,
        init: fn() -> T,
    ) -> Self {
        Self {
            ready: AtomicPtr::new(core::ptr::null_mut()),
            state: AtomicU8::new(EMPTY),
            guard: SpinLock::new(),
            constructing_on: AtomicUsize::new(0),
            init_count: AtomicUsize::new(0),
            value: UnsafeCell::new(MaybeUninit::uninit()),
            record: TeardownRecord::new(label, Self::destroy_erased),
            init,
            prepare: noop,
            eager: <Lazy as InitPolicy>::EAGER,
            policy: <Lazy as InitPolicy>::NAME,
            registry,
        }
    }

    /// The instance, constructing it first if needed.
    ///
    /// # Panics
    ///
    /// On a [circular dependency](SingletonError::CircularDependency), or if the slot was
    /// already torn down. Use [`try_get`](Self::try_get) to handle those as errors.
    #[inline]
    #[track_caller]
    pub fn get(&'static self) -> &'static T {
        match self.try_get() {
            Ok(value) => value,
            Err(e) => panic!("{e}"),
        }
    }

    /// The instance, constructing it first if needed.
    #[inline]
    pub fn try_get(&'static self) -> Result<&'static T, SingletonError> {
        let ptr = self.ready.load(Ordering::Acquire);
        if !ptr.is_null() {
            // Safety: `ready` is only set after `value` is fully written, with release
            // ordering, and is cleared before `value` is dropped.
            return Ok(unsafe { &*ptr });
        }
        self.get_slow()
    }

    #[cold]
    fn get_slow(&'static self) -> Result<&'static T, SingletonError> {
        let me = thread_token();
        if self.reentered(me) {
            diag!(error!(singleton = self.label(), "circular dependency"));
            return Err(SingletonError::CircularDependency {
                label: self.label(),
            });
        }

        let guard = self.guard.lock();
        match self.state.load(Ordering::Acquire) {
            READY => {
                // Someone else finished constructing while we waited.
                drop(guard);
                // Safety: READY means `value` is initialized, and it stays so until teardown.
                return Ok(unsafe { (*self.value.get()).assume_init_ref() });
            }
            DESTROYED => {
                return Err(SingletonError::Destroyed {
                    label: self.label(),
                })
            }
            state => debug_assert_eq!(state, EMPTY),
        }

        let registry = self.registry();
        // The helper already counts as part of this construction.
        self.constructing_on.store(me, Ordering::Relaxed);
        let rollback = Rollback { slot: self };
        (self.prepare)();

        let late = registry.is_tearing_down();
        let unlisted = self.eager && !crate::startup::is_running();
        let count = self.init_count.fetch_add(1, Ordering::Relaxed) + 1;
        self.state.store(CONSTRUCTING, Ordering::Relaxed);

        let value = (self.init)();
        // Safety: we hold the guard and the slot is Constructing, so nothing else reads or
        // writes the storage.
        let ptr: *mut T = unsafe { (*self.value.get()).write(value) };
        core::mem::forget(rollback);

        // Safety: the slot is 'static, and `destroy_erased` expects exactly this payload. The
        // state machine only lets a slot reach this point once.
        let live = unsafe { registry.register(&self.record, self as *const Self as *const ()) };
        self.constructing_on.store(0, Ordering::Relaxed);
        self.state.store(READY, Ordering::Release);
        self.ready.store(ptr, Ordering::Release);
        drop(guard);

        let label = self.label();
        if late {
            registry.anomaly(Anomaly::LateConstruction { label });
        }
        if unlisted {
            registry.anomaly(Anomaly::EagerOutsideStartup { label });
        }
        if count > 1 {
            registry.anomaly(Anomaly::RepeatedInitialization { label, count });
        }
        diag!(debug!(singleton = label, policy = self.policy, live, "constructed"));
        registry.emit(&RegistryEvent::Constructed { label, live });

        // Safety: just initialized, see above.
        Ok(unsafe { &*ptr })
    }

    fn reentered(&self, me: usize) -> bool {
        // Only this thread ever stores its own token, so a relaxed load is enough to see it.
        me != UNKNOWN_THREAD && self.constructing_on.load(Ordering::Relaxed) == me
    }

    /// # Safety
    ///
    /// `payload` must be the `&'static Slot<T>` that registered the record.
    unsafe fn destroy_erased(payload: *const ()) -> bool {
        let slot = unsafe { &*(payload as *const Self) };
        // Safety: forwarded from the caller.
        unsafe { slot.destroy() }
    }

    /// # Safety
    ///
    /// No reference handed out by this slot may be used once this starts.
    unsafe fn destroy(&self) -> bool {
        if self
            .state
            .compare_exchange(READY, DESTROYED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.ready.store(core::ptr::null_mut(), Ordering::Release);
        // Safety: the slot was READY, so `value` holds a `T`; the CAS above made this the only
        // transition out of READY.
        unsafe { core::ptr::drop_in_place((*self.value.get()).as_mut_ptr()) };
        true
    }

    /// The registry this slot registers with.
    pub fn registry(&self) -> &'static Registry {
        self.registry.unwrap_or_else(Registry::global)
    }

    pub fn label(&self) -> &'static str {
        self.record.label()
    }

    /// Whether the instance exists and can be handed out without locking.
    pub fn is_ready(&self) -> bool {
        !self.ready.load(Ordering::Acquire).is_null()
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.load(Ordering::Acquire) == DESTROYED
    }

    /// Number of construction attempts started so far; anything above 1 is unusual.
    pub fn init_count(&self) -> usize {
        self.init_count.load(Ordering::Relaxed)
    }

    /// Number of times the construction guard was taken. Stays put once the slot is ready.
    pub fn guard_acquisitions(&self) -> usize {
        self.guard.acquisitions()
    }
}

fn noop() {}

/// Puts a slot back to Empty if its constructor unwinds.
struct Rollback<'a, T> {
    slot: &'a Slot<T>,
}

impl<T> Drop for Rollback<'_, T> {
    fn drop(&mut self) {
        diag!(warn!(singleton = self.slot.label(), "construction failed"));
        self.slot.constructing_on.store(0, Ordering::Relaxed);
        self.slot.state.store(EMPTY, Ordering::Release);
    }
}

impl<T> core::fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = match self.state.load(Ordering::Acquire) {
            EMPTY => "empty",
            CONSTRUCTING => "constructing",
            READY => "ready",
            _ => "destroyed",
        };
        f.debug_struct("Slot")
            .field("label", &self.label())
            .field("state", &state)
            .field("policy", &self.policy)
            .field("init_count", &self.init_count())
            .finish_non_exhaustive()
    }
}
