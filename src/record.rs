use crate::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

/// The type-erased destructor stored in a [`TeardownRecord`].
///
/// It receives the payload the record was registered with and returns `true` if it actually
/// destroyed something.
///
/// # Safety (for callers)
///
/// The payload must be the one passed to [`Registry::register`](crate::Registry::register)
/// together with this record, and the destructor must not be called more than once.
pub type Destructor = unsafe fn(payload: *const ()) -> bool;

/// Everything teardown needs to destroy one registered object.
///
/// Records are intrusive: the link to the previously registered record lives inside the record
/// itself, so registering never allocates. Every [`Slot`](crate::Slot) embeds one. Records must
/// be `'static` because the teardown stack may still read a record's link after another thread
/// popped it.
pub struct TeardownRecord {
    pub(crate) next: AtomicPtr<TeardownRecord>,
    payload: AtomicPtr<()>,
    destroy: Destructor,
    label: &'static str,
    consumed: AtomicBool,
}

// Macro to make new const only when not in loom.
macro_rules! new {
    ($($decl:tt)*) => {
        /// A record that will run `destroy` on its payload during teardown.
        pub $($decl)*(label: &'static str, destroy: Destructor) -> Self {
            Self {
                next: AtomicPtr::new(core::ptr::null_mut()),
                payload: AtomicPtr::new(core::ptr::null_mut()),
                destroy,
                label,
                consumed: AtomicBool::new(false),
            }
        }
    };
}

impl TeardownRecord {
    #[cfg(not(loom))]
    new!(const fn new);
    #[cfg(loom)]
    new!(fn new);

    /// Human-readable name used in diagnostics.
    pub fn label(&self) -> &'static str {
        self.label
    }

    pub(crate) fn attach(&self, payload: *const ()) {
        // Published to other threads by the release CAS that pushes the record.
        self.payload.store(payload as *mut (), Ordering::Relaxed);
    }

    /// Run the destructor unless it already ran.
    ///
    /// # Safety
    ///
    /// The record must have been attached to a payload its destructor accepts, and nothing may
    /// use that payload once this returns.
    pub(crate) unsafe fn consume(&self) -> bool {
        if self.consumed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let payload = self.payload.swap(core::ptr::null_mut(), Ordering::Acquire);
        if payload.is_null() {
            return false;
        }
        // Safety: the caller guarantees the pairing of payload and destructor, and the
        // `consumed` swap above makes this the only call.
        unsafe { (self.destroy)(payload) }
    }
}

impl core::fmt::Debug for TeardownRecord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TeardownRecord")
            .field("label", &self.label)
            .field("consumed", &self.consumed.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use core::sync::atomic::AtomicUsize;

    unsafe fn bump(payload: *const ()) -> bool {
        let n = unsafe { &*(payload as *const AtomicUsize) };
        n.fetch_add(1, Ordering::SeqCst);
        true
    }

    #[test]
    fn destructor_runs_once() {
        let hits = AtomicUsize::new(0);
        let record = TeardownRecord::new("bump", bump);
        record.attach(&hits as *const AtomicUsize as *const ());

        assert!(unsafe { record.consume() });
        assert!(!unsafe { record.consume() });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unattached_record_does_nothing() {
        let record = TeardownRecord::new("empty", bump);
        assert!(!unsafe { record.consume() });
        assert_eq!(record.label(), "empty");
    }
}
