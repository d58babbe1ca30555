#[cfg(loom)]
pub(crate) mod atomic {
    pub(crate) use loom::sync::atomic::{AtomicBool, AtomicIsize, AtomicPtr, AtomicUsize, Ordering};

    /// Double-word cell. loom has no 128-bit atomic, so the model serializes through a mutex,
    /// which still lets it explore every interleaving of the surrounding CAS loops.
    pub(crate) struct AtomicWide(loom::sync::Mutex<u128>);

    impl AtomicWide {
        pub(crate) fn new(v: u128) -> Self {
            Self(loom::sync::Mutex::new(v))
        }

        pub(crate) fn load(&self) -> u128 {
            *self.0.lock().unwrap_or_else(|p| p.into_inner())
        }

        pub(crate) fn compare_exchange(&self, current: u128, new: u128) -> Result<u128, u128> {
            let mut v = self.0.lock().unwrap_or_else(|p| p.into_inner());
            if *v == current {
                *v = new;
                Ok(current)
            } else {
                Err(*v)
            }
        }
    }
}
#[cfg(loom)]
pub(crate) use loom::sync::Mutex;

#[cfg(not(loom))]
pub(crate) mod atomic {
    pub(crate) use core::sync::atomic::{
        AtomicBool, AtomicIsize, AtomicPtr, AtomicU8, AtomicUsize, Ordering,
    };

    /// Double-word cell.
    ///
    /// `portable_atomic` uses the native 16-byte compare-and-swap (`cmpxchg16b` on x86_64,
    /// `casp` or LL/SC on aarch64), detected at run time where the build target does not
    /// guarantee it. Only targets without one fall back to a lock inside that crate.
    pub(crate) struct AtomicWide(portable_atomic::AtomicU128);

    impl AtomicWide {
        pub(crate) const fn new(v: u128) -> Self {
            Self(portable_atomic::AtomicU128::new(v))
        }

        pub(crate) fn load(&self) -> u128 {
            self.0.load(Ordering::Acquire)
        }

        pub(crate) fn compare_exchange(&self, current: u128, new: u128) -> Result<u128, u128> {
            self.0
                .compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
        }

        pub(crate) fn is_lock_free() -> bool {
            portable_atomic::AtomicU128::is_lock_free()
        }
    }
}
#[cfg(not(loom))]
pub(crate) use std::sync::Mutex;

#[cfg(not(loom))]
pub(crate) use spin::SpinLock;

#[cfg(not(loom))]
mod spin {
    use super::atomic::{AtomicBool, AtomicUsize, Ordering};
    use crossbeam_utils::Backoff;

    /// Guard for first construction of a single slot. It is never taken on the fast path.
    pub(crate) struct SpinLock {
        locked: AtomicBool,
        acquisitions: AtomicUsize,
    }

    pub(crate) struct SpinGuard<'a> {
        lock: &'a SpinLock,
    }

    impl SpinLock {
        pub(crate) const fn new() -> Self {
            Self {
                locked: AtomicBool::new(false),
                acquisitions: AtomicUsize::new(0),
            }
        }

        pub(crate) fn lock(&self) -> SpinGuard<'_> {
            let backoff = Backoff::new();
            while self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_err()
            {
                // Spin on a plain load so waiters don't keep the line exclusive.
                while self.locked.load(Ordering::Relaxed) {
                    backoff.snooze();
                }
            }
            self.acquisitions.fetch_add(1, Ordering::Relaxed);
            SpinGuard { lock: self }
        }

        pub(crate) fn acquisitions(&self) -> usize {
            self.acquisitions.load(Ordering::Relaxed)
        }
    }

    impl Drop for SpinGuard<'_> {
        fn drop(&mut self) {
            self.lock.locked.store(false, Ordering::Release);
        }
    }
}

/// A small non-zero number identifying the calling thread for as long as it runs, or
/// [`UNKNOWN_THREAD`] once the thread's locals are gone.
///
/// Used to tell a construction that recursed into its own slot apart from another thread that
/// is merely waiting on the slot's guard.
#[cfg(not(loom))]
pub(crate) const UNKNOWN_THREAD: usize = 0;

#[cfg(not(loom))]
pub(crate) fn thread_token() -> usize {
    use atomic::{AtomicUsize, Ordering};

    static NEXT: AtomicUsize = AtomicUsize::new(1);
    std::thread_local! {
        static TOKEN: usize = NEXT.fetch_add(1, Ordering::Relaxed);
    }
    // Thread-local storage is already gone while the thread itself is being torn down. Such
    // threads share no identity, so none of them may be taken for another.
    TOKEN.try_with(|t| *t).unwrap_or(UNKNOWN_THREAD)
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn thread_tokens_differ_across_threads() {
        let here = thread_token();
        assert_ne!(here, UNKNOWN_THREAD);
        assert_eq!(here, thread_token());
        let there = std::thread::spawn(thread_token).join().unwrap();
        assert_ne!(here, there);
    }

    #[test]
    fn spin_lock_counts_acquisitions() {
        let lock = Arc::new(SpinLock::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lock = Arc::clone(&lock);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        drop(lock.lock());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(lock.acquisitions(), 400);
    }

    #[test]
    fn wide_cell_rejects_stale_expected_value() {
        let cell = atomic::AtomicWide::new(7);
        assert_eq!(cell.compare_exchange(7, 8), Ok(7));
        assert_eq!(cell.compare_exchange(7, 9), Err(8));
        assert_eq!(cell.load(), 8);
    }
}
