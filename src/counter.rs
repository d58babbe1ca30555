use crate::sync::atomic::{AtomicBool, AtomicIsize, Ordering};

/// Outcome of [`LiveCounter::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Release {
    /// Other instances are still live.
    Remaining(isize),
    /// This release took the counter to zero, and no earlier release had done so.
    Last,
    /// The counter went below zero: a release without a matching acquire.
    Underflow(isize),
}

/// Number of registered objects that have not been destroyed yet.
///
/// The transition to zero is reported to exactly one caller, even when several threads race
/// their final releases, through an exchange on `activated`.
pub(crate) struct LiveCounter {
    count: AtomicIsize,
    activated: AtomicBool,
}

// Macro to make new const only when not in loom.
macro_rules! new {
    ($($decl:tt)*) => {
        pub(crate) $($decl)*() -> Self {
            Self {
                count: AtomicIsize::new(0),
                activated: AtomicBool::new(false),
            }
        }
    };
}

impl LiveCounter {
    #[cfg(not(loom))]
    new!(const fn new);
    #[cfg(loom)]
    new!(fn new);

    pub(crate) fn get(&self) -> isize {
        self.count.load(Ordering::Acquire)
    }

    /// Returns the new count.
    pub(crate) fn acquire(&self) -> isize {
        self.count.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn release(&self) -> Release {
        let now = self.count.fetch_sub(1, Ordering::AcqRel) - 1;
        match now {
            n if n < 0 => Release::Underflow(n),
            0 if !self.activated.swap(true, Ordering::AcqRel) => Release::Last,
            n => Release::Remaining(n),
        }
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};

    #[test]
    fn counts_up_and_down() {
        let c = LiveCounter::new();
        assert_eq!(c.acquire(), 1);
        assert_eq!(c.acquire(), 2);
        assert_eq!(c.get(), 2);
        assert_eq!(c.release(), Release::Remaining(1));
        assert_eq!(c.release(), Release::Last);
        assert_eq!(c.get(), 0);
    }

    #[test]
    fn zero_is_reported_once() {
        let c = LiveCounter::new();
        c.acquire();
        assert_eq!(c.release(), Release::Last);
        c.acquire();
        assert_eq!(c.release(), Release::Remaining(0));
    }

    #[test]
    fn underflow_is_reported() {
        let c = LiveCounter::new();
        assert_eq!(c.release(), Release::Underflow(-1));
        assert_eq!(c.get(), -1);
    }

    #[test]
    fn racing_releases_see_one_last() {
        const THREADS: usize = 8;
        let c = Arc::new(LiveCounter::new());
        for _ in 0..THREADS {
            c.acquire();
        }
        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let c = Arc::clone(&c);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    c.release()
                })
            })
            .collect();
        let lasts = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|r| *r == Release::Last)
            .count();
        assert_eq!(lasts, 1);
        assert_eq!(c.get(), 0);
    }
}
