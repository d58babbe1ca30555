use crate::record::TeardownRecord;
use crate::sync::atomic::Ordering;
use crate::versioned::VersionedSlot;

/// Lock-free LIFO of [`TeardownRecord`]s.
///
/// Records are pushed when an object finishes construction and popped, newest first, during
/// teardown. The top of the stack is a [`VersionedSlot`], so a record popped and re-pushed
/// between a reader's load and its CAS cannot be mistaken for an unchanged top.
pub(crate) struct TeardownStack {
    top: crossbeam_utils::CachePadded<VersionedSlot<TeardownRecord>>,
}

// Macro to make new const only when not in loom.
macro_rules! new {
    ($($decl:tt)*) => {
        pub(crate) $($decl)*() -> Self {
            Self {
                top: crossbeam_utils::CachePadded::new(VersionedSlot::new()),
            }
        }
    };
}

impl TeardownStack {
    #[cfg(not(loom))]
    new!(const fn new);
    #[cfg(loom)]
    new!(fn new);

    pub(crate) fn push(&self, record: &'static TeardownRecord) {
        let record = record as *const TeardownRecord as *mut TeardownRecord;
        let mut top = self.top.load();
        loop {
            // Safety: records are 'static, and this one is not reachable from the stack yet.
            unsafe { &*record }.next.store(top.ptr(), Ordering::Relaxed);
            match self.top.compare_exchange(top, top.successor(record)) {
                Ok(()) => break,
                Err(top_now) => {
                    // Someone else moved the top, try again with that as our next ptr.
                    top = top_now;
                }
            }
        }
    }

    pub(crate) fn pop(&self) -> Option<&'static TeardownRecord> {
        let mut top = self.top.load();
        loop {
            if top.ptr().is_null() {
                return None;
            }
            // Safety: records are 'static. If `top` was popped by someone else since we loaded
            // it, `next` may be stale, but then the sequence no longer matches and the CAS
            // below fails.
            let record: &'static TeardownRecord = unsafe { &*top.ptr() };
            let next = record.next.load(Ordering::Relaxed);
            match self.top.compare_exchange(top, top.successor(next)) {
                Ok(()) => break Some(record),
                Err(top_now) => top = top_now,
            }
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.top.load().ptr().is_null()
    }

    /// Number of records currently on the stack.
    ///
    /// Best effort: it walks the links without stopping concurrent pushes or pops, so callers
    /// that want a consistent count must hold the registry's report lock.
    pub(crate) fn size(&self) -> usize {
        self.labels().count()
    }

    /// Labels from the newest record to the oldest.
    pub(crate) fn labels(&self) -> Labels {
        Labels {
            node: self.top.load().ptr(),
        }
    }
}

/// Iterator over record labels, newest first. See [`TeardownStack::labels`].
pub(crate) struct Labels {
    node: *mut TeardownRecord,
}

impl Iterator for Labels {
    type Item = &'static str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.node.is_null() {
            return None;
        }
        // Safety: records are never deallocated.
        let record: &'static TeardownRecord = unsafe { &*self.node };
        self.node = record.next.load(Ordering::Relaxed);
        Some(record.label())
    }
}
