use crate::sync::atomic::AtomicWide;
use core::marker::PhantomData;

/// A pointer together with the number of mutations its slot has seen.
///
/// Two views are only equal when both halves match, so a node that is popped and pushed again
/// (same address, later sequence) never compares equal to a stale read.
pub(crate) struct Versioned<T> {
    ptr: *mut T,
    seq: u64,
}

impl<T> Clone for Versioned<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Versioned<T> {}

impl<T> PartialEq for Versioned<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr && self.seq == other.seq
    }
}
impl<T> Eq for Versioned<T> {}

impl<T> core::fmt::Debug for Versioned<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Versioned")
            .field("ptr", &self.ptr)
            .field("seq", &self.seq)
            .finish()
    }
}

impl<T> Versioned<T> {
    pub(crate) fn ptr(&self) -> *mut T {
        self.ptr
    }

    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }

    /// The view that replaces `self` when the slot is repointed at `ptr`.
    pub(crate) fn successor(&self, ptr: *mut T) -> Self {
        Versioned {
            ptr,
            seq: self.seq.wrapping_add(1),
        }
    }

    fn pack(self) -> u128 {
        (u128::from(self.seq) << 64) | (self.ptr as usize as u128)
    }

    fn unpack(unit: u128) -> Self {
        Versioned {
            ptr: (unit as u64) as usize as *mut T,
            seq: (unit >> 64) as u64,
        }
    }
}

/// An atomically replaceable [`Versioned`] pointer, compared and swapped as one 128-bit unit.
pub(crate) struct VersionedSlot<T> {
    unit: AtomicWide,
    _marker: PhantomData<*mut T>,
}

// Safety: the slot only hands out copies of the raw pointer; whoever dereferences it is
// responsible for the pointee.
unsafe impl<T> Send for VersionedSlot<T> {}
unsafe impl<T> Sync for VersionedSlot<T> {}

// Macro to make new const only when not in loom.
macro_rules! new {
    ($($decl:tt)*) => {
        pub(crate) $($decl)*() -> Self {
            Self {
                unit: AtomicWide::new(0),
                _marker: PhantomData,
            }
        }
    };
}

impl<T> VersionedSlot<T> {
    #[cfg(not(loom))]
    new!(const fn new);
    #[cfg(loom)]
    new!(fn new);

    pub(crate) fn load(&self) -> Versioned<T> {
        Versioned::unpack(self.unit.load())
    }

    /// Replace `current` with `new` if, and only if, neither the pointer nor the sequence has
    /// changed since `current` was read. On failure the fresh view is returned.
    pub(crate) fn compare_exchange(
        &self,
        current: Versioned<T>,
        new: Versioned<T>,
    ) -> Result<(), Versioned<T>> {
        debug_assert_eq!(new.seq(), current.seq().wrapping_add(1));
        self.unit
            .compare_exchange(current.pack(), new.pack())
            .map(|_| ())
            .map_err(Versioned::unpack)
    }
}
