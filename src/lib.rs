//! Process-wide singletons with exactly-once construction and reverse-of-construction teardown.
//!
//! Every singleton lives in its own `static` [`Slot`]. The first access constructs the value
//! in place, under a guard private to that slot, and every later access is a single atomic
//! load. Singletons depend on each other simply by accessing one another from their
//! constructors; nothing is declared up front.
//!
//! When a singleton finishes construction, its slot pushes a [`TeardownRecord`] onto a
//! lock-free stack shared by the whole [`Registry`]. Because a singleton used by another
//! one's constructor always finishes first, popping that stack at shutdown destroys every
//! singleton before the singletons it depends on. The stack's top is a (pointer, sequence)
//! pair swapped with a single double-word compare-and-swap, so a record that is popped and
//! pushed again between a reader's load and its CAS is never mistaken for an unchanged top.
//! Targets without a native 16-byte CAS get a lock-based substitute instead; see
//! [`Registry::is_lock_free`].
//!
//! A constructor that, directly or through other singletons, asks for the singleton it is
//! constructing gets [`SingletonError::CircularDependency`] instead of a deadlock. Other
//! threads asking for the same singleton meanwhile simply wait for it.
//!
//! ```rust
//! use init_singleton::{instance, singleton, Lazy};
//!
//! struct Pool {
//!     size: usize,
//! }
//!
//! struct Cache {
//!     pool_size: usize,
//! }
//!
//! singleton!(Pool, Lazy, init = || Pool { size: 4 });
//! singleton!(Cache, Lazy, init = || Cache {
//!     pool_size: instance::<Pool>().size,
//! });
//!
//! assert_eq!(instance::<Cache>().pool_size, 4);
//! // At shutdown, Cache is destroyed before Pool.
//! unsafe { init_singleton::shutdown() };
//! ```
//!
//! Programs with singletons that must exist before any application logic runs declare them
//! [`Eager`] and construct them through [`Startup`], which also captures the process arguments
//! for [`AppArgs`].
//!
//! Construction, destruction and anomalies are logged through `tracing`. Building without the
//! default `diagnostics` feature compiles every log statement out.

#![deny(unsafe_op_in_unsafe_fn)]

// Log through `tracing` unless the `diagnostics` feature is off.
macro_rules! diag {
    ($level:ident!($($arg:tt)+)) => {
        #[cfg(feature = "diagnostics")]
        {
            ::tracing::$level!($($arg)+);
        }
    };
}

mod counter;
mod error;
mod event;
mod policy;
mod record;
mod registry;
mod stack;
mod sync;
mod versioned;

#[cfg(not(loom))]
mod process;
#[cfg(not(loom))]
mod singleton;
#[cfg(not(loom))]
mod slot;
#[cfg(not(loom))]
mod startup;

pub use error::{Anomaly, SingletonError};
pub use event::{RegistryEvent, TraceCallback};
pub use policy::{Eager, InitHelper, InitPolicy, Lazy};
pub use record::{Destructor, TeardownRecord};
pub use registry::Registry;

#[cfg(not(loom))]
pub use process::{AppArgs, AppEnv};
#[cfg(not(loom))]
pub use singleton::{instance, live_count, shutdown, try_instance, Singleton};
#[cfg(not(loom))]
pub use slot::Slot;
#[cfg(not(loom))]
pub use startup::{startup, Startup};
