use crate::{InitPolicy, Registry, SingletonError, Slot};

/// A type with exactly one process-wide instance.
///
/// Implement this with [`singleton!`](crate::singleton) rather than by hand; the macro
/// declares the `static` [`Slot`] that backs the type.
pub trait Singleton: Sized + Send + Sync + 'static {
    /// Whether [`Startup`](crate::Startup) may construct the instance ahead of time.
    type Policy: InitPolicy;

    /// The slot holding the instance.
    fn slot() -> &'static Slot<Self>;
}

/// The process-wide instance of `T`, constructed on first use.
///
/// After the first call returns, this is a single atomic load.
///
/// # Panics
///
/// If constructing `T` requires `T` itself (a circular dependency), or if `T` was already torn
/// down. See [`try_instance`].
#[inline]
#[track_caller]
pub fn instance<T: Singleton>() -> &'static T {
    T::slot().get()
}

/// The process-wide instance of `T`, or why it cannot be handed out.
///
/// A circular dependency is reported to the caller that closed the cycle; the slot stays
/// empty and the outer construction decides whether to continue without it.
#[inline]
pub fn try_instance<T: Singleton>() -> Result<&'static T, SingletonError> {
    T::slot().try_get()
}

/// Number of live singletons in the global registry.
pub fn live_count() -> isize {
    Registry::global().live()
}

/// Tear down the global registry, destroying its singletons newest first.
///
/// Call this as the last thing in `main`. Returns the number of singletons destroyed.
///
/// # Safety
///
/// No reference obtained from a singleton of the global registry may be used afterwards, on
/// any thread. See [`Registry::teardown`].
pub unsafe fn shutdown() -> usize {
    // Safety: forwarded from the caller.
    unsafe { Registry::global().teardown() }
}

/// Declares the `static` slot for a type and implements [`Singleton`] for it.
///
/// ```text
/// singleton!(Type);                                    // Eager, Type::default
/// singleton!(Type, Lazy);                              // Lazy, Type::default
/// singleton!(Type, Lazy, init = Type::new);            // custom constructor
/// singleton!(Type, Lazy, init = Type::new, helper = H);
/// singleton!(Type, Lazy, init = Type::new, registry = &REGISTRY);
/// singleton!(Type, Lazy, init = Type::new, helper = H, registry = &REGISTRY);
/// ```
///
/// The constructor is any `fn() -> Type`, including a non-capturing closure. Dependencies on
/// other singletons are expressed by simply accessing them from the constructor; they finish
/// construction first and are therefore torn down last.
///
/// # Examples
///
/// ```rust
/// use init_singleton::{instance, singleton, Lazy};
///
/// struct Config {
///     verbose: bool,
/// }
///
/// struct Service {
///     verbose: bool,
/// }
///
/// singleton!(Config, Lazy, init = || Config { verbose: true });
/// singleton!(Service, Lazy, init = || Service {
///     verbose: instance::<Config>().verbose,
/// });
///
/// assert!(instance::<Service>().verbose);
/// ```
#[macro_export]
macro_rules! singleton {
    (@impl $ty:ty, $policy:ty, $helper:ty, $slot:expr) => {
        impl $crate::Singleton for $ty {
            type Policy = $policy;

            fn slot() -> &'static $crate::Slot<Self> {
                static SLOT: $crate::Slot<$ty> =
                    $slot
                        .with_helper(<$helper as $crate::InitHelper>::prepare)
                        .with_policy::<$policy>();
                &SLOT
            }
        }
    };
    ($ty:ty, $policy:ty, init = $init:expr, helper = $helper:ty, registry = $registry:expr $(,)?) => {
        $crate::singleton!(@impl $ty, $policy, $helper,
            $crate::Slot::in_registry($registry, ::core::stringify!($ty), $init));
    };
    ($ty:ty, $policy:ty, init = $init:expr, registry = $registry:expr $(,)?) => {
        $crate::singleton!(@impl $ty, $policy, (),
            $crate::Slot::in_registry($registry, ::core::stringify!($ty), $init));
    };
    ($ty:ty, $policy:ty, init = $init:expr, helper = $helper:ty $(,)?) => {
        $crate::singleton!(@impl $ty, $policy, $helper,
            $crate::Slot::new(::core::stringify!($ty), $init));
    };
    ($ty:ty, $policy:ty, init = $init:expr $(,)?) => {
        $crate::singleton!(@impl $ty, $policy, (),
            $crate::Slot::new(::core::stringify!($ty), $init));
    };
    ($ty:ty, $policy:ty $(,)?) => {
        $crate::singleton!($ty, $policy, init = <$ty as ::core::default::Default>::default);
    };
    ($ty:ty $(,)?) => {
        $crate::singleton!($ty, $crate::Eager);
    };
}
