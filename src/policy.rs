/// When a singleton gets constructed.
///
/// The policy never changes _how_ a singleton is constructed (both end up in the same slow
/// path of [`Slot`](crate::Slot)), only _when_ the first access happens. It is chosen per type
/// at compile time through [`Singleton::Policy`](crate::Singleton::Policy).
pub trait InitPolicy: 'static {
    /// Whether [`Startup`](crate::Startup) constructs singletons with this policy.
    const EAGER: bool;
    /// Name used in diagnostics.
    const NAME: &'static str;
}

/// Constructed during the startup phase, before application logic runs.
///
/// Use this for singletons that must exist before anything else happens, such as captured
/// process arguments or loggers. Eager singletons are listed with
/// [`Startup::eager`](crate::Startup::eager); the type system rejects listing a lazy one. An
/// eager singleton first constructed outside [`Startup::run`](crate::Startup::run) still works
/// but is reported as [`Anomaly::EagerOutsideStartup`](crate::Anomaly::EagerOutsideStartup).
#[derive(Debug)]
pub enum Eager {}

/// Constructed on first access.
///
/// Use this for singletons whose cost or side effects should be deferred, or that a given run
/// may not need at all.
#[derive(Debug)]
pub enum Lazy {}

impl InitPolicy for Eager {
    const EAGER: bool = true;
    const NAME: &'static str = "eager";
}

impl InitPolicy for Lazy {
    const EAGER: bool = false;
    const NAME: &'static str = "lazy";
}

/// Process-wide machinery that must be ready while a singleton is being constructed.
///
/// [`prepare`](InitHelper::prepare) runs on the constructing thread right before every
/// construction attempt of a slot declared with this helper. It must be cheap to call more than
/// once and must not access the singleton being constructed.
///
/// ```rust
/// use init_singleton::{instance, singleton, InitHelper, Lazy};
/// use std::sync::Once;
///
/// struct LogReady;
/// impl InitHelper for LogReady {
///     fn prepare() {
///         static INSTALL: Once = Once::new();
///         INSTALL.call_once(|| { /* install a logger here */ });
///     }
/// }
///
/// #[derive(Default)]
/// struct Service;
/// singleton!(Service, Lazy, init = Service::default, helper = LogReady);
///
/// let _ = instance::<Service>();
/// ```
pub trait InitHelper {
    fn prepare();
}

/// No auxiliary machinery.
impl InitHelper for () {
    fn prepare() {}
}
