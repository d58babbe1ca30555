use crate::Anomaly;

/// Events emitted by a [`Registry`](crate::Registry).
///
/// These events are passed to the tracing callback set via
/// [`Registry::set_trace_callback`](crate::Registry::set_trace_callback). They are delivered
/// after the slot's construction guard has been released, so a callback may itself access
/// singletons.
///
/// # Examples
///
/// ```rust
/// use init_singleton::RegistryEvent;
///
/// let event = RegistryEvent::Constructed { label: "Config", live: 1 };
/// assert_eq!(event.to_string(), "constructed { label: Config, live: 1 }");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// A singleton finished construction and was registered for teardown.
    Constructed {
        label: &'static str,
        /// Live count right after registration.
        live: isize,
    },

    /// A singleton was destroyed during teardown.
    Destroyed {
        label: &'static str,
        /// Live count right after the destruction.
        live: isize,
    },

    /// Something looked wrong, but the operation went ahead.
    Anomaly(Anomaly),

    /// Teardown began. Emitted once per registry.
    TeardownStarted,

    /// The last live singleton was destroyed. Emitted once per registry.
    TeardownFinished,
}

/// Type alias for the user-supplied tracing callback.
///
/// It must be thread-safe because singletons are constructed on whichever thread gets there
/// first.
pub type TraceCallback = dyn Fn(&RegistryEvent) + Send + Sync + 'static;

impl std::fmt::Display for RegistryEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryEvent::Constructed { label, live } => {
                write!(f, "constructed {{ label: {label}, live: {live} }}")
            }
            RegistryEvent::Destroyed { label, live } => {
                write!(f, "destroyed {{ label: {label}, live: {live} }}")
            }
            RegistryEvent::Anomaly(anomaly) => write!(f, "anomaly: {anomaly}"),
            RegistryEvent::TeardownStarted => write!(f, "teardown started"),
            RegistryEvent::TeardownFinished => write!(f, "teardown finished"),
        }
    }
}
