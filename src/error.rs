use thiserror::Error;

/// Failure to obtain a singleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SingletonError {
    /// The singleton's construction, directly or through other singletons, asked for the
    /// singleton itself on the same thread.
    #[error("circular dependency while constructing {label}")]
    CircularDependency {
        /// Label of the slot that was re-entered.
        label: &'static str,
    },

    /// The singleton was already destroyed by teardown. Slots are never constructed twice.
    #[error("{label} was accessed after it was destroyed")]
    Destroyed {
        /// Label of the destroyed slot.
        label: &'static str,
    },
}

impl SingletonError {
    /// Label of the slot the error refers to.
    pub fn label(&self) -> &'static str {
        match self {
            SingletonError::CircularDependency { label } | SingletonError::Destroyed { label } => {
                label
            }
        }
    }
}

/// Bookkeeping irregularities. They are reported, never returned to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Anomaly {
    /// A slot started constructing after teardown of its registry began.
    #[error("{label} is being constructed during teardown")]
    LateConstruction { label: &'static str },

    /// A slot started more than one construction in this process.
    #[error("{label} started construction {count} times")]
    RepeatedInitialization { label: &'static str, count: usize },

    /// The live counter dropped below zero.
    #[error("live singleton counter is negative ({value})")]
    NegativeCounter { value: isize },

    /// An eager slot was first constructed outside the startup phase.
    #[error("{label} is eager but was first constructed outside startup")]
    EagerOutsideStartup { label: &'static str },

    /// A destructor panicked during teardown; teardown went on with the next record.
    #[error("destructor of {label} panicked during teardown")]
    DestructorPanicked { label: &'static str },
}
