use crate::process::{self, AppArgs, AppEnv};
use crate::sync::atomic::{AtomicBool, Ordering};
use crate::{try_instance, Eager, Singleton, SingletonError};

static RUNNING: AtomicBool = AtomicBool::new(false);

/// Whether a [`Startup::run`] is in progress.
pub(crate) fn is_running() -> bool {
    RUNNING.load(Ordering::Acquire)
}

/// Clears [`RUNNING`] when `run` returns or unwinds.
struct Running;

impl Running {
    fn enter() -> Self {
        RUNNING.store(true, Ordering::Release);
        Running
    }
}

impl Drop for Running {
    fn drop(&mut self) {
        RUNNING.store(false, Ordering::Release);
    }
}

/// The explicit startup phase that constructs eager singletons.
///
/// `main` runs this before any application logic. It records the process arguments, then
/// constructs [`AppArgs`], [`AppEnv`] and every listed eager singleton, in that order. Listing
/// a singleton is only a guarantee that it exists once `run` returns; its dependencies are
/// still discovered by its constructor.
///
/// ```rust
/// use init_singleton::{instance, singleton, AppArgs, Eager, Startup};
///
/// struct Settings {
///     verbose: bool,
/// }
///
/// singleton!(Settings, Eager, init = || Settings {
///     verbose: instance::<AppArgs>().iter().any(|(_, a)| a == "-v"),
/// });
///
/// Startup::new()
///     .args(["prog", "-v"])
///     .eager::<Settings>()
///     .run()
///     .expect("no circular dependencies");
/// assert!(instance::<Settings>().verbose);
/// ```
#[derive(Debug, Default)]
pub struct Startup {
    args: Option<Vec<String>>,
    eager: Vec<EagerEntry>,
}

#[derive(Debug)]
struct EagerEntry {
    label: &'static str,
    construct: fn() -> Result<(), SingletonError>,
}

fn construct<T: Singleton>() -> Result<(), SingletonError> {
    try_instance::<T>().map(|_| ())
}

impl Startup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `args` as the process arguments instead of [`std::env::args_os`].
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    /// Construct `T` during [`run`](Self::run), after the ones listed before it.
    pub fn eager<T: Singleton<Policy = Eager>>(mut self) -> Self {
        self.eager.push(EagerEntry {
            label: T::slot().label(),
            construct: construct::<T>,
        });
        self
    }

    /// Labels of the listed eager singletons, in construction order. [`AppArgs`] and
    /// [`AppEnv`] are always constructed before them and are not listed.
    pub fn eager_labels(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.eager.iter().map(|entry| entry.label)
    }

    /// Capture the arguments and construct every eager singleton.
    ///
    /// Stops at the first singleton that cannot be constructed.
    pub fn run(self) -> Result<(), SingletonError> {
        let _running = Running::enter();
        let args = self.args.unwrap_or_else(process::lossy_args);
        if !process::capture_args(args) || AppArgs::slot().is_ready() {
            diag!(warn!("process arguments were captured before startup; keeping the earlier ones"));
        }

        construct::<AppArgs>()?;
        construct::<AppEnv>()?;
        for entry in &self.eager {
            diag!(debug!(singleton = entry.label, "eager construction"));
            (entry.construct)()?;
        }

        diag!(info!(
            eager = self.eager.len() + 2,
            live = crate::live_count(),
            "startup complete"
        ));
        Ok(())
    }
}

/// Run the startup phase with the real process arguments and no extra eager singletons.
pub fn startup() -> Result<(), SingletonError> {
    Startup::new().run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::singleton;

    #[derive(Default)]
    struct First;
    singleton!(First);

    #[derive(Default)]
    struct Second;
    singleton!(Second);

    #[test]
    fn eager_list_keeps_declaration_order() {
        let startup = Startup::new().eager::<Second>().eager::<First>();
        assert_eq!(startup.eager_labels().collect::<Vec<_>>(), ["Second", "First"]);
        assert!(!is_running());
    }
}
