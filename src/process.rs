//! Read-only views of the process's invocation arguments and environment.
//!
//! Both are eager singletons: [`Startup`](crate::Startup) constructs them before any other
//! eager singleton, so every constructor can rely on them.

use crate::{singleton, Eager};
use std::sync::OnceLock;

static CAPTURED_ARGS: OnceLock<Vec<String>> = OnceLock::new();

/// Remember the arguments `AppArgs` will be built from. Only the first call has an effect.
pub(crate) fn capture_args(args: Vec<String>) -> bool {
    CAPTURED_ARGS.set(args).is_ok()
}

pub(crate) fn lossy_args() -> Vec<String> {
    std::env::args_os()
        .map(|a| a.to_string_lossy().into_owned())
        .collect()
}

/// The process's invocation arguments, program name first.
///
/// ```rust
/// use init_singleton::{instance, AppArgs};
///
/// let verbose = instance::<AppArgs>().iter().any(|(_, arg)| arg == "-v");
/// # let _ = verbose;
/// ```
#[derive(Debug)]
pub struct AppArgs {
    args: Vec<String>,
}

impl AppArgs {
    fn capture() -> Self {
        let args = match CAPTURED_ARGS.get() {
            Some(args) => args.clone(),
            None => lossy_args(),
        };
        diag!(debug!(count = args.len(), "process arguments"));
        AppArgs { args }
    }

    /// Calls `f` with the index and text of every argument.
    pub fn for_each(&self, mut f: impl FnMut(usize, &str)) {
        for (index, arg) in self.iter() {
            f(index, arg);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> + '_ {
        self.args.iter().map(String::as_str).enumerate()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

singleton!(AppArgs, Eager, init = AppArgs::capture);

/// The process environment as `NAME=value` entries, in the order the OS reports them.
///
/// The table is captured once, when the singleton is constructed; later changes to the
/// environment are not reflected.
#[derive(Debug)]
pub struct AppEnv {
    vars: Vec<String>,
}

impl AppEnv {
    fn capture() -> Self {
        let vars: Vec<String> = std::env::vars_os()
            .map(|(k, v)| format!("{}={}", k.to_string_lossy(), v.to_string_lossy()))
            .collect();
        diag!(debug!(count = vars.len(), "process environment"));
        AppEnv { vars }
    }

    /// Calls `f` with the index and `NAME=value` text of every entry.
    pub fn for_each(&self, mut f: impl FnMut(usize, &str)) {
        for (index, var) in self.iter() {
            f(index, var);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> + '_ {
        self.vars.iter().map(String::as_str).enumerate()
    }

    /// Value of the variable `name`, as captured.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.iter().find_map(|entry| {
            entry
                .strip_prefix(name)
                .and_then(|rest| rest.strip_prefix('='))
        })
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

singleton!(AppEnv, Eager, init = AppEnv::capture);
