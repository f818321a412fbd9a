//! Context capture, install/restore, and the wrappers built on them.
//!
//! The flow is always the same: a [`ContextConfiguration`] captures a
//! [`Context`] at wrap time (on the submitting thread), and the wrapper
//! installs it around each invocation via the thread-local primitive in
//! [`current`], restoring the previous context on every exit path.

pub mod config;
pub mod current;
pub mod listener;
pub mod proxy;
pub mod task;
pub mod trigger;

#[cfg(test)]
pub(crate) mod probe;

pub use config::{Context, ContextConfiguration};
pub use current::{ContextGuard, current_context, set_context};
pub use listener::{ContextualTaskListener, TaskListener};
pub use proxy::ContextualProxy;
pub use task::{ContextualTask, TaskConfig, UNNAMED_TASK};
pub use trigger::{ContextualTrigger, LastExecution, Trigger};
