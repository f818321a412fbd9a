//! Task lifecycle listeners and their contextual wrapper.

use std::sync::Arc;

use super::config::{Context, ContextConfiguration};
use super::current::ContextGuard;
use super::task::TaskConfig;
use crate::error::TaskFailure;

/// Observer for the lifecycle of a managed task.
///
/// Per task the order is: `task_submitted`, `task_starting`, then either
/// `task_done(None)` on success or `task_aborted` followed by
/// `task_done(Some(_))` on failure, skip, or cancellation. The failure passed
/// to `task_aborted` is abort-promoted; the one passed to `task_done` is the
/// raw failure the task produced.
pub trait TaskListener: Send + Sync {
    fn task_submitted(&self, _task: &str) {}
    fn task_starting(&self, _task: &str) {}
    fn task_aborted(&self, _task: &str, _cause: &TaskFailure) {}
    fn task_done(&self, _task: &str, _failure: Option<&TaskFailure>) {}
}

/// Wraps a listener so each callback runs under a context captured via
/// [`ContextConfiguration::new_listener_context`].
pub struct ContextualTaskListener {
    inner: Arc<dyn TaskListener>,
    context: Context,
}

impl ContextualTaskListener {
    pub fn new(inner: Arc<dyn TaskListener>, context: Context) -> Self {
        Self { inner, context }
    }
}

impl TaskListener for ContextualTaskListener {
    fn task_submitted(&self, task: &str) {
        let _guard = ContextGuard::install(Some(&self.context));
        self.inner.task_submitted(task);
    }

    fn task_starting(&self, task: &str) {
        let _guard = ContextGuard::install(Some(&self.context));
        self.inner.task_starting(task);
    }

    fn task_aborted(&self, task: &str, cause: &TaskFailure) {
        let _guard = ContextGuard::install(Some(&self.context));
        self.inner.task_aborted(task, cause);
    }

    fn task_done(&self, task: &str, failure: Option<&TaskFailure>) {
        let _guard = ContextGuard::install(Some(&self.context));
        self.inner.task_done(task, failure);
    }
}

/// Resolves the listener a wrapped task should notify.
///
/// The raw listener is used unless a configuration is present and the task
/// opted into contextual callbacks; only then is it wrapped.
pub(crate) fn wrap_listener(
    config: Option<&dyn ContextConfiguration>,
    task_config: &TaskConfig,
) -> Option<Arc<dyn TaskListener>> {
    let listener = task_config.listener()?;
    match config {
        Some(config) if task_config.wants_contextual_callbacks() => Some(Arc::new(
            ContextualTaskListener::new(Arc::clone(listener), config.new_listener_context()),
        )),
        _ => Some(Arc::clone(listener)),
    }
}
