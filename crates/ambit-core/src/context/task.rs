//! Contextual task wrapping.
//!
//! A [`ContextualTask`] binds one task closure to the context captured on the
//! submitting thread and to an optional (possibly contextually wrapped)
//! listener. The same wrapper serves one-shot submissions, recurring
//! schedules, and trigger-driven occurrences.

use std::fmt;
use std::sync::Arc;

use super::config::ContextConfiguration;
use super::current::ContextGuard;
use super::listener::{TaskListener, wrap_listener};
use super::Context;
use crate::error::{Cancelled, TaskFailure, TaskResult, failure, promote};

/// Fallback identity when a task was submitted without a name.
pub const UNNAMED_TASK: &str = "unnamed-task";

/// Per-submission task settings: identity name, completion listener, and
/// whether listener callbacks themselves need contextual wrapping.
///
/// Read-only once handed to an executor.
#[derive(Default, Clone)]
pub struct TaskConfig {
    name: Option<String>,
    listener: Option<Arc<dyn TaskListener>>,
    contextual_callbacks: bool,
}

impl TaskConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn TaskListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn contextual_callbacks(mut self, enabled: bool) -> Self {
        self.contextual_callbacks = enabled;
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn listener(&self) -> Option<&Arc<dyn TaskListener>> {
        self.listener.as_ref()
    }

    pub fn wants_contextual_callbacks(&self) -> bool {
        self.contextual_callbacks
    }
}

impl fmt::Debug for TaskConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskConfig")
            .field("name", &self.name)
            .field("listener", &self.listener.is_some())
            .field("contextual_callbacks", &self.contextual_callbacks)
            .finish()
    }
}

/// A task closure bound to its captured context and listener.
pub struct ContextualTask<T> {
    task: Box<dyn FnOnce() -> TaskResult<T> + Send>,
    context: Option<Context>,
    name: Option<String>,
    listener: Option<Arc<dyn TaskListener>>,
}

impl<T> ContextualTask<T> {
    /// Wraps `task`, capturing a context on the calling (submitting) thread.
    pub fn wrap(
        task: impl FnOnce() -> TaskResult<T> + Send + 'static,
        config: Option<&dyn ContextConfiguration>,
        task_config: &TaskConfig,
    ) -> Self {
        Self::from_parts(
            Box::new(task),
            config.map(|c| c.new_task_context(task_config.name())),
            task_config.name().map(str::to_owned),
            wrap_listener(config, task_config),
        )
    }

    pub(crate) fn from_parts(
        task: Box<dyn FnOnce() -> TaskResult<T> + Send>,
        context: Option<Context>,
        name: Option<String>,
        listener: Option<Arc<dyn TaskListener>>,
    ) -> Self {
        Self {
            task,
            context,
            name,
            listener,
        }
    }

    /// Re-wrapping an already wrapped task is a no-op: once a context has been
    /// captured it is kept, so resubmission through a nested contextual
    /// executor never double-brackets the body.
    pub fn rewrap(self, config: Option<&dyn ContextConfiguration>) -> Self {
        if self.context.is_some() {
            return self;
        }
        let context = config.map(|c| c.new_task_context(self.name.as_deref()));
        Self { context, ..self }
    }

    /// The identity name of the original task; survives wrapping.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNNAMED_TASK)
    }

    /// Whether a context was captured for this task.
    pub fn has_context(&self) -> bool {
        self.context.is_some()
    }

    pub fn context(&self) -> Option<&Context> {
        self.context.as_ref()
    }

    pub(crate) fn listener(&self) -> Option<&Arc<dyn TaskListener>> {
        self.listener.as_ref()
    }

    /// Fired by the executor once a result handle exists.
    pub(crate) fn notify_submitted(&self) {
        if let Some(listener) = &self.listener {
            listener.task_submitted(self.name());
        }
    }

    /// Reports the cancellation of a run that never started.
    pub(crate) fn notify_cancelled(&self) {
        notify_abandoned(self.listener.as_ref(), self.name(), failure(Cancelled));
    }

    /// Runs the task body under the captured context.
    ///
    /// Fires `task_starting`, installs the context for exactly the duration of
    /// the body, then reports the outcome: `task_done(None)` on success, or
    /// `task_aborted` with the promoted failure followed by `task_done` with
    /// the raw one. The caller always receives the raw result.
    pub fn run(self) -> TaskResult<T> {
        let Self {
            task,
            context,
            name,
            listener,
        } = self;
        let name = name.as_deref().unwrap_or(UNNAMED_TASK);

        if let Some(listener) = &listener {
            listener.task_starting(name);
        }

        let result = {
            let _guard = ContextGuard::install(context.as_ref());
            task()
        };

        if let Some(listener) = &listener {
            match &result {
                Ok(_) => listener.task_done(name, None),
                Err(cause) => {
                    let promoted = promote(cause);
                    listener.task_aborted(name, &promoted);
                    listener.task_done(name, Some(cause));
                }
            }
        }
        result
    }
}

/// Fires the terminal listener pair for a run that will never start:
/// `task_aborted` with the promoted cause, then `task_done` with the raw one.
pub(crate) fn notify_abandoned(
    listener: Option<&Arc<dyn TaskListener>>,
    name: &str,
    cause: TaskFailure,
) {
    if let Some(listener) = listener {
        listener.task_aborted(name, &promote(&cause));
        listener.task_done(name, Some(&cause));
    }
}

impl<T> fmt::Display for ContextualTask<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
