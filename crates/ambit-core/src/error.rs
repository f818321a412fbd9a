//! Failure taxonomy for managed tasks.
//!
//! Tasks report failures as `Arc`-shared error values so the same failure can
//! reach the submitter (through a [`TaskHandle`](crate::executor::TaskHandle))
//! and any registered listener without cloning the underlying error.

use std::sync::Arc;

use thiserror::Error;

/// A failure produced by a task body, shared between the result handle and
/// listener notifications.
pub type TaskFailure = Arc<dyn std::error::Error + Send + Sync>;

/// Result of one task invocation.
pub type TaskResult<T> = Result<T, TaskFailure>;

/// Convenience constructor for a [`TaskFailure`].
pub fn failure<E: std::error::Error + Send + Sync + 'static>(error: E) -> TaskFailure {
    Arc::new(error)
}

/// A recurring occurrence was skipped by its trigger. Not an error outcome;
/// never promoted to [`Aborted`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("execution skipped")]
pub struct Skipped;

/// The task was cancelled before its body ran. Never promoted to [`Aborted`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("task cancelled")]
pub struct Cancelled;

/// The task never produced a result (its executor dropped the result channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("task did not complete")]
pub struct Incomplete;

/// A submission was rejected because the executor is shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("executor is shut down")]
pub struct Rejected;

/// A generic task failure, promoted before `task_aborted` notification.
///
/// The original failure stays reachable through [`std::error::Error::source`].
#[derive(Debug, Clone)]
pub struct Aborted {
    cause: TaskFailure,
}

impl Aborted {
    pub fn new(cause: TaskFailure) -> Self {
        Self { cause }
    }

    pub fn cause(&self) -> &TaskFailure {
        &self.cause
    }
}

impl std::fmt::Display for Aborted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task aborted: {}", self.cause)
    }
}

impl std::error::Error for Aborted {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.cause as &(dyn std::error::Error + 'static))
    }
}

/// Abort promotion: skip and cancellation outcomes pass through unchanged,
/// anything else is wrapped in [`Aborted`] with the original as its cause.
pub fn promote(cause: &TaskFailure) -> TaskFailure {
    if cause.downcast_ref::<Skipped>().is_some() || cause.downcast_ref::<Cancelled>().is_some() {
        Arc::clone(cause)
    } else {
        Arc::new(Aborted::new(Arc::clone(cause)))
    }
}
