//! Context snapshots and the policy object that produces them.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// An opaque snapshot of ambient execution state, installable on a thread for
/// the duration of one invocation.
///
/// A `Context` is immutable once created and cheap to clone. It carries no
/// behavior of its own; whatever the owning [`ContextConfiguration`] captured
/// is reachable through [`Context::payload`]. Equality is snapshot identity:
/// clones of one capture compare equal, separate captures never do.
#[derive(Clone)]
pub struct Context {
    label: Arc<str>,
    payload: Arc<dyn Any + Send + Sync>,
}

impl Context {
    pub fn new(label: impl Into<Arc<str>>, payload: impl Any + Send + Sync) -> Self {
        Self {
            label: label.into(),
            payload: Arc::new(payload),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Typed read access to the captured snapshot.
    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref()
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.payload, &other.payload)
    }
}

impl Eq for Context {}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Policy object that captures ambient state for the things it will later be
/// installed around: task bodies, listener callbacks, proxy invocations, and
/// managed threads.
///
/// Factories must be side-effect-free beyond producing a new context. An
/// absent configuration (`None` at a wrapping site) disables capture entirely:
/// the wrapper holds no context and performs zero install/restore calls.
pub trait ContextConfiguration: Send + Sync {
    /// Context for a task body. `task_name` is the submitted task's identity
    /// name, when one was configured.
    fn new_task_context(&self, task_name: Option<&str>) -> Context;

    /// Context for listener callback invocations. Listeners may need different
    /// ambient state than the task body they observe.
    fn new_listener_context(&self) -> Context;

    /// Context for invocations through a [`ContextualProxy`](crate::context::ContextualProxy).
    fn new_proxy_context(&self) -> Context;

    /// Base context for a thread produced by a
    /// [`ManagedThreadFactory`](crate::executor::ManagedThreadFactory).
    fn new_thread_context(&self) -> Context;
}
