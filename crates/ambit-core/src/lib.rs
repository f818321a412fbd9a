//! ambit-core
//!
//! Context-propagating managed executors: run arbitrary tasks on a plain
//! executor while transparently capturing, installing, and restoring ambient
//! execution context around each task invocation, listener callback, and
//! trigger evaluation.
//!
//! # Module layout
//! - **context**: the capture/install/restore core. [`Context`],
//!   [`ContextConfiguration`], the thread-local primitive, and the task,
//!   listener, proxy, and trigger wrappers built on it.
//! - **executor**: the delegating entry points. [`ContextualExecutor`],
//!   [`ContextualScheduledExecutor`], the [`RawExecutor`] delegate seam with
//!   its [`BlockingPool`] implementation, and [`ManagedThreadFactory`].
//! - **error**: the failure taxonomy (skip, cancel, abort promotion).

pub mod context;
pub mod error;
pub mod executor;

pub use context::{
    Context, ContextConfiguration, ContextGuard, ContextualProxy, ContextualTask,
    ContextualTaskListener, ContextualTrigger, LastExecution, TaskConfig, TaskListener, Trigger,
    current_context, set_context,
};
pub use error::{
    Aborted, Cancelled, Incomplete, Rejected, Skipped, TaskFailure, TaskResult, failure, promote,
};
pub use executor::{
    BlockingPool, ContextualExecutor, ContextualScheduledExecutor, ManagedThreadFactory,
    PoolStatus, RawExecutor, ScheduledHandle, TaskHandle, TriggerHandle, TriggerStatus,
};
