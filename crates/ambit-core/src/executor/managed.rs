//! The contextual managed executor: a thin delegating layer that wraps every
//! submitted task before handing it to the underlying [`RawExecutor`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Notify, mpsc, oneshot};
use tracing::trace;

use crate::context::task::{ContextualTask, TaskConfig, notify_abandoned};
use crate::context::ContextConfiguration;
use crate::error::{Cancelled, Incomplete, Rejected, TaskResult, failure};

use super::raw::RawExecutor;

/// Handle to one submitted task.
///
/// Dropping the handle does not cancel the task. [`TaskHandle::cancel`]
/// prevents a run that has not started yet; a body that is already running is
/// never interrupted.
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<TaskResult<T>>,
    cancelled: Arc<AtomicBool>,
    cancel_notify: Arc<Notify>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(
        rx: oneshot::Receiver<TaskResult<T>>,
        cancelled: Arc<AtomicBool>,
        cancel_notify: Arc<Notify>,
    ) -> Self {
        Self {
            rx,
            cancelled,
            cancel_notify,
        }
    }

    /// Requests cancellation. Effective only before the body starts.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        // notify_one stores a permit, so a timer that registers later still
        // observes the cancellation.
        self.cancel_notify.notify_one();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Waits for the task's outcome. The failure is exactly what the task
    /// body produced; the context machinery adds nothing on this path.
    pub async fn result(self) -> TaskResult<T> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(failure(Incomplete)),
        }
    }
}

/// Managed executor wrapping every submission with context capture and
/// listener notifications, then delegating to a plain executor.
///
/// Lifecycle operations pass through to the delegate unchanged.
pub struct ContextualExecutor {
    delegate: Arc<dyn RawExecutor>,
    config: Option<Arc<dyn ContextConfiguration>>,
}

impl ContextualExecutor {
    pub fn new(
        delegate: Arc<dyn RawExecutor>,
        config: Option<Arc<dyn ContextConfiguration>>,
    ) -> Self {
        Self { delegate, config }
    }

    /// The context policy this executor wraps with, if any.
    pub fn context_configuration(&self) -> Option<&Arc<dyn ContextConfiguration>> {
        self.config.as_ref()
    }

    /// The underlying plain executor.
    pub fn delegate(&self) -> &Arc<dyn RawExecutor> {
        &self.delegate
    }

    pub(crate) fn config_ref(&self) -> Option<&dyn ContextConfiguration> {
        self.config.as_deref()
    }

    /// Runnable entry point: fire and forget.
    pub fn execute(&self, task: impl FnOnce() + Send + 'static) -> Result<(), Rejected> {
        let handle = self.submit(move || {
            task();
            Ok(())
        })?;
        drop(handle);
        Ok(())
    }

    /// Callable entry point.
    pub fn submit<T, F>(&self, task: F) -> Result<TaskHandle<T>, Rejected>
    where
        T: Send + 'static,
        F: FnOnce() -> TaskResult<T> + Send + 'static,
    {
        self.submit_with(TaskConfig::new(), task)
    }

    pub fn submit_with<T, F>(&self, task_config: TaskConfig, task: F) -> Result<TaskHandle<T>, Rejected>
    where
        T: Send + 'static,
        F: FnOnce() -> TaskResult<T> + Send + 'static,
    {
        let wrapped = ContextualTask::wrap(task, self.config_ref(), &task_config);
        self.submit_contextual(wrapped)
    }

    /// Submits an already wrapped task. Wrapping is idempotent: a task that
    /// has captured its context keeps it, so nested submission never
    /// double-brackets.
    pub fn submit_contextual<T: Send + 'static>(
        &self,
        task: ContextualTask<T>,
    ) -> Result<TaskHandle<T>, Rejected> {
        let task = task.rewrap(self.config_ref());
        let (tx, rx) = oneshot::channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        let cancel_notify = Arc::new(Notify::new());

        task.notify_submitted();
        let listener = task.listener().cloned();
        let name = task.name().to_owned();

        let flag = Arc::clone(&cancelled);
        let delegate = Arc::clone(&self.delegate);
        let spawned = self.delegate.spawn(Box::new(move || {
            let result = if flag.load(Ordering::SeqCst) || delegate.is_shutdown_now() {
                task.notify_cancelled();
                Err(failure(Cancelled))
            } else {
                task.run()
            };
            let _ = tx.send(result);
        }));
        if let Err(rejected) = spawned {
            // The listener already saw task_submitted; close the lifecycle.
            notify_abandoned(listener.as_ref(), &name, failure(Rejected));
            return Err(rejected);
        }

        Ok(TaskHandle::new(rx, cancelled, cancel_notify))
    }

    /// Submits every task and waits for all of them, preserving order.
    pub async fn invoke_all<T: Send + 'static>(
        &self,
        tasks: Vec<Box<dyn FnOnce() -> TaskResult<T> + Send>>,
    ) -> Result<Vec<TaskResult<T>>, Rejected> {
        let mut handles = Vec::with_capacity(tasks.len());
        for task in tasks {
            handles.push(self.submit(task)?);
        }
        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(handle.result().await);
        }
        Ok(results)
    }

    /// Returns the first successful result, cancelling the remaining tasks.
    /// If every task fails, the last failure observed is returned.
    pub async fn invoke_any<T: Send + 'static>(
        &self,
        tasks: Vec<Box<dyn FnOnce() -> TaskResult<T> + Send>>,
    ) -> TaskResult<T> {
        if tasks.is_empty() {
            return Err(failure(Incomplete));
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<TaskResult<T>>();
        let mut cancel_flags = Vec::with_capacity(tasks.len());

        for task in tasks {
            let wrapped = ContextualTask::wrap(task, self.config_ref(), &TaskConfig::new());
            wrapped.notify_submitted();

            let flag = Arc::new(AtomicBool::new(false));
            cancel_flags.push(Arc::clone(&flag));
            let tx = tx.clone();
            let delegate = Arc::clone(&self.delegate);
            self.delegate
                .spawn(Box::new(move || {
                    let result = if flag.load(Ordering::SeqCst) || delegate.is_shutdown_now() {
                        wrapped.notify_cancelled();
                        Err(failure(Cancelled))
                    } else {
                        wrapped.run()
                    };
                    let _ = tx.send(result);
                }))
                .map_err(failure)?;
        }
        drop(tx);

        let mut last_failure = failure(Incomplete);
        while let Some(result) = rx.recv().await {
            match result {
                Ok(value) => {
                    for flag in &cancel_flags {
                        flag.store(true, Ordering::SeqCst);
                    }
                    return Ok(value);
                }
                Err(cause) => last_failure = cause,
            }
        }
        trace!("invoke_any: all tasks failed");
        Err(last_failure)
    }

    // Lifecycle pass-through.

    pub fn shutdown(&self) {
        self.delegate.shutdown();
    }

    pub fn shutdown_now(&self) {
        self.delegate.shutdown_now();
    }

    pub fn is_shutdown(&self) -> bool {
        self.delegate.is_shutdown()
    }

    pub fn is_terminated(&self) -> bool {
        self.delegate.is_terminated()
    }

    pub async fn await_termination(&self, timeout: Duration) -> bool {
        self.delegate.await_termination(timeout).await
    }
}
