//! The underlying plain executor the contextual layer delegates to.

use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, watch};
use tracing::debug;

use crate::error::Rejected;

/// A plain task-submission primitive: jobs in, lifecycle control, nothing
/// else. The contextual layer wraps tasks before handing them here and adds
/// no lifecycle semantics of its own.
#[async_trait]
pub trait RawExecutor: Send + Sync {
    /// Runs `job` on some worker thread. Rejected after shutdown.
    fn spawn(&self, job: Box<dyn FnOnce() + Send>) -> Result<(), Rejected>;

    /// Stops accepting new jobs; already accepted jobs still run.
    fn shutdown(&self);

    /// Stops accepting new jobs and asks accepted-but-unstarted work to
    /// cancel itself (observable via [`RawExecutor::is_shutdown_now`]).
    fn shutdown_now(&self);

    fn is_shutdown(&self) -> bool;

    /// Hard-shutdown flag, polled by wrappers right before running a body.
    fn is_shutdown_now(&self) -> bool;

    /// Shut down with no job still in flight.
    fn is_terminated(&self) -> bool;

    /// Waits until the executor is terminated, up to `timeout`. Returns
    /// whether termination was reached.
    async fn await_termination(&self, timeout: Duration) -> bool;
}

/// Point-in-time counters of a [`BlockingPool`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolStatus {
    pub submitted: u64,
    pub completed: u64,
    pub in_flight: usize,
    pub shutdown: bool,
}

struct PoolInner {
    shutdown_tx: watch::Sender<bool>,
    hard_shutdown: AtomicBool,
    in_flight: AtomicUsize,
    submitted: AtomicU64,
    completed: AtomicU64,
    idle: Notify,
}

/// Decrements the in-flight count when the job finishes, panicking or not.
struct InFlightGuard {
    inner: Arc<PoolInner>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner.completed.fetch_add(1, Ordering::SeqCst);
        if self.inner.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

/// [`RawExecutor`] backed by tokio's blocking thread pool.
///
/// Jobs are synchronous closures, so each runs start to finish on one blocking
/// thread; that is what makes thread-local context install/restore sound.
/// Must be used from within a tokio runtime.
pub struct BlockingPool {
    inner: Arc<PoolInner>,
}

impl BlockingPool {
    pub fn new() -> Self {
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);
        Self {
            inner: Arc::new(PoolInner {
                shutdown_tx,
                hard_shutdown: AtomicBool::new(false),
                in_flight: AtomicUsize::new(0),
                submitted: AtomicU64::new(0),
                completed: AtomicU64::new(0),
                idle: Notify::new(),
            }),
        }
    }

    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            submitted: self.inner.submitted.load(Ordering::SeqCst),
            completed: self.inner.completed.load(Ordering::SeqCst),
            in_flight: self.inner.in_flight.load(Ordering::SeqCst),
            shutdown: self.is_shutdown(),
        }
    }
}

impl Default for BlockingPool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RawExecutor for BlockingPool {
    fn spawn(&self, job: Box<dyn FnOnce() + Send>) -> Result<(), Rejected> {
        if self.is_shutdown() {
            return Err(Rejected);
        }
        self.inner.submitted.fetch_add(1, Ordering::SeqCst);
        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlightGuard {
            inner: Arc::clone(&self.inner),
        };
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            job();
        });
        Ok(())
    }

    fn shutdown(&self) {
        debug!("blocking pool shutdown requested");
        // send_replace: the flag must latch even with no receiver alive
        self.inner.shutdown_tx.send_replace(true);
        self.inner.idle.notify_waiters();
    }

    fn shutdown_now(&self) {
        self.inner.hard_shutdown.store(true, Ordering::SeqCst);
        self.shutdown();
    }

    fn is_shutdown(&self) -> bool {
        *self.inner.shutdown_tx.borrow()
    }

    fn is_shutdown_now(&self) -> bool {
        self.inner.hard_shutdown.load(Ordering::SeqCst)
    }

    fn is_terminated(&self) -> bool {
        self.is_shutdown() && self.inner.in_flight.load(Ordering::SeqCst) == 0
    }

    async fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.is_terminated() {
                return true;
            }
            let mut idle = pin!(self.inner.idle.notified());
            idle.as_mut().enable();
            if self.is_terminated() {
                return true;
            }
            if tokio::time::timeout_at(deadline, idle).await.is_err() {
                return self.is_terminated();
            }
        }
    }
}
