//! Managed threads with a base context installed for their whole lifetime.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use crate::context::current::ContextGuard;
use crate::context::ContextConfiguration;

/// Spawns named threads whose base context comes from
/// [`ContextConfiguration::new_thread_context`], captured on the spawning
/// thread and installed before the entry closure runs.
pub struct ManagedThreadFactory {
    name_prefix: String,
    counter: AtomicUsize,
    config: Option<Arc<dyn ContextConfiguration>>,
}

impl ManagedThreadFactory {
    pub fn new(
        name_prefix: impl Into<String>,
        config: Option<Arc<dyn ContextConfiguration>>,
    ) -> Self {
        Self {
            name_prefix: name_prefix.into(),
            counter: AtomicUsize::new(0),
            config,
        }
    }

    pub fn spawn<F>(&self, entry: F) -> std::io::Result<thread::JoinHandle<()>>
    where
        F: FnOnce() + Send + 'static,
    {
        let context = self.config.as_deref().map(|c| c.new_thread_context());
        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        thread::Builder::new()
            .name(format!("{}-{id}", self.name_prefix))
            .spawn(move || {
                let _guard = ContextGuard::install(context.as_ref());
                entry();
            })
    }
}
