//! Thread-local install/restore primitive.
//!
//! Every wrapper in this crate brackets exactly one invocation between an
//! install of its captured context and a restore of whatever was active
//! before. Restoration is guaranteed by [`ContextGuard`]'s `Drop` impl, so it
//! happens on every exit path, including unwinding.
//!
//! The slot is thread-local: each worker thread owns an independent chain and
//! no locking is involved. Install/restore must stay on one thread, which
//! holds because task bodies and callbacks are synchronous and never cross an
//! `.await` while a guard is live.

use std::cell::RefCell;

use super::config::Context;

thread_local! {
    static CURRENT: RefCell<Option<Context>> = const { RefCell::new(None) };
}

/// Installs `context` as the current thread's active context and returns the
/// previously active one.
pub fn set_context(context: Option<Context>) -> Option<Context> {
    CURRENT.with(|slot| slot.replace(context))
}

/// The context currently installed on this thread, if any.
pub fn current_context() -> Option<Context> {
    CURRENT.with(|slot| slot.borrow().clone())
}

/// Scoped install of a context; restores the previous one on drop.
///
/// [`ContextGuard::install`] returns `None` when there is no context to
/// install, in which case no save/restore happens at all.
#[must_use = "dropping the guard immediately restores the previous context"]
pub struct ContextGuard {
    previous: Option<Context>,
}

impl ContextGuard {
    pub fn install(context: Option<&Context>) -> Option<Self> {
        let context = context?;
        let previous = set_context(Some(context.clone()));
        Some(Self { previous })
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        set_context(self.previous.take());
    }
}
