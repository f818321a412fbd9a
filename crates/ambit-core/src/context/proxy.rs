//! Contextual decorator for arbitrary shared objects.
//!
//! The original pattern intercepts every method of a reflective proxy. Rust
//! has no runtime proxies, so interception is expressed as a higher-order
//! wrapper: callers go through [`ContextualProxy::invoke`], which brackets a
//! closure over the target with context install/restore. Identity surfaces
//! (`Debug`, `PartialEq`, [`ContextualProxy::target`]) bypass the context and
//! behave exactly like direct access to the un-wrapped instance.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::config::{Context, ContextConfiguration};
use super::current::ContextGuard;

pub struct ContextualProxy<T: ?Sized> {
    target: Arc<T>,
    context: Option<Context>,
    properties: HashMap<String, String>,
}

impl<T: ?Sized> ContextualProxy<T> {
    /// Wraps `target`, capturing a proxy context on the calling thread.
    ///
    /// `properties` is arbitrary metadata about how the proxy was configured,
    /// exposed read-only through [`ContextualProxy::properties`].
    pub fn new(
        target: Arc<T>,
        config: Option<&dyn ContextConfiguration>,
        properties: HashMap<String, String>,
    ) -> Self {
        Self {
            target,
            context: config.map(|c| c.new_proxy_context()),
            properties,
        }
    }

    /// Invokes `op` on the target under the captured context.
    ///
    /// The context is restored on every exit path, including unwinding out of
    /// `op`.
    pub fn invoke<R>(&self, op: impl FnOnce(&T) -> R) -> R {
        let _guard = ContextGuard::install(self.context.as_ref());
        op(&self.target)
    }

    /// Direct access to the wrapped instance; no context is installed.
    pub fn target(&self) -> &Arc<T> {
        &self.target
    }

    pub fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }
}

impl<T: ?Sized> Clone for ContextualProxy<T> {
    fn clone(&self) -> Self {
        Self {
            target: Arc::clone(&self.target),
            context: self.context.clone(),
            properties: self.properties.clone(),
        }
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for ContextualProxy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Identity surface: formats the target as if accessed directly.
        self.target.fmt(f)
    }
}

impl<T: ?Sized> PartialEq for ContextualProxy<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.target, &other.target)
    }
}

impl<T: ?Sized> Eq for ContextualProxy<T> {}
