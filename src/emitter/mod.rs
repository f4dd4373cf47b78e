//! # Error Emitter
//!
//! Publish/subscribe channel for subscription failures, keyed by event
//! type. Bindings publish here in addition to recording the failure in
//! their own state, so an out-of-band listener (a developer overlay, a
//! log shipper) sees every denial without being wired to each binding.
//!
//! - `publish` is synchronous: every listener registered when the call
//!   starts runs before it returns.
//! - Listeners run on a copy of the registry, so they may subscribe or
//!   unsubscribe from inside a callback.
//! - A panicking listener is isolated; the rest still run.
//!
//! The emitter is an ordinary value shared through
//! [`ServiceContext`](crate::context::ServiceContext). There is no
//! global instance.

mod handle;

pub use handle::{Unsubscribe, UnsubscribeGuard};

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::errors::SubscriptionError;
use crate::observability::{Event, MetricsRegistry};

/// Event type for denied or failed backend requests
pub const PERMISSION_ERROR: &str = "permission-error";

/// Event type for documents that did not decode
pub const DECODE_ERROR: &str = "decode-error";

/// Callback registered with [`ErrorEmitter::subscribe`]
pub type Listener = Arc<dyn Fn(&SubscriptionError) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Registry {
    listeners: RwLock<HashMap<String, Vec<(u64, Listener)>>>,
    next_id: AtomicU64,
}

impl Registry {
    pub(crate) fn remove(&self, event_type: &str, id: u64) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(entries) = listeners.get_mut(event_type) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            listeners.remove(event_type);
        }
        removed
    }
}

/// Injectable error channel
pub struct ErrorEmitter {
    registry: Arc<Registry>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl ErrorEmitter {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry::default()),
            metrics: None,
        }
    }

    /// Emitter that counts publishes and listener panics
    pub fn with_metrics(metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            registry: Arc::new(Registry::default()),
            metrics: Some(metrics),
        }
    }

    /// Register `listener` for `event_type`.
    ///
    /// The returned handle must be used to unsubscribe; dropping it leaves
    /// the listener registered. Use [`Unsubscribe::guard`] for scoped
    /// registration.
    pub fn subscribe<F>(&self, event_type: &str, listener: F) -> Unsubscribe
    where
        F: Fn(&SubscriptionError) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event_type.to_string())
            .or_default()
            .push((id, Arc::new(listener)));

        Unsubscribe::new(Arc::downgrade(&self.registry), event_type, id)
    }

    /// Deliver `error` to every listener of `event_type`.
    ///
    /// Returns the number of listeners invoked, panicking ones included.
    pub fn publish(&self, event_type: &str, error: &SubscriptionError) -> usize {
        let listeners: Vec<Listener> = {
            let registry = self
                .registry
                .listeners
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            registry
                .get(event_type)
                .map(|entries| entries.iter().map(|(_, l)| Arc::clone(l)).collect())
                .unwrap_or_default()
        };

        if let Some(metrics) = &self.metrics {
            metrics.increment_errors_published();
        }

        for listener in &listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(error))).is_err() {
                if let Some(metrics) = &self.metrics {
                    metrics.increment_listener_panics();
                }
                Event::ListenerPanicked.emit(&[
                    ("event_type", event_type),
                    ("path", error.resource_path()),
                ]);
            }
        }

        listeners.len()
    }

    /// Publish on the channel matching the error's kind
    pub fn publish_error(&self, error: &SubscriptionError) -> usize {
        self.publish(error.event_type(), error)
    }

    pub fn listener_count(&self, event_type: &str) -> usize {
        self.registry
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event_type)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl Default for ErrorEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ErrorEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self
            .registry
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let counts: HashMap<&str, usize> = listeners
            .iter()
            .map(|(k, v)| (k.as_str(), v.len()))
            .collect();
        f.debug_struct("ErrorEmitter")
            .field("listeners", &counts)
            .finish()
    }
}
