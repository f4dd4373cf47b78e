//! Unsubscribe capabilities returned by `ErrorEmitter::subscribe`

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Weak;

use super::Registry;

/// Capability to remove one emitter listener.
///
/// Calling [`unsubscribe`](Self::unsubscribe) more than once is a no-op.
/// Dropping the handle does not unsubscribe.
pub struct Unsubscribe {
    registry: Weak<Registry>,
    event_type: String,
    id: u64,
    done: AtomicBool,
}

impl Unsubscribe {
    pub(super) fn new(registry: Weak<Registry>, event_type: &str, id: u64) -> Self {
        Self {
            registry,
            event_type: event_type.to_string(),
            id,
            done: AtomicBool::new(false),
        }
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Remove the listener. Other listeners are unaffected.
    pub fn unsubscribe(&self) {
        if self.done.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.event_type, self.id);
        }
    }

    pub fn is_subscribed(&self) -> bool {
        !self.done.load(Ordering::SeqCst) && self.registry.strong_count() > 0
    }

    /// Scope the subscription to the returned guard
    pub fn guard(self) -> UnsubscribeGuard {
        UnsubscribeGuard(self)
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("event_type", &self.event_type)
            .field("subscribed", &self.is_subscribed())
            .finish()
    }
}

/// Unsubscribes when dropped
#[derive(Debug)]
pub struct UnsubscribeGuard(Unsubscribe);

impl UnsubscribeGuard {
    pub fn unsubscribe(&self) {
        self.0.unsubscribe();
    }
}

impl Drop for UnsubscribeGuard {
    fn drop(&mut self) {
        self.0.unsubscribe();
    }
}
