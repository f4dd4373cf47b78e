//! Subscription counters
//!
//! - Counters only, monotonic
//! - Relaxed atomics; exactness across threads is not required

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters shared by every binding, the emitter and the writer
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    listeners_attached: AtomicU64,
    listeners_released: AtomicU64,
    snapshots_applied: AtomicU64,
    stale_callbacks_dropped: AtomicU64,
    permission_denials: AtomicU64,
    decode_failures: AtomicU64,
    errors_published: AtomicU64,
    listener_panics: AtomicU64,
    writes_failed: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_listeners_attached(&self) {
        self.listeners_attached.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_listeners_released(&self) {
        self.listeners_released.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_snapshots_applied(&self) {
        self.snapshots_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_stale_callbacks(&self) {
        self.stale_callbacks_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_permission_denials(&self) {
        self.permission_denials.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_decode_failures(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_errors_published(&self) {
        self.errors_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_listener_panics(&self) {
        self.listener_panics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_writes_failed(&self) {
        self.writes_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Listeners currently attached across all bindings
    pub fn active_listeners(&self) -> u64 {
        let snapshot = self.snapshot();
        snapshot
            .listeners_attached
            .saturating_sub(snapshot.listeners_released)
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            listeners_attached: self.listeners_attached.load(Ordering::Relaxed),
            listeners_released: self.listeners_released.load(Ordering::Relaxed),
            snapshots_applied: self.snapshots_applied.load(Ordering::Relaxed),
            stale_callbacks_dropped: self.stale_callbacks_dropped.load(Ordering::Relaxed),
            permission_denials: self.permission_denials.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            errors_published: self.errors_published.load(Ordering::Relaxed),
            listener_panics: self.listener_panics.load(Ordering::Relaxed),
            writes_failed: self.writes_failed.load(Ordering::Relaxed),
        }
    }

    /// Current counters as a JSON object
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or(serde_json::Value::Null)
    }
}

/// A point-in-time snapshot of all counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub listeners_attached: u64,
    pub listeners_released: u64,
    pub snapshots_applied: u64,
    pub stale_callbacks_dropped: u64,
    pub permission_denials: u64,
    pub decode_failures: u64,
    pub errors_published: u64,
    pub listener_panics: u64,
    pub writes_failed: u64,
}
