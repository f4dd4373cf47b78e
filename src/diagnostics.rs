//! # Diagnostics Listener
//!
//! Out-of-band consumer of the error emitter. Keeps the most recent
//! failures in a bounded buffer for inspection (a developer overlay, the
//! CLI summary) and writes each one to the structured log as
//! `DIAGNOSTIC_RECORDED`. The failure itself is logged where it happens.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::emitter::{ErrorEmitter, Unsubscribe, DECODE_ERROR, PERMISSION_ERROR};
use crate::errors::SubscriptionError;
use crate::observability::Event;

/// One failure seen by the listener
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticRecord {
    pub event_type: String,
    pub received_at: DateTime<Utc>,
    pub error: SubscriptionError,
}

struct Buffer {
    records: VecDeque<DiagnosticRecord>,
    capacity: usize,
    total: u64,
}

impl Buffer {
    fn push(&mut self, record: DiagnosticRecord) {
        self.total += 1;
        if self.capacity == 0 {
            return;
        }
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }
}

/// Records every published error until detached
pub struct DiagnosticsListener {
    buffer: Arc<Mutex<Buffer>>,
    subscriptions: Vec<Unsubscribe>,
}

impl DiagnosticsListener {
    /// Subscribe to both error channels, keeping the last `capacity` records
    pub fn attach(emitter: &ErrorEmitter, capacity: usize) -> Self {
        let buffer = Arc::new(Mutex::new(Buffer {
            records: VecDeque::with_capacity(capacity),
            capacity,
            total: 0,
        }));

        let subscriptions = [PERMISSION_ERROR, DECODE_ERROR]
            .into_iter()
            .map(|event_type| {
                let buffer = Arc::clone(&buffer);
                emitter.subscribe(event_type, move |error| {
                    Self::observe(&buffer, event_type, error)
                })
            })
            .collect();

        Self {
            buffer,
            subscriptions,
        }
    }

    fn observe(buffer: &Mutex<Buffer>, event_type: &str, error: &SubscriptionError) {
        let message = error.to_string();
        Event::DiagnosticRecorded.emit(&[
            ("event_type", event_type),
            ("message", message.as_str()),
            ("path", error.resource_path()),
        ]);

        buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(DiagnosticRecord {
                event_type: event_type.to_string(),
                received_at: Utc::now(),
                error: error.clone(),
            });
    }

    /// Stop receiving. Records already captured are kept.
    pub fn detach(&self) {
        for subscription in &self.subscriptions {
            subscription.unsubscribe();
        }
    }

    /// Buffered records, oldest first
    pub fn records(&self) -> Vec<DiagnosticRecord> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Errors seen since attach, including ones evicted from the buffer
    pub fn total(&self) -> u64 {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .total
    }

    pub fn clear(&self) {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .clear();
    }

    /// Totals and per-channel counts of the buffered records
    pub fn summary(&self) -> Value {
        let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        let count = |kind: &str| {
            buffer
                .records
                .iter()
                .filter(|r| r.event_type == kind)
                .count()
        };
        json!({
            "total": buffer.total,
            "buffered": buffer.records.len(),
            "permission-error": count(PERMISSION_ERROR),
            "decode-error": count(DECODE_ERROR),
        })
    }
}

impl Drop for DiagnosticsListener {
    fn drop(&mut self) {
        self.detach();
    }
}
