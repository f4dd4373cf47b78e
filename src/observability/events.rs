//! Observable events for livedoc
//!
//! Every log line the crate emits is named by one of these events.

use std::fmt;

use super::logger::{Logger, Severity};

/// Observable events in livedoc
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    // Context lifecycle
    /// Service context became available
    ContextMounted,
    /// Service context torn down
    ContextUnmounted,
    /// Authenticated identity changed
    IdentityChanged,

    // Configuration
    /// Configuration loaded
    ConfigLoaded,

    // Listener lifecycle
    /// A binding attached a live listener
    ListenerAttached,
    /// A binding released its listener
    ListenerReleased,
    /// A snapshot was applied to binding state
    SnapshotApplied,
    /// A callback from a superseded listener was discarded
    StaleCallbackDropped,

    // Failures
    /// Backend denied a read or write
    PermissionDenied,
    /// Stored document did not decode into the requested shape
    DecodeFailed,
    /// An emitter listener panicked during publish
    ListenerPanicked,
    /// A non-blocking write failed
    WriteFailed,

    // Diagnostics
    /// The diagnostics listener recorded a published error
    DiagnosticRecorded,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ContextMounted => "CONTEXT_MOUNTED",
            Event::ContextUnmounted => "CONTEXT_UNMOUNTED",
            Event::IdentityChanged => "IDENTITY_CHANGED",
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::ListenerAttached => "LISTENER_ATTACHED",
            Event::ListenerReleased => "LISTENER_RELEASED",
            Event::SnapshotApplied => "SNAPSHOT_APPLIED",
            Event::StaleCallbackDropped => "STALE_CALLBACK_DROPPED",
            Event::PermissionDenied => "PERMISSION_DENIED",
            Event::DecodeFailed => "DECODE_FAILED",
            Event::ListenerPanicked => "LISTENER_PANICKED",
            Event::WriteFailed => "WRITE_FAILED",
            Event::DiagnosticRecorded => "DIAGNOSTIC_RECORDED",
        }
    }

    /// Severity the event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::SnapshotApplied | Event::StaleCallbackDropped => Severity::Trace,
            Event::DiagnosticRecorded => Severity::Warn,
            Event::PermissionDenied
            | Event::DecodeFailed
            | Event::ListenerPanicked
            | Event::WriteFailed => Severity::Error,
            _ => Severity::Info,
        }
    }

    /// Log this event at its own severity
    pub fn emit(&self, fields: &[(&str, &str)]) {
        Logger::log(self.severity(), self.as_str(), fields);
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
