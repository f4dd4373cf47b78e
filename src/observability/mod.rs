//! Observability for livedoc
//!
//! - Structured logging (JSON lines)
//! - Named lifecycle events
//! - Monotonic counters
//!
//! Observability is read-only: nothing here feeds back into binding state.
//!
//! ```ignore
//! use livedoc::observability::{Event, Logger, MetricsRegistry};
//!
//! Event::ListenerAttached.emit(&[("path", "users/u1")]);
//! Logger::warn("SLOW_SNAPSHOT", &[("ms", "250")]);
//!
//! let metrics = MetricsRegistry::new();
//! metrics.increment_listeners_attached();
//! ```

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{LogTarget, Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
