//! livedoc - live document bindings with out-of-band permission errors
//!
//! Bindings keep a `SubscriptionResult` in step with a document or a
//! query. Every failure is recorded locally and published on an
//! injectable error emitter.

pub mod binding;
pub mod cli;
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod emitter;
pub mod errors;
pub mod observability;
pub mod store;

pub use binding::{CollectionBinding, DocumentBinding, SubscriptionResult, WithId, Writes};
pub use context::{Identity, ServiceContext, ServiceStatus};
pub use diagnostics::DiagnosticsListener;
pub use emitter::{ErrorEmitter, Unsubscribe, DECODE_ERROR, PERMISSION_ERROR};
pub use errors::{DecodeError, Operation, PermissionError, SubscriptionError};
