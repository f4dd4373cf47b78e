//! # Subscription Bindings
//!
//! Bindings turn backend listeners into a [`SubscriptionResult`] that is
//! always in one of four shapes (idle, loading, ready, failed).
//!
//! - [`DocumentBinding`] watches one document.
//! - [`CollectionBinding`] watches the result set of a query.
//! - [`Writes`] performs writes whose failures are routed to the error
//!   emitter instead of the caller.
//!
//! Every failure is recorded in the binding's own state and published on
//! the context's [`ErrorEmitter`](crate::emitter::ErrorEmitter).

mod collection;
mod decode;
mod document;
mod live;
mod state;
mod writes;

pub use collection::CollectionBinding;
pub use decode::{decode_document, decode_query, WithId};
pub use document::DocumentBinding;
pub use state::SubscriptionResult;
pub use writes::Writes;
