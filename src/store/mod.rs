//! # Document Store Client
//!
//! Everything a binding needs from a document database:
//!
//! - **Locators**: [`DocumentPath`], [`CollectionPath`] and [`Query`]
//! - **Snapshots**: [`DocumentSnapshot`], [`QuerySnapshot`]
//! - **Backend seam**: [`DocumentBackend`] with live listeners
//! - **Backends**: [`MemoryBackend`] (policy-checked, in process) and
//!   [`ScriptedBackend`] (driver-controlled delivery)

pub mod backend;
pub mod errors;
pub mod memory;
pub mod path;
pub mod policy;
pub mod query;
pub mod scripted;
pub mod snapshot;

pub use backend::{DocumentBackend, DocumentCallback, ListenerRegistration, QueryCallback};
pub use errors::{BackendError, BackendErrorCode, StoreError, StoreResult};
pub use memory::MemoryBackend;
pub use path::{CollectionPath, DocumentPath};
pub use policy::AccessPolicy;
pub use query::{Filter, FilterOp, OrderBy, Query, SortDirection};
pub use scripted::{ListenerId, RecordedWrite, ScriptedBackend};
pub use snapshot::{into_fields, DocumentSnapshot, Fields, QuerySnapshot};
