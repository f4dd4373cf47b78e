//! # Backend Client
//!
//! The seam between bindings and a document database. A backend hands out
//! live listeners that report `(snapshot | error)` through a callback, and
//! accepts writes on behalf of a caller identity.

use std::fmt;
use std::sync::Arc;

use crate::context::Identity;

use super::errors::BackendError;
use super::path::{CollectionPath, DocumentPath};
use super::query::Query;
use super::snapshot::{DocumentSnapshot, Fields, QuerySnapshot};

/// Callback for document listeners
pub type DocumentCallback = Arc<dyn Fn(Result<DocumentSnapshot, BackendError>) + Send + Sync>;

/// Callback for query listeners
pub type QueryCallback = Arc<dyn Fn(Result<QuerySnapshot, BackendError>) + Send + Sync>;

/// Handle to a live listener.
///
/// Removing the registration (explicitly or by dropping it) guarantees
/// the backend stops delivering to the callback.
pub struct ListenerRegistration {
    remover: Option<Box<dyn FnOnce() + Send>>,
}

impl ListenerRegistration {
    pub fn new(remover: impl FnOnce() + Send + 'static) -> Self {
        Self {
            remover: Some(Box::new(remover)),
        }
    }

    /// Registration for a listener that was never installed
    pub fn inert() -> Self {
        Self { remover: None }
    }

    /// Whether removing would detach anything
    pub fn is_active(&self) -> bool {
        self.remover.is_some()
    }

    /// Stop delivery to the listener
    pub fn remove(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if let Some(remover) = self.remover.take() {
            remover();
        }
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        self.detach();
    }
}

impl fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Document database client.
///
/// Implementations may invoke callbacks synchronously from inside
/// `listen_*` or later from another thread; they must not hold internal
/// locks while doing so.
pub trait DocumentBackend: Send + Sync {
    /// Watch a single document
    fn listen_document(
        &self,
        path: &DocumentPath,
        caller: Option<&Identity>,
        callback: DocumentCallback,
    ) -> ListenerRegistration;

    /// Watch the result set of a query
    fn listen_query(
        &self,
        query: &Query,
        caller: Option<&Identity>,
        callback: QueryCallback,
    ) -> ListenerRegistration;

    /// Create or overwrite a document; `merge` keeps fields not in `data`
    fn set(
        &self,
        path: &DocumentPath,
        data: Fields,
        merge: bool,
        caller: Option<&Identity>,
    ) -> Result<(), BackendError>;

    /// Create a document with a generated id
    fn add(
        &self,
        collection: &CollectionPath,
        data: Fields,
        caller: Option<&Identity>,
    ) -> Result<DocumentPath, BackendError>;

    /// Merge fields into an existing document
    fn update(
        &self,
        path: &DocumentPath,
        data: Fields,
        caller: Option<&Identity>,
    ) -> Result<(), BackendError>;

    /// Delete a document; deleting a missing document succeeds
    fn delete(&self, path: &DocumentPath, caller: Option<&Identity>) -> Result<(), BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_registration_removes_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let reg = ListenerRegistration::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(reg.is_active());
        reg.remove();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_registration_removes_on_drop() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        {
            let _reg = ListenerRegistration::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_inert_registration() {
        let reg = ListenerRegistration::inert();
        assert!(!reg.is_active());
        reg.remove();
    }
}
