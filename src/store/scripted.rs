//! # Scripted Backend
//!
//! A backend that never answers on its own. Every listener is recorded and
//! the driver decides what each one receives and when, including
//! deliveries to listeners that were already removed. Used to exercise
//! out-of-order and late callbacks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use uuid::Uuid;

use crate::context::Identity;

use super::backend::{DocumentBackend, DocumentCallback, ListenerRegistration, QueryCallback};
use super::errors::BackendError;
use super::path::{CollectionPath, DocumentPath};
use super::query::Query;
use super::snapshot::{into_fields, DocumentSnapshot, Fields, QuerySnapshot};

/// Identifier of a recorded listener, in attach order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub usize);

#[derive(Clone)]
enum Recorded {
    Document(DocumentPath, DocumentCallback),
    Query(Query, QueryCallback),
}

#[derive(Clone)]
struct Entry {
    recorded: Recorded,
    caller: Option<Identity>,
    active: Arc<AtomicBool>,
}

/// A write the scripted backend accepted or rejected
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedWrite {
    pub op: &'static str,
    pub path: String,
    pub data: Option<Fields>,
    pub caller: Option<String>,
}

#[derive(Default)]
struct ScriptedInner {
    entries: Mutex<Vec<Entry>>,
    writes: Mutex<Vec<RecordedWrite>>,
    write_failure: Mutex<Option<BackendError>>,
}

/// Driver-controlled [`DocumentBackend`]
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    inner: Arc<ScriptedInner>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, id: ListenerId) -> Option<Entry> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id.0)
            .cloned()
    }

    fn record(&self, recorded: Recorded, caller: Option<&Identity>) -> ListenerRegistration {
        let active = Arc::new(AtomicBool::new(true));
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Entry {
                recorded,
                caller: caller.cloned(),
                active: Arc::clone(&active),
            });
        ListenerRegistration::new(move || active.store(false, Ordering::SeqCst))
    }

    /// Every listener ever attached, in attach order
    pub fn listener_count(&self) -> usize {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Listeners not yet removed
    pub fn active_count(&self) -> usize {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.active.load(Ordering::SeqCst))
            .count()
    }

    pub fn is_active(&self, id: ListenerId) -> bool {
        self.entry(id)
            .map(|e| e.active.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Most recent listener attached to `path`
    pub fn latest_for_document(&self, path: &DocumentPath) -> Option<ListenerId> {
        let entries = self
            .inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        entries.iter().rposition(|e| matches!(&e.recorded, Recorded::Document(p, _) if p == path))
            .map(ListenerId)
    }

    /// Most recent listener attached to `query`
    pub fn latest_for_query(&self, query: &Query) -> Option<ListenerId> {
        let entries = self
            .inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        entries.iter().rposition(|e| matches!(&e.recorded, Recorded::Query(q, _) if q == query))
            .map(ListenerId)
    }

    /// Identity the listener was attached with
    pub fn caller_of(&self, id: ListenerId) -> Option<Identity> {
        self.entry(id).and_then(|e| e.caller)
    }

    /// Deliver a document snapshot; `None` means the document does not exist.
    ///
    /// Returns false if `id` is unknown or is a query listener.
    pub fn deliver_document(&self, id: ListenerId, data: Option<Value>) -> bool {
        match self.entry(id).map(|e| e.recorded) {
            Some(Recorded::Document(path, callback)) => {
                callback(Ok(DocumentSnapshot::new(path, data.map(into_fields))));
                true
            }
            _ => false,
        }
    }

    /// Deliver a query result as `(document id, fields)` pairs, in order
    pub fn deliver_query(&self, id: ListenerId, docs: Vec<(&str, Value)>) -> bool {
        match self.entry(id).map(|e| e.recorded) {
            Some(Recorded::Query(query, callback)) => {
                let mut snapshots = Vec::with_capacity(docs.len());
                for (doc_id, data) in docs {
                    match query.collection().doc(doc_id) {
                        Ok(path) => snapshots.push(DocumentSnapshot::new(path, Some(into_fields(data)))),
                        Err(_) => return false,
                    }
                }
                callback(Ok(QuerySnapshot::new(snapshots)));
                true
            }
            _ => false,
        }
    }

    /// Deliver an error to any listener
    pub fn fail(&self, id: ListenerId, error: BackendError) -> bool {
        match self.entry(id).map(|e| e.recorded) {
            Some(Recorded::Document(_, callback)) => {
                callback(Err(error));
                true
            }
            Some(Recorded::Query(_, callback)) => {
                callback(Err(error));
                true
            }
            None => false,
        }
    }

    /// Make every following write fail with `error` (`None` restores success)
    pub fn fail_writes_with(&self, error: Option<BackendError>) {
        *self
            .inner
            .write_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = error;
    }

    /// Writes seen so far
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.inner
            .writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record_write(
        &self,
        op: &'static str,
        path: String,
        data: Option<Fields>,
        caller: Option<&Identity>,
    ) -> Result<(), BackendError> {
        self.inner
            .writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedWrite {
                op,
                path,
                data,
                caller: caller.map(|c| c.uid.clone()),
            });

        match self
            .inner
            .write_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl DocumentBackend for ScriptedBackend {
    fn listen_document(
        &self,
        path: &DocumentPath,
        caller: Option<&Identity>,
        callback: DocumentCallback,
    ) -> ListenerRegistration {
        self.record(Recorded::Document(path.clone(), callback), caller)
    }

    fn listen_query(
        &self,
        query: &Query,
        caller: Option<&Identity>,
        callback: QueryCallback,
    ) -> ListenerRegistration {
        self.record(Recorded::Query(query.clone(), callback), caller)
    }

    fn set(
        &self,
        path: &DocumentPath,
        data: Fields,
        merge: bool,
        caller: Option<&Identity>,
    ) -> Result<(), BackendError> {
        let op = if merge { "set-merge" } else { "set" };
        self.record_write(op, path.to_string(), Some(data), caller)
    }

    fn add(
        &self,
        collection: &CollectionPath,
        data: Fields,
        caller: Option<&Identity>,
    ) -> Result<DocumentPath, BackendError> {
        let path = collection
            .doc(&Uuid::new_v4().simple().to_string())
            .map_err(|e| BackendError::new(super::BackendErrorCode::Internal, e.to_string()))?;
        self.record_write("add", path.to_string(), Some(data), caller)?;
        Ok(path)
    }

    fn update(
        &self,
        path: &DocumentPath,
        data: Fields,
        caller: Option<&Identity>,
    ) -> Result<(), BackendError> {
        self.record_write("update", path.to_string(), Some(data), caller)
    }

    fn delete(&self, path: &DocumentPath, caller: Option<&Identity>) -> Result<(), BackendError> {
        self.record_write("delete", path.to_string(), None, caller)
    }
}
