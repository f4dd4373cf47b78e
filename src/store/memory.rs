//! # In-Memory Backend
//!
//! A process-local document store with live listeners and per-collection
//! access policies. Every listener receives its initial snapshot
//! synchronously from `listen_*`, then a fresh snapshot after each write
//! that touches what it watches.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use uuid::Uuid;

use crate::context::Identity;

use super::backend::{DocumentBackend, DocumentCallback, ListenerRegistration, QueryCallback};
use super::errors::{BackendError, BackendErrorCode};
use super::path::{CollectionPath, DocumentPath};
use super::policy::AccessPolicy;
use super::query::Query;
use super::snapshot::{DocumentSnapshot, Fields, QuerySnapshot};

#[derive(Clone)]
enum Target {
    Document(DocumentPath, DocumentCallback),
    Query(Query, QueryCallback),
}

impl Target {
    fn affected_by(&self, changed: &DocumentPath) -> bool {
        match self {
            Target::Document(path, _) => path == changed,
            Target::Query(query, _) => query.collection().contains(changed),
        }
    }
}

#[derive(Clone)]
struct Listener {
    target: Target,
    caller: Option<Identity>,
}

#[derive(Default)]
struct MemoryInner {
    documents: RwLock<BTreeMap<DocumentPath, Fields>>,
    policies: RwLock<HashMap<String, AccessPolicy>>,
    default_policy: RwLock<AccessPolicy>,
    listeners: Mutex<HashMap<u64, Listener>>,
    next_listener: AtomicU64,
}

impl MemoryInner {
    fn unregister(&self, id: u64) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    fn is_registered(&self, id: u64) -> bool {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }
}

/// In-memory [`DocumentBackend`]
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<MemoryInner>,
}

impl MemoryBackend {
    /// Empty store where every collection is open
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a policy to every collection whose id is `collection_id`
    pub fn with_policy(self, collection_id: &str, policy: AccessPolicy) -> Self {
        self.set_policy(collection_id, policy);
        self
    }

    /// Policy for collections without an explicit one
    pub fn with_default_policy(self, policy: AccessPolicy) -> Self {
        *self
            .inner
            .default_policy
            .write()
            .unwrap_or_else(PoisonError::into_inner) = policy;
        self
    }

    pub fn set_policy(&self, collection_id: &str, policy: AccessPolicy) {
        self.inner
            .policies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(collection_id.to_string(), policy);
    }

    /// Write a document without checking policies; listeners are notified
    pub fn seed(&self, path: &DocumentPath, data: Fields) {
        self.inner
            .documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.clone(), data);
        self.notify(path);
    }

    /// Read a document without checking policies
    pub fn get(&self, path: &DocumentPath) -> Option<Fields> {
        self.inner
            .documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    /// Number of stored documents
    pub fn len(&self) -> usize {
        self.inner
            .documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of installed listeners
    pub fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn policy_for(&self, collection: &CollectionPath) -> AccessPolicy {
        let policies = self
            .inner
            .policies
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match policies.get(collection.id()) {
            Some(policy) => policy.clone(),
            None => self
                .inner
                .default_policy
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }

    fn query_snapshot(&self, query: &Query) -> QuerySnapshot {
        let candidates: Vec<DocumentSnapshot> = {
            let docs = self
                .inner
                .documents
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            docs.iter()
                .filter(|(path, _)| query.collection().contains(path))
                .map(|(path, fields)| DocumentSnapshot::new(path.clone(), Some(fields.clone())))
                .collect()
        };
        QuerySnapshot::new(query.apply(candidates))
    }

    fn register(&self, listener: Listener) -> ListenerRegistration {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, listener);

        let weak = Arc::downgrade(&self.inner);
        ListenerRegistration::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.unregister(id);
            }
        })
    }

    /// Re-deliver to every listener watching `changed`.
    ///
    /// A listener that can no longer read its target receives the denial
    /// and is detached.
    fn notify(&self, changed: &DocumentPath) {
        let affected: Vec<(u64, Listener)> = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, l)| l.target.affected_by(changed))
            .map(|(id, l)| (*id, l.clone()))
            .collect();

        for (id, listener) in affected {
            if !self.inner.is_registered(id) {
                continue;
            }
            match &listener.target {
                Target::Document(path, callback) => {
                    let stored = self.get(path);
                    match self
                        .policy_for(&path.parent())
                        .check_get(stored.as_ref(), listener.caller.as_ref())
                    {
                        Ok(()) => callback(Ok(DocumentSnapshot::new(path.clone(), stored))),
                        Err(err) => {
                            self.inner.unregister(id);
                            callback(Err(err));
                        }
                    }
                }
                Target::Query(query, callback) => {
                    match self
                        .policy_for(query.collection())
                        .check_list(query, listener.caller.as_ref())
                    {
                        Ok(()) => callback(Ok(self.query_snapshot(query))),
                        Err(err) => {
                            self.inner.unregister(id);
                            callback(Err(err));
                        }
                    }
                }
            }
        }
    }

    fn write_document(
        &self,
        path: &DocumentPath,
        data: Fields,
        merge: bool,
        must_exist: bool,
        caller: Option<&Identity>,
    ) -> Result<(), BackendError> {
        let policy = self.policy_for(&path.parent());
        {
            let mut docs = self
                .inner
                .documents
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let stored = docs.get(path);

            if must_exist && stored.is_none() {
                return Err(BackendError::not_found(format!("no document at {}", path)));
            }

            let next = match (merge, stored) {
                (true, Some(existing)) => {
                    let mut merged = existing.clone();
                    merged.extend(data);
                    merged
                }
                _ => data,
            };

            policy.check_write(stored, Some(&next), caller)?;
            docs.insert(path.clone(), next);
        }
        self.notify(path);
        Ok(())
    }
}

impl DocumentBackend for MemoryBackend {
    fn listen_document(
        &self,
        path: &DocumentPath,
        caller: Option<&Identity>,
        callback: DocumentCallback,
    ) -> ListenerRegistration {
        let stored = self.get(path);
        if let Err(err) = self
            .policy_for(&path.parent())
            .check_get(stored.as_ref(), caller)
        {
            callback(Err(err));
            return ListenerRegistration::inert();
        }

        let registration = self.register(Listener {
            target: Target::Document(path.clone(), Arc::clone(&callback)),
            caller: caller.cloned(),
        });
        callback(Ok(DocumentSnapshot::new(path.clone(), stored)));
        registration
    }

    fn listen_query(
        &self,
        query: &Query,
        caller: Option<&Identity>,
        callback: QueryCallback,
    ) -> ListenerRegistration {
        if let Err(err) = self.policy_for(query.collection()).check_list(query, caller) {
            callback(Err(err));
            return ListenerRegistration::inert();
        }

        let registration = self.register(Listener {
            target: Target::Query(query.clone(), Arc::clone(&callback)),
            caller: caller.cloned(),
        });
        callback(Ok(self.query_snapshot(query)));
        registration
    }

    fn set(
        &self,
        path: &DocumentPath,
        data: Fields,
        merge: bool,
        caller: Option<&Identity>,
    ) -> Result<(), BackendError> {
        self.write_document(path, data, merge, false, caller)
    }

    fn add(
        &self,
        collection: &CollectionPath,
        data: Fields,
        caller: Option<&Identity>,
    ) -> Result<DocumentPath, BackendError> {
        let id = Uuid::new_v4().simple().to_string();
        let path = collection
            .doc(&id)
            .map_err(|e| BackendError::new(BackendErrorCode::Internal, e.to_string()))?;
        self.write_document(&path, data, false, false, caller)?;
        Ok(path)
    }

    fn update(
        &self,
        path: &DocumentPath,
        data: Fields,
        caller: Option<&Identity>,
    ) -> Result<(), BackendError> {
        self.write_document(path, data, true, true, caller)
    }

    fn delete(&self, path: &DocumentPath, caller: Option<&Identity>) -> Result<(), BackendError> {
        let policy = self.policy_for(&path.parent());
        {
            let mut docs = self
                .inner
                .documents
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            policy.check_write(docs.get(path), None, caller)?;
            if docs.remove(path).is_none() {
                return Ok(());
            }
        }
        self.notify(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::snapshot::into_fields;
    use crate::store::{FilterOp, SortDirection};
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    type Seen<T> = Arc<StdMutex<Vec<Result<T, BackendError>>>>;

    fn doc_recorder() -> (DocumentCallback, Seen<DocumentSnapshot>) {
        let seen: Seen<DocumentSnapshot> = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let cb: DocumentCallback =
            Arc::new(move |r: Result<DocumentSnapshot, BackendError>| sink.lock().unwrap().push(r));
        (cb, seen)
    }

    fn query_recorder() -> (QueryCallback, Seen<QuerySnapshot>) {
        let seen: Seen<QuerySnapshot> = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let cb: QueryCallback =
            Arc::new(move |r: Result<QuerySnapshot, BackendError>| sink.lock().unwrap().push(r));
        (cb, seen)
    }

    fn path(p: &str) -> DocumentPath {
        DocumentPath::parse(p).unwrap()
    }

    #[test]
    fn test_initial_snapshot_is_synchronous() {
        let backend = MemoryBackend::new();
        backend.seed(&path("users/u1"), into_fields(json!({"firstName": "Ann"})));

        let (cb, seen) = doc_recorder();
        let _reg = backend.listen_document(&path("users/u1"), None, cb);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let snap = seen[0].as_ref().unwrap();
        assert_eq!(snap.get("firstName"), Some(&json!("Ann")));
    }

    #[test]
    fn test_writes_redeliver_until_removed() {
        let backend = MemoryBackend::new();
        let (cb, seen) = doc_recorder();
        let reg = backend.listen_document(&path("users/u1"), None, cb);

        backend
            .set(&path("users/u1"), into_fields(json!({"n": 1})), false, None)
            .unwrap();
        assert_eq!(seen.lock().unwrap().len(), 2);

        reg.remove();
        assert_eq!(backend.listener_count(), 0);

        backend
            .set(&path("users/u1"), into_fields(json!({"n": 2})), false, None)
            .unwrap();
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_denied_listen_is_not_installed() {
        let backend = MemoryBackend::new().with_policy("secrets", AccessPolicy::Deny);
        let (cb, seen) = doc_recorder();
        let reg = backend.listen_document(&path("secrets/s1"), None, cb);

        assert!(!reg.is_active());
        assert_eq!(backend.listener_count(), 0);
        let seen = seen.lock().unwrap();
        assert_eq!(
            seen[0].as_ref().unwrap_err().code,
            BackendErrorCode::PermissionDenied
        );
    }

    #[test]
    fn test_merge_and_update() {
        let backend = MemoryBackend::new();
        let p = path("jobs/j1");

        assert_eq!(
            backend.update(&p, Fields::new(), None).unwrap_err().code,
            BackendErrorCode::NotFound
        );

        backend.set(&p, into_fields(json!({"a": 1, "b": 2})), false, None).unwrap();
        backend.set(&p, into_fields(json!({"b": 3})), true, None).unwrap();
        assert_eq!(backend.get(&p).unwrap(), into_fields(json!({"a": 1, "b": 3})));

        backend.update(&p, into_fields(json!({"c": 4})), None).unwrap();
        assert_eq!(backend.get(&p).unwrap().len(), 3);

        backend.set(&p, into_fields(json!({"z": 0})), false, None).unwrap();
        assert_eq!(backend.get(&p).unwrap(), into_fields(json!({"z": 0})));
    }

    #[test]
    fn test_query_listener_tracks_collection() {
        let backend = MemoryBackend::new();
        let col = CollectionPath::parse("orgs/org1/customers").unwrap();
        let query = Query::new(col.clone()).order_by("name", SortDirection::Asc);

        let (cb, seen) = query_recorder();
        let _reg = backend.listen_query(&query, None, cb);
        assert!(seen.lock().unwrap()[0].as_ref().unwrap().is_empty());

        backend.add(&col, into_fields(json!({"name": "Birch"})), None).unwrap();
        backend.add(&col, into_fields(json!({"name": "Acme"})), None).unwrap();
        backend
            .set(&path("orgs/org2/customers/x"), into_fields(json!({"name": "Other"})), false, None)
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        let last = seen[2].as_ref().unwrap();
        let names: Vec<_> = last.docs().iter().map(|d| d.get("name").cloned()).collect();
        assert_eq!(names, vec![Some(json!("Acme")), Some(json!("Birch"))]);
    }

    #[test]
    fn test_ownership_rules() {
        let backend = MemoryBackend::new().with_policy(
            "projects",
            AccessPolicy::Ownership {
                owner_field: "ownerId".to_string(),
            },
        );
        let ann = Identity::new("ann");
        let bob = Identity::new("bob");
        let p = path("projects/p1");

        backend
            .set(&p, into_fields(json!({"ownerId": "ann"})), false, Some(&ann))
            .unwrap();
        assert!(backend
            .set(&p, into_fields(json!({"ownerId": "bob"})), false, Some(&bob))
            .is_err());
        assert!(backend.delete(&p, Some(&bob)).is_err());

        let (cb, seen) = doc_recorder();
        let _reg = backend.listen_document(&p, Some(&bob), cb);
        assert!(seen.lock().unwrap()[0].is_err());

        let query = Query::new(CollectionPath::parse("projects").unwrap())
            .filter("ownerId", FilterOp::Eq, json!("ann"));
        let (cb, seen) = query_recorder();
        let _reg = backend.listen_query(&query, Some(&ann), cb);
        assert_eq!(seen.lock().unwrap()[0].as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_listener_detached_when_access_revoked() {
        let backend = MemoryBackend::new();
        let p = path("projects/p1");
        backend.seed(&p, into_fields(json!({"ownerId": "ann"})));

        let (cb, seen) = doc_recorder();
        let _reg = backend.listen_document(&p, Some(&Identity::new("bob")), cb);
        assert!(seen.lock().unwrap()[0].is_ok());

        backend.set_policy(
            "projects",
            AccessPolicy::Ownership {
                owner_field: "ownerId".to_string(),
            },
        );
        backend.seed(&p, into_fields(json!({"ownerId": "ann", "v": 2})));

        assert!(seen.lock().unwrap()[1].is_err());
        assert_eq!(backend.listener_count(), 0);
    }

    #[test]
    fn test_delete_notifies_missing() {
        let backend = MemoryBackend::new();
        let p = path("users/u1");
        backend.seed(&p, into_fields(json!({"a": 1})));

        let (cb, seen) = doc_recorder();
        let _reg = backend.listen_document(&p, None, cb);
        backend.delete(&p, None).unwrap();
        backend.delete(&p, None).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(!seen[1].as_ref().unwrap().exists());
    }
}
