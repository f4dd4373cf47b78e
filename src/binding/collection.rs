//! Live binding to a query result

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

use crate::context::ServiceContext;
use crate::errors::{Operation, PermissionError};
use crate::store::{BackendError, DocumentBackend, Query, QueryCallback, QuerySnapshot};

use super::decode::{decode_query, WithId};
use super::live::LiveState;
use super::state::SubscriptionResult;

/// Keeps a [`SubscriptionResult`] in step with the documents matching a
/// [`Query`], in query order.
///
/// A query with no matches settles to `ready(Some(vec![]))`; only the
/// idle and failed states carry no data.
pub struct CollectionBinding<T> {
    ctx: Arc<ServiceContext>,
    state: LiveState<Query, Vec<WithId<T>>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> CollectionBinding<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        let state = LiveState::new(&ctx);
        Self {
            ctx,
            state,
            _marker: PhantomData,
        }
    }

    /// Point the binding at `query`; `None` releases the listener.
    /// Watching a query equal to the current one does nothing.
    pub fn watch(&self, query: Option<Query>) {
        self.attach(query, false);
    }

    pub fn refresh(&self) {
        self.attach(self.state.locator(), true);
    }

    pub fn stop(&self) {
        self.state.clear();
    }

    pub fn query(&self) -> Option<Query> {
        self.state.locator()
    }

    pub fn current(&self) -> SubscriptionResult<Vec<WithId<T>>> {
        self.state.current()
    }

    pub fn changes(&self) -> mpsc::UnboundedReceiver<SubscriptionResult<Vec<WithId<T>>>> {
        self.state.subscribe()
    }

    fn attach(&self, query: Option<Query>, force: bool) {
        let backend = Arc::clone(self.ctx.backend());
        self.state.watch(&self.ctx, query, force, |query, sink, caller| {
            let auth = caller.clone();
            let callback: QueryCallback =
                Arc::new(move |result: Result<QuerySnapshot, BackendError>| match result {
                    Ok(snapshot) => match decode_query::<T>(&snapshot) {
                        Ok(docs) => sink.deliver(Some(docs)),
                        Err(e) => sink.fail(e.into()),
                    },
                    Err(e) => sink.fail(
                        PermissionError::new(Operation::List, sink.path())
                            .with_auth(auth.clone())
                            .with_cause(e.code)
                            .into(),
                    ),
                });
            backend.listen_query(query, caller.as_ref(), callback)
        });
    }
}

impl<T> std::fmt::Debug for CollectionBinding<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionBinding").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Identity;
    use crate::errors::SubscriptionError;
    use crate::store::{
        into_fields, AccessPolicy, CollectionPath, DocumentPath, FilterOp, MemoryBackend,
        ScriptedBackend, SortDirection,
    };
    use serde_json::{json, Value};

    fn users() -> Query {
        Query::new(CollectionPath::parse("users").unwrap())
    }

    #[test]
    fn test_empty_result_is_empty_vec() {
        let backend = ScriptedBackend::new();
        let ctx = ServiceContext::builder()
            .backend(Arc::new(backend.clone()))
            .mounted()
            .build();
        let binding = CollectionBinding::<Value>::new(ctx);

        binding.watch(None);
        assert!(binding.current().data().is_none());

        binding.watch(Some(users()));
        let id = backend.latest_for_query(&users()).unwrap();
        backend.deliver_query(id, vec![]);

        let state = binding.current();
        assert_eq!(state.data().map(Vec::len), Some(0));
        assert!(!state.is_loading());
        assert!(state.error().is_none());
    }

    #[test]
    fn test_query_order_and_ids() {
        let memory = MemoryBackend::new();
        for (id, age) in [("a", 30), ("b", 20), ("c", 40)] {
            memory.seed(
                &DocumentPath::parse(&format!("users/{}", id)).unwrap(),
                into_fields(json!({"age": age})),
            );
        }
        let ctx = ServiceContext::builder()
            .backend(Arc::new(memory))
            .mounted()
            .build();

        let binding = CollectionBinding::<Value>::new(ctx);
        binding.watch(Some(
            users().order_by("age", SortDirection::Desc).limit(2),
        ));

        let ids: Vec<String> = binding
            .current()
            .into_data()
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[test]
    fn test_unscoped_query_denied_under_ownership() {
        let memory = MemoryBackend::new().with_policy(
            "projects",
            AccessPolicy::Ownership {
                owner_field: "ownerId".to_string(),
            },
        );
        let ctx = ServiceContext::builder()
            .backend(Arc::new(memory))
            .identity(Identity::new("u1"))
            .mounted()
            .build();
        let projects = Query::new(CollectionPath::parse("projects").unwrap());

        let binding = CollectionBinding::<Value>::new(Arc::clone(&ctx));
        binding.watch(Some(projects.clone()));
        let state = binding.current();
        let err = state.error().and_then(SubscriptionError::as_permission).unwrap();
        assert_eq!(err.operation, Operation::List);
        assert_eq!(err.resource_path, "projects");

        binding.watch(Some(projects.filter("ownerId", FilterOp::Eq, json!("u1"))));
        assert_eq!(binding.current().data().map(Vec::len), Some(0));
    }

    #[test]
    fn test_one_bad_document_fails_snapshot() {
        #[derive(Debug, Clone, serde::Deserialize)]
        struct Named {
            #[allow(dead_code)]
            name: String,
        }

        let backend = ScriptedBackend::new();
        let ctx = ServiceContext::builder()
            .backend(Arc::new(backend.clone()))
            .mounted()
            .build();
        let binding = CollectionBinding::<Named>::new(ctx);
        binding.watch(Some(users()));

        let id = backend.latest_for_query(&users()).unwrap();
        backend.deliver_query(id, vec![("u1", json!({"name": "Ann"})), ("u2", json!({}))]);

        let state = binding.current();
        assert!(state.data().is_none());
        assert_eq!(state.error().unwrap().resource_path(), "users/u2");
    }
}
