//! Live binding to a single document

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

use crate::context::ServiceContext;
use crate::errors::{Operation, PermissionError};
use crate::store::{
    BackendError, DocumentBackend, DocumentCallback, DocumentPath, DocumentSnapshot,
};

use super::decode::{decode_document, WithId};
use super::live::LiveState;
use super::state::SubscriptionResult;

/// Keeps a [`SubscriptionResult`] in step with one document.
///
/// ```no_run
/// # use livedoc::binding::DocumentBinding;
/// # use livedoc::context::ServiceContext;
/// # use livedoc::store::DocumentPath;
/// # fn demo() -> Result<(), livedoc::store::StoreError> {
/// let ctx = ServiceContext::builder().mounted().build();
/// let user = DocumentBinding::<serde_json::Value>::new(ctx);
/// user.watch(Some(DocumentPath::parse("users/u1")?));
/// let state = user.current();
/// # let _ = state;
/// # Ok(())
/// # }
/// ```
///
/// The locator is expected to be stable: watching the path that is
/// already watched does nothing. Dropping the binding releases its
/// listener.
pub struct DocumentBinding<T> {
    ctx: Arc<ServiceContext>,
    state: LiveState<DocumentPath, WithId<T>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> DocumentBinding<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Create an idle binding
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        let state = LiveState::new(&ctx);
        Self {
            ctx,
            state,
            _marker: PhantomData,
        }
    }

    /// Point the binding at `path`; `None` releases the listener
    pub fn watch(&self, path: Option<DocumentPath>) {
        self.attach(path, false);
    }

    /// Re-attach to the current path, picking up a changed identity
    /// or a remounted context. An unmount keeps the path, so this is how
    /// a detached binding resumes.
    pub fn refresh(&self) {
        self.attach(self.state.locator(), true);
    }

    /// Release the listener and settle to idle
    pub fn stop(&self) {
        self.state.clear();
    }

    pub fn path(&self) -> Option<DocumentPath> {
        self.state.locator()
    }

    pub fn current(&self) -> SubscriptionResult<WithId<T>> {
        self.state.current()
    }

    /// Receiver for every state transition from now on, in order.
    /// Nothing is sent for the state current at the time of the call.
    pub fn changes(&self) -> mpsc::UnboundedReceiver<SubscriptionResult<WithId<T>>> {
        self.state.subscribe()
    }

    fn attach(&self, path: Option<DocumentPath>, force: bool) {
        let backend = Arc::clone(self.ctx.backend());
        self.state.watch(&self.ctx, path, force, |path, sink, caller| {
            let auth = caller.clone();
            let callback: DocumentCallback =
                Arc::new(move |result: Result<DocumentSnapshot, BackendError>| match result {
                    Ok(snapshot) => match decode_document::<T>(&snapshot) {
                        Ok(data) => sink.deliver(data),
                        Err(e) => sink.fail(e.into()),
                    },
                    Err(e) => sink.fail(
                        PermissionError::new(Operation::Get, sink.path())
                            .with_auth(auth.clone())
                            .with_cause(e.code)
                            .into(),
                    ),
                });
            backend.listen_document(path, caller.as_ref(), callback)
        });
    }
}

impl<T> std::fmt::Debug for DocumentBinding<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentBinding").finish_non_exhaustive()
    }
}
