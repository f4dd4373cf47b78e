//! Non-blocking writes
//!
//! Writes run against the backend on behalf of the context identity.
//! Failures never come back to the caller: they are reported on the
//! error emitter as a [`PermissionError`] carrying the request data, the
//! same way a denied listener is.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::context::ServiceContext;
use crate::errors::{Operation, PermissionError};
use crate::observability::Event;
use crate::store::{BackendError, CollectionPath, DocumentBackend, DocumentPath, Fields};

/// Fire-and-forget writer bound to a context
#[derive(Debug, Clone)]
pub struct Writes {
    ctx: Arc<ServiceContext>,
}

impl Writes {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    /// Create or overwrite `path`; `merge` keeps fields not in `data`
    pub fn set_document<D: Serialize>(&self, path: &DocumentPath, data: &D, merge: bool) {
        let Some(fields) = self.prepare(Operation::Write, path.as_str(), data) else {
            return;
        };
        let caller = self.ctx.identity();
        if let Err(e) = self
            .ctx
            .backend()
            .set(path, fields.clone(), merge, caller.as_ref())
        {
            self.report(Operation::Write, path.as_str(), Some(fields), e);
        }
    }

    /// Create a document with a generated id. Returns its path, or `None`
    /// if the write failed.
    pub fn add_document<D: Serialize>(
        &self,
        collection: &CollectionPath,
        data: &D,
    ) -> Option<DocumentPath> {
        let fields = self.prepare(Operation::Create, collection.as_str(), data)?;
        let caller = self.ctx.identity();
        match self
            .ctx
            .backend()
            .add(collection, fields.clone(), caller.as_ref())
        {
            Ok(path) => Some(path),
            Err(e) => {
                self.report(Operation::Create, collection.as_str(), Some(fields), e);
                None
            }
        }
    }

    /// Merge `data` into an existing document
    pub fn update_document<D: Serialize>(&self, path: &DocumentPath, data: &D) {
        let Some(fields) = self.prepare(Operation::Update, path.as_str(), data) else {
            return;
        };
        let caller = self.ctx.identity();
        if let Err(e) = self
            .ctx
            .backend()
            .update(path, fields.clone(), caller.as_ref())
        {
            self.report(Operation::Update, path.as_str(), Some(fields), e);
        }
    }

    pub fn delete_document(&self, path: &DocumentPath) {
        if !self.available(Operation::Delete, path.as_str()) {
            return;
        }
        let caller = self.ctx.identity();
        if let Err(e) = self.ctx.backend().delete(path, caller.as_ref()) {
            self.report(Operation::Delete, path.as_str(), None, e);
        }
    }

    fn available(&self, operation: Operation, path: &str) -> bool {
        if self.ctx.are_services_available() {
            return true;
        }
        Event::WriteFailed.emit(&[
            ("operation", operation.as_str()),
            ("path", path),
            ("reason", "services unavailable"),
        ]);
        false
    }

    /// Serialize `data` into document fields; only JSON objects qualify
    fn prepare<D: Serialize>(&self, operation: Operation, path: &str, data: &D) -> Option<Fields> {
        if !self.available(operation, path) {
            return None;
        }
        let reason = match serde_json::to_value(data) {
            Ok(Value::Object(fields)) => return Some(fields),
            Ok(_) => "document data must be a JSON object".to_string(),
            Err(e) => e.to_string(),
        };
        self.ctx.metrics().increment_writes_failed();
        Event::WriteFailed.emit(&[
            ("operation", operation.as_str()),
            ("path", path),
            ("reason", reason.as_str()),
        ]);
        None
    }

    fn report(&self, operation: Operation, path: &str, data: Option<Fields>, error: BackendError) {
        self.ctx.metrics().increment_writes_failed();
        Event::WriteFailed.emit(&[
            ("cause", error.code.as_str()),
            ("operation", operation.as_str()),
            ("path", path),
        ]);

        let mut denied = PermissionError::new(operation, path)
            .with_auth(self.ctx.identity())
            .with_cause(error.code);
        if let Some(fields) = data {
            denied = denied.with_request_data(Value::Object(fields));
        }
        self.ctx.emitter().publish_error(&denied.into());
    }
}
