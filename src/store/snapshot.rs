//! Point-in-time payloads delivered to listeners.

use serde::Serialize;
use serde_json::{Map, Value};

use super::path::DocumentPath;

/// Raw stored fields of a document
pub type Fields = Map<String, Value>;

/// Turn an arbitrary JSON value into document fields.
///
/// Non-object values are stored under a single `value` field.
pub fn into_fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

/// Current state of one document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSnapshot {
    path: DocumentPath,
    data: Option<Fields>,
}

impl DocumentSnapshot {
    pub fn new(path: DocumentPath, data: Option<Fields>) -> Self {
        Self { path, data }
    }

    /// Snapshot of a document that does not exist
    pub fn missing(path: DocumentPath) -> Self {
        Self { path, data: None }
    }

    pub fn exists(&self) -> bool {
        self.data.is_some()
    }

    pub fn id(&self) -> &str {
        self.path.id()
    }

    pub fn path(&self) -> &DocumentPath {
        &self.path
    }

    pub fn data(&self) -> Option<&Fields> {
        self.data.as_ref()
    }

    /// Single raw field
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.as_ref().and_then(|d| d.get(field))
    }
}

/// Ordered result set of a query
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QuerySnapshot {
    docs: Vec<DocumentSnapshot>,
}

impl QuerySnapshot {
    /// Documents must already be filtered and ordered by the query
    pub fn new(docs: Vec<DocumentSnapshot>) -> Self {
        Self { docs }
    }

    pub fn docs(&self) -> &[DocumentSnapshot] {
        &self.docs
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}
