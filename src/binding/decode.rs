//! Typed decoding of snapshots

use std::ops::Deref;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::DecodeError;
use crate::store::{DocumentSnapshot, QuerySnapshot};

/// A decoded document together with its id.
///
/// Serializes flat: `{"id": "u1", "firstName": "Ann"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithId<T> {
    pub id: String,
    #[serde(flatten)]
    pub data: T,
}

impl<T> WithId<T> {
    pub fn new(id: impl Into<String>, data: T) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    pub fn into_inner(self) -> T {
        self.data
    }
}

impl<T> Deref for WithId<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.data
    }
}

/// Decode a snapshot into `T`. A missing document decodes to `None`.
pub fn decode_document<T: DeserializeOwned>(
    snapshot: &DocumentSnapshot,
) -> Result<Option<WithId<T>>, DecodeError> {
    let Some(fields) = snapshot.data() else {
        return Ok(None);
    };
    let data = serde_json::from_value(Value::Object(fields.clone()))
        .map_err(|e| DecodeError::new(snapshot.path().as_str(), e.to_string()))?;
    Ok(Some(WithId::new(snapshot.id(), data)))
}

/// Decode every document of a query result, in order.
///
/// One undecodable document fails the whole result.
pub fn decode_query<T: DeserializeOwned>(
    snapshot: &QuerySnapshot,
) -> Result<Vec<WithId<T>>, DecodeError> {
    let mut decoded = Vec::with_capacity(snapshot.len());
    for doc in snapshot.docs() {
        if let Some(item) = decode_document(doc)? {
            decoded.push(item);
        }
    }
    Ok(decoded)
}
