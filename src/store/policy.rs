//! # Access Policies
//!
//! Per-collection security rules evaluated by [`MemoryBackend`](super::MemoryBackend).
//!
//! - Reads of a single document check the stored document.
//! - Queries under an ownership policy must pin the owner field to the
//!   caller, otherwise the whole query is denied.
//! - Writes check both the stored document (if any) and the incoming one.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::Identity;

use super::errors::BackendError;
use super::query::Query;
use super::snapshot::Fields;

/// Security rule for one collection
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AccessPolicy {
    /// Anyone may read and write
    #[default]
    Open,

    /// Any signed-in caller may read and write
    Authenticated,

    /// Only the caller named in `owner_field` may read or write
    Ownership { owner_field: String },

    /// Anyone may read, only the owner may write
    PublicRead { owner_field: String },

    /// Nobody may read or write
    Deny,
}

fn owned_by(fields: &Fields, owner_field: &str, caller: &Identity) -> bool {
    fields.get(owner_field).and_then(Value::as_str) == Some(caller.uid.as_str())
}

fn require_caller<'a>(caller: Option<&'a Identity>) -> Result<&'a Identity, BackendError> {
    caller.ok_or_else(|| BackendError::permission_denied("authentication required"))
}

impl AccessPolicy {
    /// Check a single-document read against the stored document
    pub fn check_get(
        &self,
        stored: Option<&Fields>,
        caller: Option<&Identity>,
    ) -> Result<(), BackendError> {
        match self {
            AccessPolicy::Open | AccessPolicy::PublicRead { .. } => Ok(()),
            AccessPolicy::Authenticated => require_caller(caller).map(|_| ()),
            AccessPolicy::Ownership { owner_field } => {
                let caller = require_caller(caller)?;
                match stored {
                    Some(fields) if !owned_by(fields, owner_field, caller) => Err(
                        BackendError::permission_denied("caller does not own this document"),
                    ),
                    _ => Ok(()),
                }
            }
            AccessPolicy::Deny => Err(BackendError::permission_denied("reads are denied")),
        }
    }

    /// Check a query; rules are not filters
    pub fn check_list(&self, query: &Query, caller: Option<&Identity>) -> Result<(), BackendError> {
        match self {
            AccessPolicy::Open | AccessPolicy::PublicRead { .. } => Ok(()),
            AccessPolicy::Authenticated => require_caller(caller).map(|_| ()),
            AccessPolicy::Ownership { owner_field } => {
                let caller = require_caller(caller)?;
                if query.constrains(owner_field, &Value::String(caller.uid.clone())) {
                    Ok(())
                } else {
                    Err(BackendError::permission_denied(format!(
                        "query must filter {} == caller",
                        owner_field
                    )))
                }
            }
            AccessPolicy::Deny => Err(BackendError::permission_denied("reads are denied")),
        }
    }

    /// Check a write. `incoming` is `None` for deletes.
    pub fn check_write(
        &self,
        stored: Option<&Fields>,
        incoming: Option<&Fields>,
        caller: Option<&Identity>,
    ) -> Result<(), BackendError> {
        match self {
            AccessPolicy::Open => Ok(()),
            AccessPolicy::Authenticated => require_caller(caller).map(|_| ()),
            AccessPolicy::Ownership { owner_field } | AccessPolicy::PublicRead { owner_field } => {
                let caller = require_caller(caller)?;
                if let Some(fields) = stored {
                    if !owned_by(fields, owner_field, caller) {
                        return Err(BackendError::permission_denied(
                            "caller does not own this document",
                        ));
                    }
                }
                if let Some(fields) = incoming {
                    if !owned_by(fields, owner_field, caller) {
                        return Err(BackendError::permission_denied(format!(
                            "{} must equal the caller's uid",
                            owner_field
                        )));
                    }
                }
                Ok(())
            }
            AccessPolicy::Deny => Err(BackendError::permission_denied("writes are denied")),
        }
    }
}
