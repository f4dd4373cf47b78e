//! # Subscription Errors
//!
//! Typed failures a binding can settle into. Each one is both stored in
//! the binding's result and published on the
//! [`ErrorEmitter`](crate::emitter::ErrorEmitter).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::context::Identity;
use crate::emitter::{DECODE_ERROR, PERMISSION_ERROR};
use crate::store::BackendErrorCode;

/// Kind of request that was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Single-document read
    Get,
    /// Query read
    List,
    /// Document creation with a generated id
    Create,
    /// Merge into an existing document
    Update,
    /// Document removal
    Delete,
    /// Create-or-overwrite
    Write,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Get => "get",
            Operation::List => "list",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Write => "write",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A denied request, built where the backend reported the failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionError {
    #[serde(rename = "operationKind")]
    pub operation: Operation,
    pub resource_path: String,
    pub timestamp: DateTime<Utc>,
    /// Payload of a denied write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_resource_data: Option<Value>,
    /// Caller at the time of the request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<Identity>,
    /// Backend classification of the failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<BackendErrorCode>,
}

impl PermissionError {
    pub fn new(operation: Operation, resource_path: impl Into<String>) -> Self {
        Self {
            operation,
            resource_path: resource_path.into(),
            timestamp: Utc::now(),
            request_resource_data: None,
            auth: None,
            cause: None,
        }
    }

    pub fn with_request_data(mut self, data: Value) -> Self {
        self.request_resource_data = Some(data);
        self
    }

    pub fn with_auth(mut self, auth: Option<Identity>) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_cause(mut self, cause: BackendErrorCode) -> Self {
        self.cause = Some(cause);
        self
    }

    /// The denied request as a JSON object
    pub fn request(&self) -> Value {
        let mut request = json!({
            "auth": self.auth,
            "method": self.operation,
            "path": self.resource_path,
        });
        if let Some(data) = &self.request_resource_data {
            request["request"] = json!({ "resource": { "data": data } });
        }
        request
    }
}

impl fmt::Display for PermissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = serde_json::to_string_pretty(&self.request()).map_err(|_| fmt::Error)?;
        write!(
            f,
            "Missing or insufficient permissions: The following request was denied by security rules:\n{}",
            rendered
        )
    }
}

impl std::error::Error for PermissionError {}

/// A stored document that does not have the requested shape
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[error("Document at {resource_path} could not be decoded: {message}")]
pub struct DecodeError {
    pub resource_path: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl DecodeError {
    pub fn new(resource_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            resource_path: resource_path.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Failure observed on a subscription or a non-blocking write
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SubscriptionError {
    /// Backend denied or failed the request
    #[error(transparent)]
    Permission(PermissionError),

    /// Stored data did not decode
    #[error(transparent)]
    Decode(DecodeError),
}

impl SubscriptionError {
    /// Emitter channel this error is published on
    pub fn event_type(&self) -> &'static str {
        match self {
            SubscriptionError::Permission(_) => PERMISSION_ERROR,
            SubscriptionError::Decode(_) => DECODE_ERROR,
        }
    }

    pub fn resource_path(&self) -> &str {
        match self {
            SubscriptionError::Permission(e) => &e.resource_path,
            SubscriptionError::Decode(e) => &e.resource_path,
        }
    }

    pub fn as_permission(&self) -> Option<&PermissionError> {
        match self {
            SubscriptionError::Permission(e) => Some(e),
            SubscriptionError::Decode(_) => None,
        }
    }
}

impl From<PermissionError> for SubscriptionError {
    fn from(e: PermissionError) -> Self {
        SubscriptionError::Permission(e)
    }
}

impl From<DecodeError> for SubscriptionError {
    fn from(e: DecodeError) -> Self {
        SubscriptionError::Decode(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_error_wire_names() {
        let err = PermissionError::new(Operation::Get, "orgs/org1/customers/cust1");
        let json = serde_json::to_value(&err).unwrap();

        assert_eq!(json["operationKind"], "get");
        assert_eq!(json["resourcePath"], "orgs/org1/customers/cust1");
        assert!(json["timestamp"].is_string());
        assert!(json.get("requestResourceData").is_none());
    }

    #[test]
    fn test_permission_error_display() {
        let err = PermissionError::new(Operation::Create, "orgs/org1/proposals")
            .with_auth(Some(Identity::new("u1")))
            .with_request_data(json!({"title": "Kitchen remodel"}));

        let text = err.to_string();
        assert!(text.starts_with("Missing or insufficient permissions"));
        assert!(text.contains("\"method\": \"create\""));
        assert!(text.contains("Kitchen remodel"));
        assert!(text.contains("\"uid\": \"u1\""));
    }

    #[test]
    fn test_subscription_error_routing() {
        let denied: SubscriptionError = PermissionError::new(Operation::List, "users").into();
        assert_eq!(denied.event_type(), PERMISSION_ERROR);
        assert_eq!(denied.resource_path(), "users");
        assert!(denied.as_permission().is_some());

        let corrupt: SubscriptionError = DecodeError::new("users/u1", "missing field").into();
        assert_eq!(corrupt.event_type(), DECODE_ERROR);
        assert!(corrupt.as_permission().is_none());
    }

    #[test]
    fn test_subscription_error_tagged() {
        let err: SubscriptionError = DecodeError::new("users/u1", "bad").into();
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "decode");
        assert_eq!(json["resourcePath"], "users/u1");
    }
}
