//! # Store Errors
//!
//! Error types for locators and backend calls.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Classification carried by every backend failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendErrorCode {
    /// Security rules rejected the request
    PermissionDenied,
    /// Backend could not be reached
    Unavailable,
    /// Target document does not exist (writes only)
    NotFound,
    /// Anything else the backend reports
    Internal,
}

impl BackendErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendErrorCode::PermissionDenied => "permission-denied",
            BackendErrorCode::Unavailable => "unavailable",
            BackendErrorCode::NotFound => "not-found",
            BackendErrorCode::Internal => "internal",
        }
    }
}

impl fmt::Display for BackendErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a backend to a listener or a write
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct BackendError {
    pub code: BackendErrorCode,
    pub message: String,
}

impl BackendError {
    pub fn new(code: BackendErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(BackendErrorCode::PermissionDenied, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(BackendErrorCode::Unavailable, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(BackendErrorCode::NotFound, message)
    }

    /// Whether retrying later could succeed
    pub fn is_transient(&self) -> bool {
        self.code == BackendErrorCode::Unavailable
    }
}

/// Store errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Path has empty segments or the wrong segment parity
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// Backend call failed
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl StoreError {
    pub(crate) fn invalid_path(path: &str, reason: impl Into<String>) -> Self {
        StoreError::InvalidPath {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}
