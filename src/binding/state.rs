//! Observable state of a binding

use serde::Serialize;

use crate::errors::SubscriptionError;

/// Current state of a subscription.
///
/// Only four shapes exist:
///
/// | state   | data            | is_loading | error  |
/// |---------|-----------------|------------|--------|
/// | idle    | None            | false      | None   |
/// | loading | None            | true       | None   |
/// | ready   | Some(v) or None | false      | None   |
/// | failed  | None            | false      | Some   |
///
/// `ready(None)` means the watched document does not exist.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResult<V> {
    data: Option<V>,
    is_loading: bool,
    error: Option<SubscriptionError>,
}

impl<V> SubscriptionResult<V> {
    /// No locator, nothing attached
    pub fn idle() -> Self {
        Self {
            data: None,
            is_loading: false,
            error: None,
        }
    }

    /// Listener attached, first snapshot pending
    pub fn loading() -> Self {
        Self {
            data: None,
            is_loading: true,
            error: None,
        }
    }

    pub fn ready(data: Option<V>) -> Self {
        Self {
            data,
            is_loading: false,
            error: None,
        }
    }

    pub fn failed(error: SubscriptionError) -> Self {
        Self {
            data: None,
            is_loading: false,
            error: Some(error),
        }
    }

    pub fn data(&self) -> Option<&V> {
        self.data.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn error(&self) -> Option<&SubscriptionError> {
        self.error.as_ref()
    }

    pub fn is_idle(&self) -> bool {
        !self.is_loading && self.data.is_none() && self.error.is_none()
    }

    pub fn into_data(self) -> Option<V> {
        self.data
    }
}

impl<V> Default for SubscriptionResult<V> {
    fn default() -> Self {
        Self::idle()
    }
}
