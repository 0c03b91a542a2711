//! Newtype wrappers for relay identifiers.
//!
//! These types keep destination identifiers (opaque, backend-namespaced list
//! keys) from being mixed up with plain queue names or channel names.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A destination identifier: the store list key a subscriber's events land in.
///
/// Computed by a [`QueueAdapter`](crate::subscriptions::QueueAdapter) under the
/// active backend's namespacing convention. The broker and the registry never
/// parse or build these; they only move them around.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DestinationId(pub String);

impl DestinationId {
    pub fn new(s: impl Into<String>) -> Self {
        DestinationId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DestinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DestinationId {
    fn from(s: String) -> Self {
        DestinationId(s)
    }
}

impl From<&str> for DestinationId {
    fn from(s: &str) -> Self {
        DestinationId(s.to_string())
    }
}

/// Key of the persisted set holding every destination bound to `channel`.
///
/// Written by queue adapters at subscribe time, read by the broker at fan-out time.
pub fn subscriptions_key(channel: &str) -> String {
    format!("subscriptions:{channel}")
}
