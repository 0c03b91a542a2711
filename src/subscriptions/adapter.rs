//! Queue adapters: persist the channel → destination index.
//!
//! An adapter turns a [`Subscriber`] into a backend-specific destination
//! identifier and adds it to (or removes it from) the set stored under
//! `subscriptions:<channel>`. The Broker reads that set at fan-out time and
//! treats its members as opaque list names.
//!
//! # Destination identifiers
//!
//! ```text
//! resque/<worker>/<namespace>:queue:<queue>     resque/FakeWorker/resque:queue:queue-name
//! sidekiq/<worker>/<namespace>:queue:<queue>    sidekiq/FakeWorker/queue:queue-name
//! ```
//!
//! The namespace segment is omitted when the backend has none.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use super::Subscriber;
use crate::config::ConfigurationError;
use crate::store::{Store, StoreError};
use crate::types::{DestinationId, subscriptions_key};

/// Errors that can occur while binding or unbinding a subscriber.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// No usable backend. Raised before the store is touched.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for adapter operations.
pub type Result<T> = std::result::Result<T, AdapterError>;

/// Backend-specific persistence of the destination index.
#[async_trait]
pub trait QueueAdapter: Send + Sync + 'static {
    /// Adds the subscriber's destination identifier to its channel's set and
    /// returns it. Binding an equivalent subscriber twice stores one identifier.
    async fn bind(&self, subscriber: &Subscriber) -> Result<DestinationId>;

    /// Removes the subscriber's destination identifier from its channel's set.
    /// Absent identifiers are not an error.
    async fn unbind(&self, subscriber: &Subscriber) -> Result<()>;
}

/// A namespacing convention, chosen once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Resque { namespace: Option<String> },
    Sidekiq { namespace: Option<String> },
}

impl Backend {
    pub const SUPPORTED: &'static [&'static str] = &["resque", "sidekiq"];

    /// Resolves a backend by name (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` for anything but `resque` or `sidekiq`.
    pub fn from_name(
        name: &str,
        namespace: Option<String>,
    ) -> std::result::Result<Self, ConfigurationError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "resque" => Ok(Backend::Resque { namespace }),
            "sidekiq" => Ok(Backend::Sidekiq { namespace }),
            other => Err(ConfigurationError::new(format!(
                "unsupported worker backend `{other}`; choose one of: {}",
                Self::SUPPORTED.join(", ")
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Resque { .. } => "resque",
            Backend::Sidekiq { .. } => "sidekiq",
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        match self {
            Backend::Resque { namespace } | Backend::Sidekiq { namespace } => namespace.as_deref(),
        }
    }

    /// The identifier `subscriber` resolves to under this backend.
    pub fn destination_id(&self, subscriber: &Subscriber) -> DestinationId {
        let queue = match self.namespace() {
            Some(ns) => format!("{ns}:queue:{}", subscriber.destination()),
            None => format!("queue:{}", subscriber.destination()),
        };
        DestinationId::new(format!(
            "{}/{}/{queue}",
            self.name(),
            subscriber.worker().name()
        ))
    }
}

/// [`QueueAdapter`] writing to a [`Store`] under a configured [`Backend`].
#[derive(Clone)]
pub struct StoreQueueAdapter {
    store: Arc<dyn Store>,
    backend: Option<Backend>,
}

impl StoreQueueAdapter {
    pub fn new(store: Arc<dyn Store>, backend: Option<Backend>) -> Self {
        StoreQueueAdapter { store, backend }
    }

    pub fn backend(&self) -> Option<&Backend> {
        self.backend.as_ref()
    }

    fn require_backend(&self) -> std::result::Result<&Backend, ConfigurationError> {
        self.backend.as_ref().ok_or_else(|| {
            ConfigurationError::new(format!(
                "no worker backend configured; choose one of: {}",
                Backend::SUPPORTED.join(", ")
            ))
        })
    }
}

#[async_trait]
impl QueueAdapter for StoreQueueAdapter {
    async fn bind(&self, subscriber: &Subscriber) -> Result<DestinationId> {
        let id = self.require_backend()?.destination_id(subscriber);
        let key = subscriptions_key(subscriber.channel());
        let added = self.store.sadd(&key, id.as_str()).await?;
        debug!(channel = %subscriber.channel(), destination = %id, added, "Bound subscriber");
        Ok(id)
    }

    async fn unbind(&self, subscriber: &Subscriber) -> Result<()> {
        let id = self.require_backend()?.destination_id(subscriber);
        let key = subscriptions_key(subscriber.channel());
        let removed = self.store.srem(&key, id.as_str()).await?;
        debug!(channel = %subscriber.channel(), destination = %id, removed, "Unbound subscriber");
        Ok(())
    }
}
