//! Publish side: serialize an envelope and push it onto the inbox.
//!
//! Publishers push on the left and the Broker moves from the right, so the
//! inbox is consumed in publish order.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::config::RelayConfig;
use crate::store::{Store, StoreError};
use crate::types::{Envelope, EnvelopeError};

/// Errors that can occur while publishing.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("invalid event: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for publish operations.
pub type Result<T> = std::result::Result<T, PublishError>;

/// Pushes events onto one inbox.
#[derive(Clone)]
pub struct Publisher {
    store: Arc<dyn Store>,
    inbox: String,
    channel: String,
}

impl Publisher {
    pub fn new(
        store: Arc<dyn Store>,
        inbox: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        Publisher {
            store,
            inbox: inbox.into(),
            channel: channel.into(),
        }
    }

    /// Publisher on the configured inbox and default channel.
    pub fn from_config(store: Arc<dyn Store>, config: &RelayConfig) -> Self {
        Self::new(store, config.inbox.clone(), config.channel.clone())
    }

    pub fn inbox(&self) -> &str {
        &self.inbox
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Publishes `event` on the default channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the event name is empty or the push fails.
    pub async fn publish(&self, event: &str, data: Vec<serde_json::Value>) -> Result<Envelope> {
        self.publish_to(&self.channel, event, data).await
    }

    /// Publishes `event` on `channel`; returns the envelope that was pushed.
    ///
    /// # Errors
    ///
    /// Returns an error if `channel` or `event` is empty or the push fails.
    pub async fn publish_to(
        &self,
        channel: &str,
        event: &str,
        data: Vec<serde_json::Value>,
    ) -> Result<Envelope> {
        let envelope = Envelope::new(channel, event, data);
        let payload = envelope.to_payload()?;
        let depth = self.store.lpush(&self.inbox, &payload).await?;
        debug!(
            inbox = %self.inbox,
            event = %envelope.qualified_name(),
            depth,
            "Published event"
        );
        Ok(envelope)
    }
}
