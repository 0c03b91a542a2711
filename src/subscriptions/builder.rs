//! Subscribe-side convenience: `on(channel, worker)` builds, registers and
//! returns a [`Subscriber`].

use std::sync::Arc;

use thiserror::Error;

use super::Subscriber;
use super::registry::{RegistryError, Subscriptions};
use super::worker::{JobError, WorkerFn, WorkerRef};
use crate::types::Envelope;

/// Errors that can occur while subscribing.
#[derive(Debug, Error)]
pub enum SubscribeError {
    /// Neither the options nor the worker name a queue.
    #[error("no queue for worker `{worker}` on channel `{channel}`")]
    MissingQueue { channel: String, worker: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Result type for subscribe operations.
pub type Result<T> = std::result::Result<T, SubscribeError>;

/// Per-subscription options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Destination queue; defaults to the worker's own queue.
    pub queue: Option<String>,

    /// Prepended as `"<prefix>:<queue>"`.
    pub queue_name_prefix: Option<String>,
}

impl SubscribeOptions {
    pub fn queue(queue: impl Into<String>) -> Self {
        SubscribeOptions {
            queue: Some(queue.into()),
            queue_name_prefix: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.queue_name_prefix = Some(prefix.into());
        self
    }
}

/// Registers subscribers on a shared [`Subscriptions`] registry.
#[derive(Clone)]
pub struct SubscriptionBuilder {
    subscriptions: Arc<Subscriptions>,
}

impl SubscriptionBuilder {
    pub fn new(subscriptions: Arc<Subscriptions>) -> Self {
        SubscriptionBuilder { subscriptions }
    }

    pub fn subscriptions(&self) -> &Arc<Subscriptions> {
        &self.subscriptions
    }

    /// Subscribes `worker` to `channel`.
    ///
    /// # Errors
    ///
    /// Returns `MissingQueue` when no queue can be determined, or the registry's
    /// error if binding fails.
    pub async fn on(
        &self,
        channel: &str,
        worker: WorkerRef,
        options: &SubscribeOptions,
    ) -> Result<Arc<Subscriber>> {
        let queue = full_queue_name(worker.queue(), options).ok_or_else(|| {
            SubscribeError::MissingQueue {
                channel: channel.to_string(),
                worker: worker.name().to_string(),
            }
        })?;

        let subscriber = Arc::new(Subscriber::new(channel, queue, worker));
        self.subscriptions.register(Arc::clone(&subscriber)).await?;
        Ok(subscriber)
    }

    /// Subscribes a closure, wrapped in a [`WorkerFn`] named after the channel.
    ///
    /// # Errors
    ///
    /// Same as [`on`](Self::on).
    pub async fn on_fn<F>(
        &self,
        channel: &str,
        options: &SubscribeOptions,
        f: F,
    ) -> Result<Arc<Subscriber>>
    where
        F: Fn(&Envelope) -> std::result::Result<(), JobError> + Send + Sync + 'static,
    {
        let worker: WorkerRef = Arc::new(WorkerFn::new(channel, f));
        self.on(channel, worker, options).await
    }
}

fn full_queue_name(worker_queue: Option<&str>, options: &SubscribeOptions) -> Option<String> {
    let queue = options.queue.as_deref().or(worker_queue)?;
    Some(match options.queue_name_prefix.as_deref() {
        Some(prefix) => format!("{prefix}:{queue}"),
        None => queue.to_string(),
    })
}
