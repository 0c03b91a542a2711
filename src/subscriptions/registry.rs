//! The in-process subscription index.
//!
//! [`Subscriptions`] keeps every registered [`Subscriber`] grouped by channel and
//! mirrors each registration into the store through a [`QueueAdapter`], so that
//! a Broker in another process sees the same channel → destination index.
//!
//! Membership is by identity: two `Arc<Subscriber>` values with the same channel
//! and destination are independent entries.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{debug, info};

use super::Subscriber;
use super::adapter::{AdapterError, QueueAdapter};
use crate::types::DestinationId;

/// Errors that can occur during registration.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The adapter failed; the in-memory index was restored.
    #[error("queue adapter error: {0}")]
    Adapter(#[from] AdapterError),
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Registry of subscribers, indexed by channel.
pub struct Subscriptions {
    adapter: Arc<dyn QueueAdapter>,
    index: Mutex<BTreeMap<String, Vec<Arc<Subscriber>>>>,
}

impl Subscriptions {
    pub fn new(adapter: Arc<dyn QueueAdapter>) -> Self {
        Subscriptions {
            adapter,
            index: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn adapter(&self) -> &Arc<dyn QueueAdapter> {
        &self.adapter
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Vec<Arc<Subscriber>>>> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, subscriber: &Arc<Subscriber>) {
        self.lock()
            .entry(subscriber.channel().to_string())
            .or_default()
            .push(Arc::clone(subscriber));
    }

    /// Removes this exact subscriber; returns whether it was present.
    fn remove(&self, subscriber: &Arc<Subscriber>) -> bool {
        let mut index = self.lock();
        let Some(entries) = index.get_mut(subscriber.channel()) else {
            return false;
        };
        let Some(pos) = entries.iter().position(|s| Arc::ptr_eq(s, subscriber)) else {
            return false;
        };
        entries.remove(pos);
        if entries.is_empty() {
            index.remove(subscriber.channel());
        }
        true
    }

    /// Adds `subscriber` to the index and binds it through the adapter.
    ///
    /// # Errors
    ///
    /// Returns the adapter's error if binding fails; the subscriber is then no
    /// longer in the index.
    pub async fn register(&self, subscriber: Arc<Subscriber>) -> Result<DestinationId> {
        self.insert(&subscriber);

        match self.adapter.bind(&subscriber).await {
            Ok(id) => {
                info!(
                    channel = %subscriber.channel(),
                    destination = %id,
                    worker = subscriber.worker().name(),
                    "Registered subscriber"
                );
                Ok(id)
            }
            Err(e) => {
                self.remove(&subscriber);
                Err(e.into())
            }
        }
    }

    /// Removes this exact subscriber from the index and unbinds it.
    ///
    /// Returns `false` without calling the adapter if it was not registered.
    ///
    /// The persisted index holds one identifier per destination, not one per
    /// subscriber. If another registered subscriber resolves to the same
    /// identifier (same channel, destination and worker name), it stays in this
    /// registry but its entry in the store is removed too, and the Broker stops
    /// delivering to it until it is registered again.
    ///
    /// # Errors
    ///
    /// Returns the adapter's error if unbinding fails; the subscriber is then
    /// back in the index.
    pub async fn unregister(&self, subscriber: &Arc<Subscriber>) -> Result<bool> {
        if !self.remove(subscriber) {
            debug!(subscriber = %subscriber, "Unregister of unknown subscriber ignored");
            return Ok(false);
        }

        if let Err(e) = self.adapter.unbind(subscriber).await {
            self.insert(subscriber);
            return Err(e.into());
        }

        info!(subscriber = %subscriber, "Unregistered subscriber");
        Ok(true)
    }

    /// All registered subscribers on `channel` with queue `destination`.
    pub fn find(&self, channel: &str, destination: &str) -> Vec<Arc<Subscriber>> {
        self.lock()
            .get(channel)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|s| s.destination() == destination)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether this exact subscriber instance is registered.
    pub fn is_subscribed(&self, subscriber: &Arc<Subscriber>) -> bool {
        self.lock()
            .get(subscriber.channel())
            .is_some_and(|entries| entries.iter().any(|s| Arc::ptr_eq(s, subscriber)))
    }

    /// Every registered subscriber, by channel then registration order.
    pub fn subscribers(&self) -> Vec<Arc<Subscriber>> {
        self.lock().values().flatten().cloned().collect()
    }

    pub fn channels(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LocalStore, Store};
    use crate::subscriptions::{Backend, NamedWorker, StoreQueueAdapter};
    use crate::test_utils::RecordingAdapter;

    fn subscriber(channel: &str, destination: &str, worker: &str) -> Arc<Subscriber> {
        Arc::new(Subscriber::new(channel, destination, NamedWorker::arc(worker)))
    }

    fn registry() -> Subscriptions {
        Subscriptions::new(Arc::new(RecordingAdapter::default()))
    }

    #[tokio::test]
    async fn find_by_channel_and_destination() {
        let subscriptions = registry();
        let first = subscriber("ch1", "foo", "WorkerA");
        let second = subscriber("ch1", "bar", "WorkerB");
        let third = subscriber("ch2", "foo", "WorkerC");

        subscriptions.register(Arc::clone(&first)).await.unwrap();
        subscriptions.register(Arc::clone(&second)).await.unwrap();
        subscriptions.register(Arc::clone(&third)).await.unwrap();

        let found = subscriptions.find("ch1", "foo");
        assert_eq!(found.len(), 1);
        assert!(Arc::ptr_eq(&found[0], &first));

        let found = subscriptions.find("ch1", "bar");
        assert_eq!(found.len(), 1);
        assert!(Arc::ptr_eq(&found[0], &second));

        assert!(subscriptions.unregister(&first).await.unwrap());
        assert!(subscriptions.find("ch1", "foo").is_empty());
        assert_eq!(subscriptions.find("ch2", "foo").len(), 1);
    }

    #[tokio::test]
    async fn equal_subscribers_are_independent_entries() {
        let subscriptions = registry();
        let a = subscriber("ch1", "foo", "WorkerA");
        let b = subscriber("ch1", "bar", "WorkerB");
        let c = subscriber("ch2", "foo", "WorkerC");
        let d = subscriber("ch1", "foo", "WorkerD");

        for s in [&a, &b, &c, &d] {
            subscriptions.register(Arc::clone(s)).await.unwrap();
        }

        let found = subscriptions.find("ch1", "foo");
        assert_eq!(found.len(), 2);
        assert!(Arc::ptr_eq(&found[0], &a));
        assert!(Arc::ptr_eq(&found[1], &d));
        assert_eq!(subscriptions.len(), 4);

        subscriptions.unregister(&a).await.unwrap();
        let found = subscriptions.find("ch1", "foo");
        assert_eq!(found.len(), 1);
        assert!(Arc::ptr_eq(&found[0], &d));
    }

    #[tokio::test]
    async fn subscribed_is_an_identity_check() {
        let subscriptions = registry();
        let a = subscriber("ch1", "foo", "WorkerA");
        let b = subscriber("ch1", "foo", "WorkerA");
        assert_eq!(*a, *b);

        subscriptions.register(Arc::clone(&b)).await.unwrap();

        assert!(!subscriptions.is_subscribed(&a));
        assert!(subscriptions.is_subscribed(&b));
    }

    #[tokio::test]
    async fn unregister_of_unknown_subscriber_skips_adapter() {
        let adapter = Arc::new(RecordingAdapter::default());
        let subscriptions = Subscriptions::new(adapter.clone());
        let registered = subscriber("ch1", "foo", "WorkerA");
        let stranger = subscriber("ch1", "foo", "WorkerA");
        subscriptions.register(Arc::clone(&registered)).await.unwrap();

        assert!(!subscriptions.unregister(&stranger).await.unwrap());

        assert_eq!(adapter.unbound(), 0);
        assert!(subscriptions.is_subscribed(&registered));
    }

    #[tokio::test]
    async fn failed_bind_rolls_back_registration() {
        let adapter = Arc::new(RecordingAdapter::default());
        adapter.fail_bind(true);
        let subscriptions = Subscriptions::new(adapter.clone());
        let s = subscriber("ch1", "foo", "WorkerA");

        let err = subscriptions.register(Arc::clone(&s)).await.unwrap_err();

        assert!(matches!(err, RegistryError::Adapter(_)));
        assert!(!subscriptions.is_subscribed(&s));
        assert!(subscriptions.is_empty());
        assert!(subscriptions.channels().is_empty());
    }

    #[tokio::test]
    async fn failed_unbind_keeps_registration() {
        let adapter = Arc::new(RecordingAdapter::default());
        let subscriptions = Subscriptions::new(adapter.clone());
        let s = subscriber("ch1", "foo", "WorkerA");
        subscriptions.register(Arc::clone(&s)).await.unwrap();

        adapter.fail_unbind(true);
        assert!(subscriptions.unregister(&s).await.is_err());
        assert!(subscriptions.is_subscribed(&s));

        adapter.fail_unbind(false);
        assert!(subscriptions.unregister(&s).await.unwrap());
        assert!(!subscriptions.is_subscribed(&s));
        assert_eq!(adapter.unbound(), 1);
    }

    #[tokio::test]
    async fn registration_reaches_the_store() {
        let store = LocalStore::in_memory();
        let adapter = StoreQueueAdapter::new(
            Arc::new(store.clone()),
            Some(Backend::Resque { namespace: None }),
        );
        let subscriptions = Subscriptions::new(Arc::new(adapter));
        let s = subscriber("ch1", "foo", "FakeWorker");

        let id = subscriptions.register(Arc::clone(&s)).await.unwrap();
        assert_eq!(
            store.smembers("subscriptions:ch1").await.unwrap(),
            vec![id.to_string()]
        );

        subscriptions.unregister(&s).await.unwrap();
        assert!(store.smembers("subscriptions:ch1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unregister_drops_identifier_shared_with_remaining_subscriber() {
        let store = LocalStore::in_memory();
        let adapter = StoreQueueAdapter::new(
            Arc::new(store.clone()),
            Some(Backend::Sidekiq { namespace: None }),
        );
        let subscriptions = Subscriptions::new(Arc::new(adapter));
        let first = subscriber("ch1", "foo", "FakeWorker");
        let second = subscriber("ch1", "foo", "FakeWorker");

        let first_id = subscriptions.register(Arc::clone(&first)).await.unwrap();
        let second_id = subscriptions.register(Arc::clone(&second)).await.unwrap();
        assert_eq!(first_id, second_id);
        assert_eq!(store.smembers("subscriptions:ch1").await.unwrap().len(), 1);

        assert!(subscriptions.unregister(&first).await.unwrap());

        assert!(subscriptions.is_subscribed(&second));
        assert!(store.smembers("subscriptions:ch1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unconfigured_backend_leaves_registry_empty() {
        let store = LocalStore::in_memory();
        let adapter = StoreQueueAdapter::new(Arc::new(store.clone()), None);
        let subscriptions = Subscriptions::new(Arc::new(adapter));

        let err = subscriptions
            .register(subscriber("ch1", "foo", "FakeWorker"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RegistryError::Adapter(AdapterError::Configuration(_))
        ));
        assert!(subscriptions.is_empty());
        assert_eq!(store.keyspace().await.key_count(), 0);
    }
}
