//! Shared test utilities and arbitrary generators for property-based testing.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use proptest::prelude::*;

use crate::broker::BrokerConfig;
use crate::config::ConfigurationError;
use crate::store::{self, LocalStore, Store, Transaction};
use crate::subscriptions::adapter::{self, AdapterError, QueueAdapter};
use crate::subscriptions::Subscriber;
use crate::types::{DestinationId, Envelope};

pub fn arb_channel() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9._-]{0,30}".prop_map(String::from)
}

pub fn arb_json_value() -> impl Strategy<Value = serde_json::Value> {
    let leaf = prop_oneof![
        Just(serde_json::Value::Null),
        any::<bool>().prop_map(serde_json::Value::from),
        any::<i64>().prop_map(serde_json::Value::from),
        "[a-zA-Z0-9 ]{0,20}".prop_map(serde_json::Value::from),
    ];
    leaf.prop_recursive(2, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(serde_json::Value::from),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..4)
                .prop_map(|m| serde_json::Value::Object(m.into_iter().collect())),
        ]
    })
}

pub fn arb_envelope() -> impl Strategy<Value = Envelope> {
    (
        arb_channel(),
        "[a-z][a-z0-9._]{0,20}",
        prop::collection::vec(arb_json_value(), 0..5),
    )
        .prop_map(|(channel, event, data)| Envelope::new(channel, event, data))
}

/// Broker configuration with a short poll so idle iterations finish quickly.
pub fn fast_broker_config() -> BrokerConfig {
    BrokerConfig::new("inbox", Duration::from_millis(50))
}

/// In-memory adapter that counts calls and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingAdapter {
    bound: AtomicUsize,
    unbound: AtomicUsize,
    fail_bind: AtomicBool,
    fail_unbind: AtomicBool,
}

impl RecordingAdapter {
    pub fn fail_bind(&self, fail: bool) {
        self.fail_bind.store(fail, Ordering::SeqCst);
    }

    pub fn fail_unbind(&self, fail: bool) {
        self.fail_unbind.store(fail, Ordering::SeqCst);
    }

    pub fn bound(&self) -> usize {
        self.bound.load(Ordering::SeqCst)
    }

    pub fn unbound(&self) -> usize {
        self.unbound.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueueAdapter for RecordingAdapter {
    async fn bind(&self, subscriber: &Subscriber) -> adapter::Result<DestinationId> {
        if self.fail_bind.load(Ordering::SeqCst) {
            return Err(AdapterError::Configuration(ConfigurationError::new(
                "bind disabled",
            )));
        }
        self.bound.fetch_add(1, Ordering::SeqCst);
        Ok(DestinationId::new(format!(
            "test/{}/queue:{}",
            subscriber.worker().name(),
            subscriber.destination()
        )))
    }

    async fn unbind(&self, _subscriber: &Subscriber) -> adapter::Result<()> {
        if self.fail_unbind.load(Ordering::SeqCst) {
            return Err(AdapterError::Configuration(ConfigurationError::new(
                "unbind disabled",
            )));
        }
        self.unbound.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A [`LocalStore`] whose first `n` blocking moves never complete.
#[derive(Clone)]
pub struct StallingStore {
    inner: LocalStore,
    remaining: Arc<AtomicUsize>,
    stalls: Arc<AtomicUsize>,
}

impl StallingStore {
    pub fn new(inner: LocalStore, n: usize) -> Self {
        StallingStore {
            inner,
            remaining: Arc::new(AtomicUsize::new(n)),
            stalls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn stalls(&self) -> usize {
        self.stalls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Store for StallingStore {
    fn dedicated(&self) -> store::Result<Arc<dyn Store>> {
        Ok(Arc::new(self.clone()))
    }

    async fn lpush(&self, key: &str, value: &str) -> store::Result<usize> {
        self.inner.lpush(key, value).await
    }

    async fn rpush(&self, key: &str, value: &str) -> store::Result<usize> {
        self.inner.rpush(key, value).await
    }

    async fn rpop(&self, key: &str) -> store::Result<Option<String>> {
        self.inner.rpop(key).await
    }

    async fn last(&self, key: &str) -> store::Result<Option<String>> {
        self.inner.last(key).await
    }

    async fn range(&self, key: &str) -> store::Result<Vec<String>> {
        self.inner.range(key).await
    }

    async fn len(&self, key: &str) -> store::Result<usize> {
        self.inner.len(key).await
    }

    async fn blocking_move(
        &self,
        src: &str,
        dst: &str,
        timeout: Duration,
    ) -> store::Result<Option<String>> {
        let stall = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stall {
            self.stalls.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<()>().await;
        }
        self.inner.blocking_move(src, dst, timeout).await
    }

    async fn sadd(&self, key: &str, member: &str) -> store::Result<bool> {
        self.inner.sadd(key, member).await
    }

    async fn srem(&self, key: &str, member: &str) -> store::Result<bool> {
        self.inner.srem(key, member).await
    }

    async fn smembers(&self, key: &str) -> store::Result<Vec<String>> {
        self.inner.smembers(key).await
    }

    async fn exec(&self, tx: Transaction) -> store::Result<()> {
        self.inner.exec(tx).await
    }
}
