//! Subscribe side of the relay.
//!
//! - [`Subscriber`]: one (channel, destination queue, worker) triple.
//! - [`QueueAdapter`]: persists the channel → destination index the Broker reads.
//! - [`Subscriptions`]: the in-process registry, kept in step with the adapter.
//! - [`SubscriptionBuilder`]: `on(channel, worker)` convenience on top.

pub mod adapter;
pub mod builder;
pub mod registry;
pub mod subscriber;
pub mod worker;

pub use adapter::{AdapterError, Backend, QueueAdapter, StoreQueueAdapter};
pub use builder::{SubscribeError, SubscribeOptions, SubscriptionBuilder};
pub use registry::{RegistryError, Subscriptions};
pub use subscriber::Subscriber;
pub use worker::{JobError, NamedWorker, Worker, WorkerFn, WorkerRef, worker_name};
