//! The subscriber value: one (channel, destination queue, worker) triple.

use std::fmt;
use std::hash::{Hash, Hasher};

use super::worker::WorkerRef;

/// An immutable subscription of one worker to one channel.
///
/// Equality and hashing use `(channel, destination)` only; the worker is not
/// part of a subscriber's identity. Registries that need "this exact
/// subscriber" compare `Arc` pointers instead (see
/// [`Subscriptions::is_subscribed`](super::Subscriptions::is_subscribed)).
#[derive(Clone)]
pub struct Subscriber {
    channel: String,
    destination: String,
    worker: WorkerRef,
}

impl Subscriber {
    pub fn new(
        channel: impl Into<String>,
        destination: impl Into<String>,
        worker: WorkerRef,
    ) -> Self {
        Subscriber {
            channel: channel.into(),
            destination: destination.into(),
            worker,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// The destination queue name (before backend namespacing).
    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn worker(&self) -> &WorkerRef {
        &self.worker
    }
}

impl PartialEq for Subscriber {
    fn eq(&self, other: &Self) -> bool {
        self.channel == other.channel && self.destination == other.destination
    }
}

impl Eq for Subscriber {}

impl Hash for Subscriber {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.channel.hash(state);
        self.destination.hash(state);
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("channel", &self.channel)
            .field("destination", &self.destination)
            .field("worker", &self.worker.name())
            .finish()
    }
}

impl fmt::Display for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.channel, self.destination)
    }
}
