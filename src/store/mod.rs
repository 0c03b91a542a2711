//! Backing store: the shared key/list/set space the relay uses as transport.
//!
//! The relay needs only a handful of primitives from its store:
//!
//! ```text
//! lists   lpush / rpush / rpop / last / range / len
//! move    blocking_move(src, dst, timeout)   pop right of src, push left of dst
//! sets    sadd / srem / smembers
//! batch   exec(Transaction)                  all-or-nothing list writes
//! ```
//!
//! [`Store`] is the seam. [`RedisStore`] is the shared, networked transport that
//! publishers, subscribers and the Broker use across processes. [`LocalStore`]
//! is a process-local implementation, either purely in memory or durable (every
//! mutation snapshotted atomically to disk).
//!
//! # Connections
//!
//! [`Store::dedicated`] hands out an independent connection to the same
//! keyspace. The broker always takes its own so that its blocking dequeue can
//! never starve an unrelated caller sharing a connection.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod keyspace;
pub mod local;
pub mod redis_store;
pub mod snapshot;

pub use keyspace::{Keyspace, Value};
pub use local::LocalStore;
pub use redis_store::RedisStore;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error while persisting or loading the keyspace.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error reported by a Redis server or its connection.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The key holds a value of the other type.
    #[error("WRONGTYPE operation against key `{key}` holding a {found}")]
    WrongType { key: String, found: &'static str },

    /// Durable snapshot was written by an incompatible version.
    #[error("schema version mismatch: expected {expected}, got {got}")]
    SchemaMismatch { expected: u32, got: u32 },
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// One list write inside a [`Transaction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListOp {
    RPush { key: String, value: String },
    LPush { key: String, value: String },
    RPop { key: String },
}

impl ListOp {
    pub fn key(&self) -> &str {
        match self {
            ListOp::RPush { key, .. } | ListOp::LPush { key, .. } | ListOp::RPop { key } => key,
        }
    }
}

/// An ordered batch of list writes applied all-or-nothing by [`Store::exec`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    ops: Vec<ListOp>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rpush(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ops.push(ListOp::RPush {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn lpush(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ops.push(ListOp::LPush {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn rpop(mut self, key: impl Into<String>) -> Self {
        self.ops.push(ListOp::RPop { key: key.into() });
        self
    }

    pub fn ops(&self) -> &[ListOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// A connection to the shared keyspace.
///
/// Operations on a key holding the other type (list vs. set) fail with
/// [`StoreError::WrongType`]. Missing keys behave as empty lists / empty sets,
/// and keys are dropped once they become empty.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Opens a new, independent connection to the same keyspace.
    fn dedicated(&self) -> Result<Arc<dyn Store>>;

    /// Pushes onto the left (head) of a list; returns the new length.
    async fn lpush(&self, key: &str, value: &str) -> Result<usize>;

    /// Pushes onto the right (tail) of a list; returns the new length.
    async fn rpush(&self, key: &str, value: &str) -> Result<usize>;

    /// Pops from the right (tail) of a list.
    async fn rpop(&self, key: &str) -> Result<Option<String>>;

    /// Returns the rightmost element without removing it.
    async fn last(&self, key: &str) -> Result<Option<String>>;

    /// Returns the whole list, left to right.
    async fn range(&self, key: &str) -> Result<Vec<String>>;

    /// Returns the list length (0 for a missing key).
    async fn len(&self, key: &str) -> Result<usize>;

    /// Atomically pops the rightmost element of `src` and pushes it on the left
    /// of `dst`, waiting up to `timeout` for `src` to become non-empty.
    ///
    /// Returns `None` if nothing arrived before the timeout.
    async fn blocking_move(&self, src: &str, dst: &str, timeout: Duration)
    -> Result<Option<String>>;

    /// Adds a member to a set; returns `true` if it was not already present.
    async fn sadd(&self, key: &str, member: &str) -> Result<bool>;

    /// Removes a member from a set; returns `true` if it was present.
    async fn srem(&self, key: &str, member: &str) -> Result<bool>;

    /// Returns all members of a set in sorted order.
    async fn smembers(&self, key: &str) -> Result<Vec<String>>;

    /// Applies every operation of `tx`, or none of them.
    async fn exec(&self, tx: Transaction) -> Result<()>;
}
