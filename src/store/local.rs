//! The in-crate [`Store`] implementation.
//!
//! [`LocalStore`] keeps the keyspace behind an async mutex shared by every
//! connection opened from it. In durable mode each mutation is staged on a copy,
//! written to disk atomically on the blocking pool, and only then made visible;
//! a failed write leaves the in-memory keyspace untouched.
//!
//! Blocking dequeues park on a [`Notify`] that every changing mutation signals,
//! then re-check the source list.
//!
//! The durable file belongs to a single process and is rewritten whole on
//! every change. It suits tests and embedded single-process use; deployments
//! spanning processes use [`RedisStore`](super::RedisStore).

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard, Notify};
use tokio::time::Instant;
use tracing::debug;

use super::snapshot::{load_keyspace_or_empty, save_keyspace_atomic};
use super::{Keyspace, Result, Store, StoreError, Transaction};

struct Shared {
    keyspace: Mutex<Keyspace>,
    changed: Notify,
    snapshot_path: Option<PathBuf>,
}

/// A connection to a process-local keyspace.
///
/// Cloning (or [`Store::dedicated`]) yields another connection to the same keyspace.
#[derive(Clone)]
pub struct LocalStore {
    shared: Arc<Shared>,
}

impl LocalStore {
    /// Creates an empty, purely in-memory store.
    pub fn in_memory() -> Self {
        Self::with_keyspace(Keyspace::new(), None)
    }

    /// Opens a durable store backed by the snapshot at `path`.
    ///
    /// The file is created on the first mutation if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing snapshot can't be read or is incompatible.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let keyspace = load_keyspace_or_empty(path)?;
        debug!(
            path = %path.display(),
            keys = keyspace.key_count(),
            "Opened durable store"
        );
        Ok(Self::with_keyspace(keyspace, Some(path.to_path_buf())))
    }

    fn with_keyspace(keyspace: Keyspace, snapshot_path: Option<PathBuf>) -> Self {
        LocalStore {
            shared: Arc::new(Shared {
                keyspace: Mutex::new(keyspace),
                changed: Notify::new(),
                snapshot_path,
            }),
        }
    }

    /// Returns the snapshot path for a durable store.
    pub fn snapshot_path(&self) -> Option<&Path> {
        self.shared.snapshot_path.as_deref()
    }

    /// Returns a copy of the whole keyspace.
    pub async fn keyspace(&self) -> Keyspace {
        self.lock().await.clone()
    }

    async fn lock(&self) -> MutexGuard<'_, Keyspace> {
        self.shared.keyspace.lock().await
    }

    async fn read<T>(&self, f: impl FnOnce(&Keyspace) -> Result<T>) -> Result<T> {
        f(&*self.lock().await)
    }

    async fn mutate<T>(&self, f: impl FnOnce(&mut Keyspace) -> Result<T>) -> Result<T> {
        let mut keyspace = self.lock().await;
        let revision = keyspace.revision();

        let out = match &self.shared.snapshot_path {
            None => f(&mut keyspace)?,
            Some(path) => {
                let mut staged = keyspace.clone();
                let out = f(&mut staged)?;
                if staged.revision() != revision {
                    *keyspace = persist(path.clone(), staged).await?;
                }
                out
            }
        };

        // No-op writes must not wake waiters, or idle waiters would wake each
        // other forever.
        let changed = keyspace.revision() != revision;
        drop(keyspace);
        if changed {
            self.shared.changed.notify_waiters();
        }
        Ok(out)
    }
}

/// Writes `keyspace` to `path` on the blocking pool and hands it back.
async fn persist(path: PathBuf, keyspace: Keyspace) -> Result<Keyspace> {
    tokio::task::spawn_blocking(move || -> Result<Keyspace> {
        save_keyspace_atomic(&path, &keyspace)?;
        Ok(keyspace)
    })
    .await
    .map_err(|e| StoreError::Io(io::Error::other(e)))?
}

#[async_trait]
impl Store for LocalStore {
    fn dedicated(&self) -> Result<Arc<dyn Store>> {
        Ok(Arc::new(self.clone()))
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<usize> {
        self.mutate(|ks| ks.lpush(key, value)).await
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<usize> {
        self.mutate(|ks| ks.rpush(key, value)).await
    }

    async fn rpop(&self, key: &str) -> Result<Option<String>> {
        self.mutate(|ks| ks.rpop(key)).await
    }

    async fn last(&self, key: &str) -> Result<Option<String>> {
        self.read(|ks| ks.last(key)).await
    }

    async fn range(&self, key: &str) -> Result<Vec<String>> {
        self.read(|ks| ks.range(key)).await
    }

    async fn len(&self, key: &str) -> Result<usize> {
        self.read(|ks| ks.len(key)).await
    }

    async fn blocking_move(
        &self,
        src: &str,
        dst: &str,
        timeout: Duration,
    ) -> Result<Option<String>> {
        let deadline = Instant::now() + timeout;

        loop {
            // Register interest before checking so a push landing between the
            // check and the wait still wakes us.
            let changed = self.shared.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            if let Some(value) = self.mutate(|ks| ks.pop_right_push_left(src, dst)).await? {
                return Ok(Some(value));
            }

            if tokio::time::timeout_at(deadline, changed).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        self.mutate(|ks| ks.sadd(key, member)).await
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool> {
        self.mutate(|ks| ks.srem(key, member)).await
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        self.read(|ks| ks.smembers(key)).await
    }

    async fn exec(&self, tx: Transaction) -> Result<()> {
        self.mutate(|ks| ks.apply(&tx)).await
    }
}
