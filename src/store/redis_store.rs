//! [`Store`] on a Redis server: the transport shared across processes.
//!
//! | Store primitive  | Redis                                  |
//! |------------------|----------------------------------------|
//! | `lpush`/`rpush`  | `LPUSH` / `RPUSH`                      |
//! | `rpop`           | `RPOP`                                 |
//! | `last`           | `LRANGE key -1 -1`                     |
//! | `range` / `len`  | `LRANGE key 0 -1` / `LLEN`             |
//! | `blocking_move`  | `BRPOPLPUSH src dst timeout`           |
//! | `sadd`/`srem`    | `SADD` / `SREM`                        |
//! | `smembers`       | `SMEMBERS` (sorted client-side)        |
//! | `exec`           | one Lua script                         |
//!
//! `exec` runs as a script rather than `MULTI`/`EXEC`: Redis does not roll a
//! transaction back when one of its commands fails at runtime (a push onto a
//! set, say), so the script checks every key's type first and only then
//! applies the batch. Scripts run atomically on the server.
//!
//! Connections are multiplexed and opened lazily on first use. Clones share a
//! connection; [`Store::dedicated`] opens a separate one, so a Broker parked in
//! `BRPOPLPUSH` never holds up other callers.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, Script};
use tokio::sync::OnceCell;
use tracing::debug;

use super::{ListOp, Result, Store, Transaction};

/// Applies a [`Transaction`]: `KEYS[i]` with `ARGV[2i-1]` (op) and `ARGV[2i]`
/// (value). Fails with `WRONGTYPE` before any write if a key is not a list.
const APPLY_TRANSACTION: &str = r"
for _, key in ipairs(KEYS) do
  local kind = redis.call('TYPE', key).ok
  if kind ~= 'none' and kind ~= 'list' then
    return redis.error_reply('WRONGTYPE operation against key ' .. key .. ' holding a ' .. kind)
  end
end
for i, key in ipairs(KEYS) do
  local op = ARGV[2 * i - 1]
  if op == 'rpush' then
    redis.call('RPUSH', key, ARGV[2 * i])
  elseif op == 'lpush' then
    redis.call('LPUSH', key, ARGV[2 * i])
  else
    redis.call('RPOP', key)
  end
end
return #KEYS
";

static APPLY_SCRIPT: LazyLock<Script> = LazyLock::new(|| Script::new(APPLY_TRANSACTION));

/// A connection to a Redis server.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    conn: Arc<OnceCell<MultiplexedConnection>>,
}

impl RedisStore {
    /// Prepares a store for `url` (e.g. `redis://127.0.0.1:6379/0`).
    ///
    /// No connection is made until the first command.
    ///
    /// # Errors
    ///
    /// Returns an error if `url` is not a valid Redis URL.
    pub fn open(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        Ok(Self::with_client(client))
    }

    fn with_client(client: Client) -> Self {
        RedisStore {
            client,
            conn: Arc::new(OnceCell::new()),
        }
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                let conn = self.client.get_multiplexed_async_connection().await?;
                debug!(server = ?self.client.get_connection_info().addr, "Connected to Redis");
                Ok::<_, redis::RedisError>(conn)
            })
            .await?;
        Ok(conn.clone())
    }
}

/// Encodes a batch as script keys and arguments.
fn script_args(tx: &Transaction) -> (Vec<&str>, Vec<&str>) {
    let mut keys = Vec::with_capacity(tx.len());
    let mut args = Vec::with_capacity(tx.len() * 2);
    for op in tx.ops() {
        keys.push(op.key());
        match op {
            ListOp::RPush { value, .. } => args.extend(["rpush", value.as_str()]),
            ListOp::LPush { value, .. } => args.extend(["lpush", value.as_str()]),
            ListOp::RPop { .. } => args.extend(["rpop", ""]),
        }
    }
    (keys, args)
}

#[async_trait]
impl Store for RedisStore {
    fn dedicated(&self) -> Result<Arc<dyn Store>> {
        Ok(Arc::new(Self::with_client(self.client.clone())))
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<usize> {
        let mut conn = self.connection().await?;
        let len: usize = conn.lpush(key, value).await?;
        Ok(len)
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<usize> {
        let mut conn = self.connection().await?;
        let len: usize = conn.rpush(key, value).await?;
        Ok(len)
    }

    async fn rpop(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.rpop(key, None).await?;
        Ok(value)
    }

    async fn last(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        let tail: Vec<String> = conn.lrange(key, -1, -1).await?;
        Ok(tail.into_iter().next())
    }

    async fn range(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.connection().await?;
        let values: Vec<String> = conn.lrange(key, 0, -1).await?;
        Ok(values)
    }

    async fn len(&self, key: &str) -> Result<usize> {
        let mut conn = self.connection().await?;
        let len: usize = conn.llen(key).await?;
        Ok(len)
    }

    async fn blocking_move(
        &self,
        src: &str,
        dst: &str,
        timeout: Duration,
    ) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        // A zero timeout means "block forever" to Redis.
        let moved: Option<String> = if timeout.is_zero() {
            redis::cmd("RPOPLPUSH")
                .arg(src)
                .arg(dst)
                .query_async(&mut conn)
                .await?
        } else {
            redis::cmd("BRPOPLPUSH")
                .arg(src)
                .arg(dst)
                .arg(timeout.as_secs_f64())
                .query_async(&mut conn)
                .await?
        };
        Ok(moved)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.connection().await?;
        let added: usize = conn.sadd(key, member).await?;
        Ok(added > 0)
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.connection().await?;
        let removed: usize = conn.srem(key, member).await?;
        Ok(removed > 0)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.connection().await?;
        let mut members: Vec<String> = conn.smembers(key).await?;
        members.sort();
        Ok(members)
    }

    async fn exec(&self, tx: Transaction) -> Result<()> {
        if tx.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection().await?;
        let (keys, args) = script_args(&tx);
        let mut invocation = APPLY_SCRIPT.prepare_invoke();
        for key in keys {
            invocation.key(key);
        }
        for arg in args {
            invocation.arg(arg);
        }
        let _applied: usize = invocation.invoke_async(&mut conn).await?;
        Ok(())
    }
}
