//! Shared counter store: rate-limit buckets and short-lived cached values.
//!
//! Backed by Redis in production. The connection is opened lazily on first
//! use and every round trip is bounded, so an unreachable server surfaces as
//! an error on the call instead of blocking startup.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{LazyLock, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::CounterStoreConfig;
use crate::error::{CounterStoreError, CounterStoreResult};

/// INCR and EXPIRE in one round trip. The expiry is only set while the key
/// has none, so the window is fixed from the first hit.
///
/// KEYS[1] bucket key, ARGV[1] window seconds. Returns {count, ttl}.
static INCREMENT_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
local current = redis.call('INCR', KEYS[1])
local ttl = redis.call('TTL', KEYS[1])
if ttl < 0 then
  redis.call('EXPIRE', KEYS[1], ARGV[1])
  ttl = tonumber(ARGV[1])
end
return {current, ttl}
"#,
    )
});

/// Key/value store with per-key expiry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment `key`, starting a `window_secs` expiry when the
    /// key has none. Returns the new count and the remaining TTL in seconds.
    async fn increment(&self, key: &str, window_secs: u64) -> CounterStoreResult<(u64, i64)>;

    /// Set every entry with the same TTL in one round trip.
    async fn set_many(&self, entries: &[(String, String)], ttl_secs: u64) -> CounterStoreResult<()>;

    async fn get(&self, key: &str) -> CounterStoreResult<Option<String>>;

    /// Delete keys; returns how many existed.
    async fn delete(&self, keys: &[String]) -> CounterStoreResult<u64>;

    /// Number of `keys` that exist.
    async fn exists(&self, keys: &[String]) -> CounterStoreResult<u64>;

    async fn ping(&self) -> CounterStoreResult<()>;
}

/// Redis-backed counter store.
pub struct RedisCounterStore {
    client: redis::Client,
    conn: OnceCell<MultiplexedConnection>,
    timeout: Duration,
}

impl std::fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCounterStore")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RedisCounterStore {
    /// Only parses the URL; no connection is made until the first call.
    pub fn new(config: &CounterStoreConfig) -> CounterStoreResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            conn: OnceCell::new(),
            timeout: config.timeout,
        })
    }

    /// Shared connection, opened on first use. A failed open is retried on
    /// the next call.
    async fn connection(&self) -> CounterStoreResult<MultiplexedConnection> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                let conn = self.client.get_multiplexed_async_connection().await?;
                info!("Opened counter store connection");
                Ok::<_, CounterStoreError>(conn)
            })
            .await?;
        Ok(conn.clone())
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> CounterStoreResult<T>
    where
        F: Future<Output = CounterStoreResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(operation, error = %e, "Counter store call failed");
                Err(e)
            }
            Err(_) => {
                warn!(operation, "Counter store call timed out");
                Err(CounterStoreError::Timeout {
                    operation,
                    elapsed: self.timeout,
                })
            }
        }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &str, window_secs: u64) -> CounterStoreResult<(u64, i64)> {
        self.bounded("increment", async {
            let mut conn = self.connection().await?;
            let reply: (u64, i64) = INCREMENT_SCRIPT
                .key(key)
                .arg(window_secs)
                .invoke_async(&mut conn)
                .await?;
            Ok(reply)
        })
        .await
    }

    async fn set_many(&self, entries: &[(String, String)], ttl_secs: u64) -> CounterStoreResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        self.bounded("set_many", async {
            let mut conn = self.connection().await?;
            let mut pipe = redis::pipe();
            for (key, value) in entries {
                pipe.set_ex(key, value, ttl_secs).ignore();
            }
            pipe.query_async::<()>(&mut conn).await?;
            Ok(())
        })
        .await
    }

    async fn get(&self, key: &str) -> CounterStoreResult<Option<String>> {
        self.bounded("get", async {
            let mut conn = self.connection().await?;
            Ok(conn.get::<_, Option<String>>(key).await?)
        })
        .await
    }

    async fn delete(&self, keys: &[String]) -> CounterStoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.bounded("delete", async {
            let mut conn = self.connection().await?;
            Ok(conn.del::<_, u64>(keys).await?)
        })
        .await
    }

    async fn exists(&self, keys: &[String]) -> CounterStoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.bounded("exists", async {
            let mut conn = self.connection().await?;
            Ok(conn.exists::<_, u64>(keys).await?)
        })
        .await
    }

    async fn ping(&self) -> CounterStoreResult<()> {
        self.bounded("ping", async {
            let mut conn = self.connection().await?;
            redis::cmd("PING").query_async::<String>(&mut conn).await?;
            Ok(())
        })
        .await
    }
}

#[derive(Debug)]
enum Value {
    Counter(u64),
    Text(String),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Counter store kept in process memory.
///
/// Expiry follows `tokio::time`, so paused-clock tests can step through
/// windows. `set_unreachable(true)` makes every call fail like a dead server.
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    entries: Mutex<HashMap<String, Entry>>,
    unreachable: AtomicBool,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage (or recovery).
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    fn lock(&self) -> CounterStoreResult<MutexGuard<'_, HashMap<String, Entry>>> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(CounterStoreError::Redis(redis::RedisError::from(
                std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "counter store unreachable",
                ),
            )));
        }
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Instant::now();
        entries.retain(|_, entry| entry.is_live(now));
        Ok(entries)
    }
}

fn ttl_secs(expires_at: Option<Instant>, now: Instant) -> i64 {
    match expires_at {
        Some(at) => {
            let remaining = at.saturating_duration_since(now);
            let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
            i64::try_from(secs).unwrap_or(i64::MAX)
        }
        None => -1,
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment(&self, key: &str, window_secs: u64) -> CounterStoreResult<(u64, i64)> {
        let mut entries = self.lock()?;
        let now = Instant::now();
        let entry = entries.entry(key.to_string()).or_insert(Entry {
            value: Value::Counter(0),
            expires_at: None,
        });

        let count = match &mut entry.value {
            Value::Counter(n) => {
                *n += 1;
                *n
            }
            Value::Text(_) => {
                return Err(CounterStoreError::UnexpectedReply(format!(
                    "{key} does not hold a counter"
                )))
            }
        };
        if entry.expires_at.is_none() {
            entry.expires_at = Some(now + Duration::from_secs(window_secs));
        }

        Ok((count, ttl_secs(entry.expires_at, now)))
    }

    async fn set_many(&self, items: &[(String, String)], ttl_secs: u64) -> CounterStoreResult<()> {
        let mut entries = self.lock()?;
        let expires_at = Some(Instant::now() + Duration::from_secs(ttl_secs));
        for (key, value) in items {
            entries.insert(
                key.clone(),
                Entry {
                    value: Value::Text(value.clone()),
                    expires_at,
                },
            );
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> CounterStoreResult<Option<String>> {
        let entries = self.lock()?;
        Ok(entries.get(key).map(|entry| match &entry.value {
            Value::Counter(n) => n.to_string(),
            Value::Text(text) => text.clone(),
        }))
    }

    async fn delete(&self, keys: &[String]) -> CounterStoreResult<u64> {
        let mut entries = self.lock()?;
        Ok(keys.iter().filter(|key| entries.remove(*key).is_some()).count() as u64)
    }

    async fn exists(&self, keys: &[String]) -> CounterStoreResult<u64> {
        let entries = self.lock()?;
        Ok(keys.iter().filter(|key| entries.contains_key(*key)).count() as u64)
    }

    async fn ping(&self) -> CounterStoreResult<()> {
        self.lock().map(|_| ())
    }
}
