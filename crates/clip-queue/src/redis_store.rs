//! Redis-backed job store.
//!
//! Layout per queue, under the hash-tagged base `{<prefix>:<queue>}`:
//! - `:id` counter for generated job ids
//! - `:job:<id>` hash holding the payload and bookkeeping
//! - `:wait` and `:active` lists
//! - `:delayed` zset scored by process-at millis
//! - `:completed` and `:failed` zsets scored by finish millis, trimmed to retention
//!
//! Every transition runs as a Lua script and every round trip is bounded by
//! the configured store timeout. Scripts receive only the base in `KEYS` and
//! derive the per-job keys from it; the hash tag keeps every key of a queue
//! in one cluster slot, so the scripts also run on Redis Cluster.

use std::collections::HashMap;
use std::future::Future;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use clip_models::{BackoffPolicy, JobId, JobPolicy, JobState, QueueName};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisResult, Script};
use tracing::{debug, info, warn};

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::metrics;
use crate::store::{EnqueueOptions, JobCounts, JobStore, StoreConnector, StoredJob};

const RETENTION_TRIM: &str = r#"
local function trim(base, set, keep)
  local excess = redis.call('ZCARD', set) - keep
  if excess > 0 then
    local old = redis.call('ZRANGE', set, 0, excess - 1)
    for _, id in ipairs(old) do
      redis.call('DEL', base .. ':job:' .. id)
    end
    redis.call('ZREMRANGEBYRANK', set, 0, excess - 1)
  end
end
"#;

static ADD_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
local base = KEYS[1]
local id = ARGV[1]
if id == '' then
  id = tostring(redis.call('INCR', base .. ':id'))
elseif redis.call('EXISTS', base .. ':job:' .. id) == 1 then
  return {id, 0}
end
local now = tonumber(ARGV[8])
local delay = tonumber(ARGV[7])
local state = 'waiting'
if delay > 0 then state = 'delayed' end
redis.call('HSET', base .. ':job:' .. id,
  'data', ARGV[2],
  'attempts_allowed', ARGV[3],
  'attempts_made', 0,
  'backoff_type', ARGV[4],
  'backoff_delay', ARGV[5],
  'keep_completed', ARGV[6],
  'keep_failed', ARGV[9],
  'state', state,
  'cancelled', 0,
  'created_at', now,
  'process_at', now + delay)
if delay > 0 then
  redis.call('ZADD', base .. ':delayed', now + delay, id)
else
  redis.call('RPUSH', base .. ':wait', id)
end
return {id, 1}
"#,
    )
});

static REMOVE_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
local base = KEYS[1]
local id = ARGV[1]
local state = redis.call('HGET', base .. ':job:' .. id, 'state')
if not state or state == 'active' then
  return 0
end
redis.call('LREM', base .. ':wait', 0, id)
redis.call('ZREM', base .. ':delayed', id)
redis.call('ZREM', base .. ':completed', id)
redis.call('ZREM', base .. ':failed', id)
redis.call('DEL', base .. ':job:' .. id)
return 1
"#,
    )
});

static MOVE_TO_FAILED_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(&format!(
        r#"{RETENTION_TRIM}
local base = KEYS[1]
local id = ARGV[1]
local key = base .. ':job:' .. id
if redis.call('HGET', key, 'state') ~= 'active' then
  return 0
end
redis.call('LREM', base .. ':active', 0, id)
redis.call('HSET', key, 'state', 'failed', 'failed_reason', ARGV[2], 'cancelled', ARGV[3], 'finished_at', ARGV[4])
redis.call('ZADD', base .. ':failed', ARGV[4], id)
trim(base, base .. ':failed', tonumber(redis.call('HGET', key, 'keep_failed')))
return 1
"#
    ))
});

static CLAIM_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
local base = KEYS[1]
local now = tonumber(ARGV[1])
local due = redis.call('ZRANGEBYSCORE', base .. ':delayed', '-inf', now)
for _, id in ipairs(due) do
  redis.call('ZREM', base .. ':delayed', id)
  redis.call('HSET', base .. ':job:' .. id, 'state', 'waiting')
  redis.call('RPUSH', base .. ':wait', id)
end
local id = redis.call('LPOP', base .. ':wait')
if not id then
  return false
end
redis.call('RPUSH', base .. ':active', id)
redis.call('HSET', base .. ':job:' .. id, 'state', 'active', 'processed_at', now)
return id
"#,
    )
});

static COMPLETE_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(&format!(
        r#"{RETENTION_TRIM}
local base = KEYS[1]
local id = ARGV[1]
local key = base .. ':job:' .. id
if redis.call('HGET', key, 'state') ~= 'active' then
  return 0
end
redis.call('LREM', base .. ':active', 0, id)
redis.call('HINCRBY', key, 'attempts_made', 1)
redis.call('HSET', key, 'state', 'completed', 'finished_at', ARGV[2])
redis.call('ZADD', base .. ':completed', ARGV[2], id)
trim(base, base .. ':completed', tonumber(redis.call('HGET', key, 'keep_completed')))
return 1
"#
    ))
});

static FAIL_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(&format!(
        r#"{RETENTION_TRIM}
local base = KEYS[1]
local id = ARGV[1]
local key = base .. ':job:' .. id
local now = tonumber(ARGV[3])
if redis.call('HGET', key, 'state') ~= 'active' then
  return false
end
redis.call('LREM', base .. ':active', 0, id)
local made = redis.call('HINCRBY', key, 'attempts_made', 1)
redis.call('HSET', key, 'failed_reason', ARGV[2])
local allowed = tonumber(redis.call('HGET', key, 'attempts_allowed'))
if made < allowed then
  local delay = tonumber(redis.call('HGET', key, 'backoff_delay'))
  if redis.call('HGET', key, 'backoff_type') == 'exponential' then
    delay = delay * (2 ^ (made - 1))
  end
  redis.call('HSET', key, 'state', 'delayed', 'process_at', now + delay)
  redis.call('ZADD', base .. ':delayed', now + delay, id)
  return 'delayed'
end
redis.call('HSET', key, 'state', 'failed', 'finished_at', now)
redis.call('ZADD', base .. ':failed', now, id)
trim(base, base .. ':failed', tonumber(redis.call('HGET', key, 'keep_failed')))
return 'failed'
"#
    ))
});

/// Key base of a queue. The braces make it a cluster hash tag.
fn queue_base(prefix: &str, queue: QueueName) -> String {
    format!("{{{}:{}}}", prefix, queue.as_str())
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Job store for one queue backed by a multiplexed Redis connection.
#[derive(Clone)]
pub struct RedisJobStore {
    queue: QueueName,
    base: String,
    conn: MultiplexedConnection,
    timeout: Duration,
}

impl std::fmt::Debug for RedisJobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisJobStore")
            .field("queue", &self.queue)
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

impl RedisJobStore {
    pub fn new(queue: QueueName, prefix: &str, conn: MultiplexedConnection, timeout: Duration) -> Self {
        Self {
            queue,
            base: queue_base(prefix, queue),
            conn,
            timeout,
        }
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.base, suffix)
    }

    fn job_key(&self, id: &str) -> String {
        format!("{}:job:{}", self.base, id)
    }

    /// Run one store round trip under the configured timeout.
    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> QueueResult<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                metrics::record_store_error(self.queue, operation);
                warn!(queue = %self.queue, operation, error = %e, "Queue store call failed");
                Err(QueueError::Redis(e))
            }
            Err(_) => {
                metrics::record_store_error(self.queue, operation);
                warn!(queue = %self.queue, operation, "Queue store call timed out");
                Err(QueueError::Timeout {
                    operation,
                    elapsed: self.timeout,
                })
            }
        }
    }

    async fn ids_in(&self, state: JobState) -> QueueResult<Vec<String>> {
        let mut conn = self.conn.clone();
        match state {
            JobState::Waiting => {
                self.bounded("get_jobs", conn.lrange(self.key("wait"), 0, -1)).await
            }
            JobState::Active => {
                self.bounded("get_jobs", conn.lrange(self.key("active"), 0, -1)).await
            }
            JobState::Delayed => {
                self.bounded("get_jobs", conn.zrange(self.key("delayed"), 0, -1)).await
            }
            JobState::Completed => {
                self.bounded("get_jobs", conn.zrange(self.key("completed"), 0, -1)).await
            }
            JobState::Failed => {
                self.bounded("get_jobs", conn.zrange(self.key("failed"), 0, -1)).await
            }
        }
    }

    fn parse_job(&self, id: &str, fields: HashMap<String, String>) -> QueueResult<Option<StoredJob>> {
        if fields.is_empty() {
            return Ok(None);
        }
        let text = |name: &str| -> QueueResult<&str> {
            fields
                .get(name)
                .map(String::as_str)
                .ok_or_else(|| QueueError::corrupt_job(id, format!("missing field {name}")))
        };
        fn number<N: FromStr>(id: &str, name: &str, raw: &str) -> QueueResult<N> {
            raw.parse()
                .map_err(|_| QueueError::corrupt_job(id, format!("field {name} is not a number")))
        }

        let state = JobState::from_str(text("state")?)
            .map_err(|e| QueueError::corrupt_job(id, e.to_string()))?;
        let backoff_delay: u64 = number(id, "backoff_delay", text("backoff_delay")?)?;
        let backoff = match text("backoff_type")? {
            "fixed" => BackoffPolicy::Fixed {
                delay_ms: backoff_delay,
            },
            _ => BackoffPolicy::Exponential {
                delay_ms: backoff_delay,
            },
        };

        Ok(Some(StoredJob {
            id: JobId::from_string(id),
            queue: self.queue,
            data: serde_json::from_str(text("data")?)?,
            state,
            attempts_allowed: number(id, "attempts_allowed", text("attempts_allowed")?)?,
            attempts_made: number(id, "attempts_made", text("attempts_made")?)?,
            backoff,
            keep_completed: number(id, "keep_completed", text("keep_completed")?)?,
            keep_failed: number(id, "keep_failed", text("keep_failed")?)?,
            failed_reason: fields.get("failed_reason").cloned(),
            cancelled: fields.get("cancelled").is_some_and(|c| c == "1"),
            created_at: number(id, "created_at", text("created_at")?)?,
            process_at: number(id, "process_at", text("process_at")?)?,
        }))
    }
}

fn backoff_fields(backoff: &BackoffPolicy) -> (&'static str, u64) {
    match *backoff {
        BackoffPolicy::Exponential { delay_ms } => ("exponential", delay_ms),
        BackoffPolicy::Fixed { delay_ms } => ("fixed", delay_ms),
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    fn queue(&self) -> QueueName {
        self.queue
    }

    async fn add(
        &self,
        data: &serde_json::Value,
        policy: &JobPolicy,
        options: &EnqueueOptions,
    ) -> QueueResult<JobId> {
        let payload = serde_json::to_string(data)?;
        let (backoff_type, backoff_delay) = backoff_fields(&policy.backoff);
        let custom_id = options.job_id.as_ref().map(JobId::as_str).unwrap_or("");

        let mut conn = self.conn.clone();
        let mut invocation = ADD_SCRIPT.key(&self.base);
        invocation
            .arg(custom_id)
            .arg(&payload)
            .arg(policy.attempts)
            .arg(backoff_type)
            .arg(backoff_delay)
            .arg(policy.keep_completed)
            .arg(options.delay_ms())
            .arg(now_ms())
            .arg(policy.keep_failed);
        let (id, created): (String, i64) =
            self.bounded("add", invocation.invoke_async(&mut conn)).await?;

        if created == 0 {
            debug!(queue = %self.queue, job_id = %id, "Job id already present, not duplicating");
        }
        Ok(JobId::from_string(id))
    }

    async fn get_jobs(&self, states: &[JobState]) -> QueueResult<Vec<StoredJob>> {
        let mut ids = Vec::new();
        for state in states {
            ids.extend(self.ids_in(*state).await?);
        }
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for id in &ids {
            pipe.hgetall(self.job_key(id));
        }
        let mut conn = self.conn.clone();
        let hashes: Vec<HashMap<String, String>> =
            self.bounded("get_jobs", pipe.query_async(&mut conn)).await?;

        let mut jobs = Vec::with_capacity(ids.len());
        for (id, fields) in ids.iter().zip(hashes) {
            // removed between the index read and the hash read
            if let Some(job) = self.parse_job(id, fields)? {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }

    async fn get_job(&self, id: &JobId) -> QueueResult<Option<StoredJob>> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = self
            .bounded("get_job", conn.hgetall(self.job_key(id.as_str())))
            .await?;
        self.parse_job(id.as_str(), fields)
    }

    async fn remove(&self, id: &JobId) -> QueueResult<bool> {
        let mut conn = self.conn.clone();
        let mut invocation = REMOVE_SCRIPT.key(&self.base);
        invocation.arg(id.as_str());
        let removed: i64 = self.bounded("remove", invocation.invoke_async(&mut conn)).await?;
        Ok(removed == 1)
    }

    async fn move_to_failed(&self, id: &JobId, reason: &str, cancelled: bool) -> QueueResult<bool> {
        let mut conn = self.conn.clone();
        let mut invocation = MOVE_TO_FAILED_SCRIPT.key(&self.base);
        invocation
            .arg(id.as_str())
            .arg(reason)
            .arg(u8::from(cancelled))
            .arg(now_ms());
        let moved: i64 = self
            .bounded("move_to_failed", invocation.invoke_async(&mut conn))
            .await?;
        Ok(moved == 1)
    }

    async fn claim_next(&self) -> QueueResult<Option<StoredJob>> {
        let mut conn = self.conn.clone();
        let mut invocation = CLAIM_SCRIPT.key(&self.base);
        invocation.arg(now_ms());
        let claimed: Option<String> = self.bounded("claim", invocation.invoke_async(&mut conn)).await?;

        match claimed {
            Some(id) => self.get_job(&JobId::from_string(id)).await,
            None => Ok(None),
        }
    }

    async fn complete(&self, id: &JobId) -> QueueResult<bool> {
        let mut conn = self.conn.clone();
        let mut invocation = COMPLETE_SCRIPT.key(&self.base);
        invocation.arg(id.as_str()).arg(now_ms());
        let completed: i64 = self.bounded("complete", invocation.invoke_async(&mut conn)).await?;
        Ok(completed == 1)
    }

    async fn fail(&self, id: &JobId, reason: &str) -> QueueResult<Option<JobState>> {
        let mut conn = self.conn.clone();
        let mut invocation = FAIL_SCRIPT.key(&self.base);
        invocation.arg(id.as_str()).arg(reason).arg(now_ms());
        let next: Option<String> = self.bounded("fail", invocation.invoke_async(&mut conn)).await?;

        next.map(|state| {
            JobState::from_str(&state).map_err(|e| QueueError::corrupt_job(id.as_str(), e.to_string()))
        })
        .transpose()
    }

    async fn counts(&self) -> QueueResult<JobCounts> {
        let mut pipe = redis::pipe();
        pipe.llen(self.key("wait"))
            .llen(self.key("active"))
            .zcard(self.key("delayed"))
            .zcard(self.key("completed"))
            .zcard(self.key("failed"));
        let mut conn = self.conn.clone();
        let (waiting, active, delayed, completed, failed): (u64, u64, u64, u64, u64) =
            self.bounded("counts", pipe.query_async(&mut conn)).await?;

        Ok(JobCounts {
            waiting,
            active,
            delayed,
            completed,
            failed,
        })
    }

    async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        self.bounded("ping", redis::cmd("PING").query_async::<String>(&mut conn))
            .await?;
        Ok(())
    }
}

/// Opens one multiplexed Redis connection per queue.
pub struct RedisConnector {
    client: redis::Client,
    config: QueueConfig,
}

impl RedisConnector {
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }
}

#[async_trait]
impl StoreConnector for RedisConnector {
    async fn connect(&self, queue: QueueName) -> QueueResult<Arc<dyn JobStore>> {
        let conn = tokio::time::timeout(
            self.config.store_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| QueueError::Timeout {
            operation: "connect",
            elapsed: self.config.store_timeout,
        })?
        .map_err(|e| QueueError::store_unavailable(e.to_string()))?;

        info!(queue = %queue, prefix = %self.config.prefix, "Opened queue store connection");

        Ok(Arc::new(RedisJobStore::new(
            queue,
            &self.config.prefix,
            conn,
            self.config.store_timeout,
        )))
    }
}
