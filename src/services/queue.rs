use async_trait::async_trait;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// A message received from a queue. `handle` acknowledges it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub handle: String,
    pub body: String,
}

/// Named-queue contract with at-least-once delivery: a received message that
/// is not deleted within the visibility timeout becomes receivable again.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn send(&self, queue: &str, body: String) -> Result<(), QueueError>;

    /// Long-poll for a batch of messages. May return an empty batch.
    async fn receive(&self, queue: &str) -> Result<Vec<ReceivedMessage>, QueueError>;

    async fn delete(&self, queue: &str, handle: &str) -> Result<(), QueueError>;

    async fn health_check(&self) -> Result<(), QueueError>;
}

/// Serialize `message` as JSON and send it.
pub async fn send_json<T: Serialize>(
    queue: &dyn MessageQueue,
    name: &str,
    message: &T,
) -> Result<(), QueueError> {
    let body = serde_json::to_string(message)?;
    queue.send(name, body).await
}

/// Wrapper stored in Redis so identical bodies stay distinct in the in-flight set.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    id: Uuid,
    body: String,
}

/// Receive-side tuning for [`RedisQueue`].
#[derive(Debug, Clone)]
pub struct RedisQueueOptions {
    pub batch_size: usize,
    pub wait: Duration,
    pub visibility_timeout: Duration,
}

impl Default for RedisQueueOptions {
    fn default() -> Self {
        Self {
            batch_size: 10,
            wait: Duration::from_secs(20),
            visibility_timeout: Duration::from_secs(300),
        }
    }
}

/// Pops up to `ARGV[1]` messages from the tail of `KEYS[1]` and parks them in
/// the in-flight set `KEYS[2]` with deadline `ARGV[2]`, in one step.
const RECEIVE_SCRIPT: &str = r#"
local items = redis.call('RPOP', KEYS[1], ARGV[1])
if not items then
    return {}
end
for _, item in ipairs(items) do
    redis.call('ZADD', KEYS[2], ARGV[2], item)
end
return items
"#;

/// Moves in-flight entries of `KEYS[1]` scored at or below `ARGV[1]` back to
/// the consuming end of `KEYS[2]`.
const RECLAIM_SCRIPT: &str = r#"
local expired = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
for _, item in ipairs(expired) do
    redis.call('ZREM', KEYS[1], item)
    redis.call('RPUSH', KEYS[2], item)
end
return #expired
"#;

/// Redis-backed queue. Each queue is a list (`LPUSH` in, tail out); received
/// messages are parked in `<queue>:inflight`, a sorted set scored by their
/// visibility deadline, until deleted or reclaimed.
///
/// A message is never only in client memory: the long poll waits without
/// popping, and popping and parking happen in one server-side script, so a
/// receive cancelled at any await leaves every message either waiting or in
/// flight.
pub struct RedisQueue {
    client: redis::Client,
    options: RedisQueueOptions,
    receive_script: redis::Script,
    reclaim_script: redis::Script,
}

impl RedisQueue {
    pub fn new(redis_url: &str, options: RedisQueueOptions) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self {
            client,
            options,
            receive_script: redis::Script::new(RECEIVE_SCRIPT),
            reclaim_script: redis::Script::new(RECLAIM_SCRIPT),
        })
    }

    fn queue_key(queue: &str) -> String {
        format!("classify_jobs:{queue}")
    }

    fn inflight_key(queue: &str) -> String {
        format!("classify_jobs:{queue}:inflight")
    }

    fn now_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    /// Return in-flight messages whose visibility deadline passed to the
    /// consuming end of the queue.
    async fn reclaim_expired(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        queue: &str,
    ) -> Result<usize, QueueError> {
        let reclaimed: usize = self
            .reclaim_script
            .key(Self::inflight_key(queue))
            .key(Self::queue_key(queue))
            .arg(Self::now_millis())
            .invoke_async(conn)
            .await?;

        if reclaimed > 0 {
            tracing::warn!(queue, reclaimed, "Redelivering messages past visibility timeout");
        }
        Ok(reclaimed)
    }

    /// Block until the queue is non-empty or `wait` elapses, without taking
    /// anything off it.
    async fn wait_for_message(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        key: &str,
    ) -> Result<bool, QueueError> {
        let seen: Option<String> = redis::cmd("BLMOVE")
            .arg(key)
            .arg(key)
            .arg("RIGHT")
            .arg("RIGHT")
            .arg(self.options.wait.as_secs_f64())
            .query_async(conn)
            .await?;
        Ok(seen.is_some())
    }

    /// Current number of messages waiting in a queue.
    pub async fn queue_depth(&self, queue: &str) -> Result<u64, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let depth: u64 = conn.llen(Self::queue_key(queue)).await?;
        Ok(depth)
    }

    /// Current number of received but unacknowledged messages.
    pub async fn in_flight_depth(&self, queue: &str) -> Result<u64, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let depth: u64 = conn.zcard(Self::inflight_key(queue)).await?;
        Ok(depth)
    }
}

#[async_trait]
impl MessageQueue for RedisQueue {
    async fn send(&self, queue: &str, body: String) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let envelope = serde_json::to_string(&Envelope {
            id: Uuid::new_v4(),
            body,
        })?;
        conn.lpush::<_, _, ()>(Self::queue_key(queue), envelope)
            .await?;
        Ok(())
    }

    async fn receive(&self, queue: &str) -> Result<Vec<ReceivedMessage>, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        self.reclaim_expired(&mut conn, queue).await?;

        let key = Self::queue_key(queue);
        if !self.wait_for_message(&mut conn, &key).await? {
            return Ok(Vec::new());
        }

        let deadline = Self::now_millis() + self.options.visibility_timeout.as_millis() as i64;
        // Another consumer may win the race to the waiting messages.
        let raw: Vec<String> = self
            .receive_script
            .key(&key)
            .key(Self::inflight_key(queue))
            .arg(self.options.batch_size.max(1))
            .arg(deadline)
            .invoke_async(&mut conn)
            .await?;

        let mut messages = Vec::with_capacity(raw.len());
        for envelope in raw {
            match serde_json::from_str::<Envelope>(&envelope) {
                Ok(parsed) => messages.push(ReceivedMessage {
                    handle: envelope,
                    body: parsed.body,
                }),
                // Foreign payloads pushed without an envelope are passed
                // through as-is so the consumer can decide what to do.
                Err(_) => messages.push(ReceivedMessage {
                    body: envelope.clone(),
                    handle: envelope,
                }),
            }
        }

        Ok(messages)
    }

    async fn delete(&self, queue: &str, handle: &str) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.zrem::<_, _, ()>(Self::inflight_key(queue), handle)
            .await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Queue unavailable: {0}")]
    Unavailable(String),
}
