//! Redis-backed job queue.
//!
//! The queue is a single named Redis list: the producer appends serialized
//! [`JobDescriptor`]s to the tail (RPUSH) and workers remove them from the
//! head with a blocking pop (BLPOP), preserving FIFO order end-to-end. BLPOP
//! delivers each element to exactly one blocked caller, which is the only
//! cross-worker coordination this system uses: once a descriptor is popped it
//! is gone from Redis, and a worker crash mid-processing loses the job (the
//! durable job record is the observable trace of that).
//!
//! The queue is unbounded; `enqueue` never blocks on consumers and fails only
//! on transport or serialization faults.

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use thiserror::Error;

use crate::job::JobDescriptor;

/// Errors that can occur during queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Failed to connect to Redis.
    #[error("Redis connection failed: {0}")]
    ConnectionFailed(String),

    /// Redis operation failed.
    #[error("Redis operation failed: {0}")]
    Redis(#[from] redis::RedisError),

    /// Failed to serialize or deserialize a job descriptor.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Redis-backed FIFO queue of job descriptors.
pub struct JobQueue {
    /// Redis connection manager (handles reconnection automatically).
    redis: ConnectionManager,
    /// Name of the Redis list holding the queue.
    queue_name: String,
}

impl JobQueue {
    /// Connects to Redis and creates a new job queue.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::ConnectionFailed` if the connection fails.
    pub async fn connect(redis_url: &str, queue_name: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| QueueError::ConnectionFailed(e.to_string()))?;

        let redis = ConnectionManager::new(client)
            .await
            .map_err(|e| QueueError::ConnectionFailed(e.to_string()))?;

        Ok(Self::from_connection(redis, queue_name))
    }

    /// Creates a queue from an existing connection manager.
    ///
    /// Useful when sharing one Redis connection between the queue and the
    /// analysis cache.
    pub fn from_connection(redis: ConnectionManager, queue_name: &str) -> Self {
        Self {
            redis,
            queue_name: queue_name.to_string(),
        }
    }

    /// Appends a descriptor to the tail of the queue.
    ///
    /// Never blocks on consumers; the queue has no capacity limit.
    pub async fn enqueue(&self, job: &JobDescriptor) -> Result<(), QueueError> {
        let serialized = serde_json::to_string(job)?;
        let mut conn = self.redis.clone();
        conn.rpush::<_, _, ()>(&self.queue_name, serialized).await?;
        Ok(())
    }

    /// Removes and returns the head of the queue, blocking until one is
    /// available or `timeout` expires.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(job))` if a descriptor was dequeued
    /// - `Ok(None)` if the timeout expired with the queue empty
    pub async fn dequeue(&self, timeout: Duration) -> Result<Option<JobDescriptor>, QueueError> {
        let mut conn = self.redis.clone();
        let timeout_secs = timeout.as_secs().max(1) as usize;

        // BLPOP returns (list name, element) or nil on timeout.
        let result: Option<(String, String)> = redis::cmd("BLPOP")
            .arg(&self.queue_name)
            .arg(timeout_secs)
            .query_async(&mut conn)
            .await?;

        match result {
            Some((_, data)) => {
                let job: JobDescriptor = serde_json::from_str(&data)?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    /// Returns the number of descriptors waiting in the queue.
    pub async fn len(&self) -> Result<usize, QueueError> {
        let mut conn = self.redis.clone();
        let len: usize = conn.llen(&self.queue_name).await?;
        Ok(len)
    }

    /// Returns whether the queue is empty.
    pub async fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len().await? == 0)
    }

    /// Checks that the Redis transport is alive.
    pub async fn ping(&self) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();
        redis::cmd("PING").query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    /// Returns the queue name.
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }
}
