//! Redis-backed queue.
//!
//! Layout under the key prefix:
//!
//! - `job:{jid}` - serialized job, expiring after the retention time
//! - `queue:{name}:pending:{priority}` - ready jobs
//! - `queue:{name}:delayed` - scheduled jobs scored by execution time
//! - `queue:{name}:dead` - jobs that exhausted the host retry budget
//! - `processing` - jobs handed to a worker

use crate::error::{QueueError, QueueResult};
use crate::job::{Job, JobId, JobPriority, JobState};
use crate::queue::{JobSource, JobSubmitter};
use async_trait::async_trait;
use chrono::Utc;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use rescue_log::{debug, info};
use std::time::Duration;

/// Redis queue configuration.
#[derive(Debug, Clone)]
pub struct RedisQueueConfig {
    /// Redis connection URL
    pub redis_url: String,

    /// Key prefix for Redis keys
    pub key_prefix: String,

    /// Queues consumed by [`JobSource::dequeue`], in precedence order
    pub queues: Vec<String>,

    /// Maximum ready jobs per queue (0 = unlimited)
    pub max_size: usize,

    /// Retention time for stored job payloads
    pub retention_time: Duration,
}

impl RedisQueueConfig {
    /// Create a configuration consuming the `default` queue.
    pub fn new(redis_url: impl Into<String>) -> Self {
        Self {
            redis_url: redis_url.into(),
            key_prefix: "rescue".to_string(),
            queues: vec!["default".to_string()],
            max_size: 0,
            retention_time: Duration::from_secs(7 * 86400),
        }
    }

    /// Set the key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the consumed queues, highest precedence first.
    pub fn with_queues<I, S>(mut self, queues: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.queues = queues.into_iter().map(Into::into).collect();
        self
    }

    /// Set the maximum queue size.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Set the payload retention time.
    pub fn with_retention_time(mut self, retention_time: Duration) -> Self {
        self.retention_time = retention_time;
        self
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.key_prefix, suffix)
    }

    fn job_key(&self, id: JobId) -> String {
        self.key(&format!("job:{}", id))
    }

    fn pending_key(&self, queue: &str, priority: JobPriority) -> String {
        self.key(&format!("queue:{}:pending:{}", queue, priority.as_key()))
    }

    fn delayed_key(&self, queue: &str) -> String {
        self.key(&format!("queue:{}:delayed", queue))
    }

    fn dead_key(&self, queue: &str) -> String {
        self.key(&format!("queue:{}:dead", queue))
    }

    fn processing_key(&self) -> String {
        self.key("processing")
    }
}

/// Job queue backed by Redis.
#[derive(Clone)]
pub struct RedisQueue {
    connection: ConnectionManager,
    config: RedisQueueConfig,
}

impl RedisQueue {
    /// Connect with the given configuration.
    pub async fn connect(config: RedisQueueConfig) -> QueueResult<Self> {
        info!("Connecting job queue to {}", config.redis_url);
        debug!(
            "Queue config - prefix: {}, queues: {:?}, max_size: {}",
            config.key_prefix, config.queues, config.max_size
        );

        let client = Client::open(config.redis_url.as_str())
            .map_err(|e| QueueError::Config(e.to_string()))?;
        let connection = ConnectionManager::new(client).await?;

        Ok(Self { connection, config })
    }

    /// Access the configuration.
    pub fn config(&self) -> &RedisQueueConfig {
        &self.config
    }

    /// Fetch a stored job.
    pub async fn get_job(&self, id: JobId) -> QueueResult<Option<Job>> {
        let mut conn = self.connection.clone();
        let raw: Option<String> = conn.get(self.config.job_key(id)).await?;

        raw.map(|json| {
            serde_json::from_str(&json).map_err(|e| QueueError::Deserialization(e.to_string()))
        })
        .transpose()
    }

    /// Number of ready jobs on `queue`.
    pub async fn size(&self, queue: &str) -> QueueResult<usize> {
        let mut conn = self.connection.clone();
        let mut total = 0;
        for priority in JobPriority::DESCENDING {
            let count: usize = conn.zcard(self.config.pending_key(queue, priority)).await?;
            total += count;
        }
        Ok(total)
    }

    async fn save_job(&self, job: &Job) -> QueueResult<()> {
        let mut conn = self.connection.clone();
        let json =
            serde_json::to_string(job).map_err(|e| QueueError::Serialization(e.to_string()))?;
        let _: () = conn
            .set_ex(self.config.job_key(job.id), json, self.config.retention_time.as_secs())
            .await?;
        Ok(())
    }

    async fn push_ready(&self, job: &Job) -> QueueResult<()> {
        let mut conn = self.connection.clone();
        let key = self.config.pending_key(&job.queue, job.priority);
        // Score by creation time so each priority set stays FIFO
        let _: () = conn
            .zadd(key, job.id.to_string(), job.created_at.timestamp_millis())
            .await?;
        Ok(())
    }

    async fn promote_delayed(&self, queue: &str) -> QueueResult<()> {
        let mut conn = self.connection.clone();
        let delayed_key = self.config.delayed_key(queue);
        let now = Utc::now().timestamp_millis();

        let due: Vec<String> = conn.zrangebyscore(&delayed_key, "-inf", now).await?;
        for raw_id in due {
            let removed: usize = conn.zrem(&delayed_key, &raw_id).await?;
            // Another worker already promoted it
            if removed == 0 {
                continue;
            }
            if let Ok(id) = raw_id.parse::<JobId>()
                && let Some(job) = self.get_job(id).await?
            {
                self.push_ready(&job).await?;
            }
        }
        Ok(())
    }

    async fn remove_from_processing(&self, id: JobId) -> QueueResult<()> {
        let mut conn = self.connection.clone();
        let _: () = conn.zrem(self.config.processing_key(), id.to_string()).await?;
        Ok(())
    }

    /// Delete every key under the prefix.
    pub async fn clear(&self) -> QueueResult<()> {
        let mut conn = self.connection.clone();
        let keys: Vec<String> = conn.keys(format!("{}:*", self.config.key_prefix)).await?;
        if !keys.is_empty() {
            let _: () = conn.del(keys).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl JobSubmitter for RedisQueue {
    async fn submit(&self, job: Job) -> QueueResult<JobId> {
        if self.config.max_size > 0 && self.size(&job.queue).await? >= self.config.max_size {
            return Err(QueueError::QueueFull);
        }

        self.save_job(&job).await?;

        match job.scheduled_at {
            Some(at) if !job.is_ready() => {
                let mut conn = self.connection.clone();
                let _: () = conn
                    .zadd(
                        self.config.delayed_key(&job.queue),
                        job.id.to_string(),
                        at.timestamp_millis(),
                    )
                    .await?;
            }
            _ => self.push_ready(&job).await?,
        }

        debug!("Submitted job {} to queue '{}'", job.id, job.queue);
        Ok(job.id)
    }
}

#[async_trait]
impl JobSource for RedisQueue {
    async fn dequeue(&self) -> QueueResult<Option<Job>> {
        let mut conn = self.connection.clone();

        for queue in &self.config.queues {
            self.promote_delayed(queue).await?;

            for priority in JobPriority::DESCENDING {
                // Reply is [member, score]
                let popped: Vec<String> =
                    conn.zpopmin(self.config.pending_key(queue, priority), 1).await?;

                if let Some(raw_id) = popped.first()
                    && let Ok(id) = raw_id.parse::<JobId>()
                    && let Some(mut job) = self.get_job(id).await?
                {
                    job.start_processing();
                    self.save_job(&job).await?;
                    let _: () = conn
                        .zadd(self.config.processing_key(), id.to_string(), Utc::now().timestamp())
                        .await?;
                    return Ok(Some(job));
                }
            }
        }

        Ok(None)
    }

    async fn complete(&self, job: &Job) -> QueueResult<()> {
        // A middleware may have resubmitted the job under the same id while
        // handling it; that newer record, and any run started from it, must
        // survive.
        match self.get_job(job.id).await? {
            Some(stored) if stored.run_id != job.run_id => {
                if stored.state == JobState::Processing {
                    debug!("Job {} already restarted by another run", job.id);
                    return Ok(());
                }
            }
            _ => {
                let mut done = job.clone();
                done.complete();
                self.save_job(&done).await?;
            }
        }
        self.remove_from_processing(job.id).await
    }

    async fn fail(&self, job: &Job, error: String) -> QueueResult<()> {
        let mut failed = job.clone();
        failed.fail(error);

        if failed.state == JobState::Failed {
            let retry_at = Utc::now() + failed.backoff_delay();
            failed.scheduled_at = Some(retry_at);
            self.save_job(&failed).await?;

            let mut conn = self.connection.clone();
            let _: () = conn
                .zadd(
                    self.config.delayed_key(&failed.queue),
                    failed.id.to_string(),
                    retry_at.timestamp_millis(),
                )
                .await?;
        } else {
            self.save_job(&failed).await?;
            let mut conn = self.connection.clone();
            let _: () = conn
                .zadd(
                    self.config.dead_key(&failed.queue),
                    failed.id.to_string(),
                    Utc::now().timestamp(),
                )
                .await?;
        }

        self.remove_from_processing(job.id).await
    }
}
