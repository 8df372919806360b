//! Queue traits and the in-process queue.

use crate::error::{QueueError, QueueResult};
use crate::job::{Job, JobId, JobState};
use async_trait::async_trait;
use chrono::Utc;
use rescue_log::debug;
use tokio::sync::Mutex;

/// Enqueue side of a queue backend.
///
/// A submitted job may carry a future `scheduled_at`; the backend must not
/// hand it out before that time.
#[async_trait]
pub trait JobSubmitter: Send + Sync {
    /// Submit a job for later execution on `job.queue`.
    async fn submit(&self, job: Job) -> QueueResult<JobId>;
}

/// Consumer side of a queue backend.
#[async_trait]
pub trait JobSource: Send + Sync {
    /// Take the next ready job, if any, and mark it as processing.
    async fn dequeue(&self) -> QueueResult<Option<Job>>;

    /// Acknowledge successful execution.
    async fn complete(&self, job: &Job) -> QueueResult<()>;

    /// Report an error that escaped every middleware.
    ///
    /// Applies the host's generic retry: the job is retried with exponential
    /// backoff until `max_attempts`, then moved to the dead set.
    async fn fail(&self, job: &Job, error: String) -> QueueResult<()>;
}

#[derive(Debug, Default)]
struct MemoryState {
    pending: Vec<Job>,
    dead: Vec<Job>,
    completed: usize,
}

/// In-process queue.
///
/// Serves every queue name; ready jobs are handed out by priority, then in
/// submission order.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    state: Mutex<MemoryState>,
    max_size: usize,
}

impl MemoryQueue {
    /// Create an unbounded queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the number of pending jobs (0 = unlimited).
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Pending jobs in submission order, scheduled or not.
    pub async fn jobs(&self) -> Vec<Job> {
        self.state.lock().await.pending.clone()
    }

    /// Pending jobs on one queue.
    pub async fn jobs_in(&self, queue: &str) -> Vec<Job> {
        self.state
            .lock()
            .await
            .pending
            .iter()
            .filter(|job| job.queue == queue)
            .cloned()
            .collect()
    }

    /// Most recently submitted pending job.
    pub async fn last_job(&self) -> Option<Job> {
        self.state.lock().await.pending.last().cloned()
    }

    /// Number of pending jobs.
    pub async fn len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove a pending job regardless of its schedule.
    pub async fn take(&self, id: JobId) -> Option<Job> {
        let mut state = self.state.lock().await;
        let index = state.pending.iter().position(|job| job.id == id)?;
        Some(state.pending.remove(index))
    }

    /// Jobs that exhausted the host retry budget.
    pub async fn dead_jobs(&self) -> Vec<Job> {
        self.state.lock().await.dead.clone()
    }

    /// Number of acknowledged jobs.
    pub async fn completed_count(&self) -> usize {
        self.state.lock().await.completed
    }

    /// Drop everything.
    pub async fn clear(&self) {
        *self.state.lock().await = MemoryState::default();
    }
}

#[async_trait]
impl JobSubmitter for MemoryQueue {
    async fn submit(&self, job: Job) -> QueueResult<JobId> {
        let mut state = self.state.lock().await;
        if self.max_size > 0 && state.pending.len() >= self.max_size {
            return Err(QueueError::QueueFull);
        }

        debug!("Submitting job {} ({}) to queue '{}'", job.id, job.job_type, job.queue);
        let id = job.id;
        state.pending.push(job);
        Ok(id)
    }
}

#[async_trait]
impl JobSource for MemoryQueue {
    async fn dequeue(&self) -> QueueResult<Option<Job>> {
        let mut state = self.state.lock().await;

        let next = state
            .pending
            .iter()
            .enumerate()
            .filter(|(_, job)| job.is_ready())
            // max_by_key keeps the last maximum, so reverse to prefer the oldest
            .rev()
            .max_by_key(|(_, job)| job.priority)
            .map(|(index, _)| index);

        Ok(next.map(|index| {
            let mut job = state.pending.remove(index);
            job.start_processing();
            job
        }))
    }

    async fn complete(&self, job: &Job) -> QueueResult<()> {
        self.state.lock().await.completed += 1;
        debug!("Job {} completed", job.id);
        Ok(())
    }

    async fn fail(&self, job: &Job, error: String) -> QueueResult<()> {
        let mut failed = job.clone();
        failed.fail(error);

        let mut state = self.state.lock().await;
        if failed.state == JobState::Failed {
            failed.scheduled_at = Some(Utc::now() + failed.backoff_delay());
            state.pending.push(failed);
        } else {
            state.dead.push(failed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobPriority;
    use serde_json::json;

    #[tokio::test]
    async fn test_submit_and_inspect() {
        let queue = MemoryQueue::new();
        let job = Job::new("default", "task", json!([]));
        let id = queue.submit(job).await.unwrap();

        assert_eq!(queue.len().await, 1);
        assert_eq!(queue.last_job().await.unwrap().id, id);
    }

    #[tokio::test]
    async fn test_max_size() {
        let queue = MemoryQueue::new().with_max_size(1);
        queue.submit(Job::new("default", "a", json!([]))).await.unwrap();

        let result = queue.submit(Job::new("default", "b", json!([]))).await;
        assert!(matches!(result, Err(QueueError::QueueFull)));
    }

    #[tokio::test]
    async fn test_dequeue_by_priority_then_fifo() {
        let queue = MemoryQueue::new();
        queue.submit(Job::new("default", "first", json!([]))).await.unwrap();
        queue.submit(Job::new("default", "second", json!([]))).await.unwrap();
        queue
            .submit(Job::new("default", "urgent", json!([])).with_priority(JobPriority::High))
            .await
            .unwrap();

        let order: Vec<String> = [
            queue.dequeue().await.unwrap().unwrap(),
            queue.dequeue().await.unwrap().unwrap(),
            queue.dequeue().await.unwrap().unwrap(),
        ]
        .into_iter()
        .map(|job| job.job_type)
        .collect();

        assert_eq!(order, vec!["urgent", "first", "second"]);
        assert!(queue.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dequeue_skips_scheduled_jobs() {
        let queue = MemoryQueue::new();
        let job = Job::new("default", "later", json!([]))
            .schedule_after(chrono::Duration::minutes(5));
        let id = queue.submit(job).await.unwrap();

        assert!(queue.dequeue().await.unwrap().is_none());
        assert_eq!(queue.take(id).await.unwrap().job_type, "later");
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_dequeue_marks_processing() {
        let queue = MemoryQueue::new();
        queue.submit(Job::new("default", "task", json!([]))).await.unwrap();

        let job = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Processing);
        assert_eq!(job.attempts, 1);
    }

    #[tokio::test]
    async fn test_fail_retries_then_buries() {
        let queue = MemoryQueue::new();
        queue
            .submit(Job::new("default", "task", json!([])).with_max_attempts(1))
            .await
            .unwrap();

        let job = queue.dequeue().await.unwrap().unwrap();
        queue.fail(&job, "boom".to_string()).await.unwrap();

        assert!(queue.is_empty().await);
        let dead = queue.dead_jobs().await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_fail_with_budget_left_schedules_retry() {
        let queue = MemoryQueue::new();
        queue.submit(Job::new("default", "task", json!([]))).await.unwrap();

        let job = queue.dequeue().await.unwrap().unwrap();
        queue.fail(&job, "transient".to_string()).await.unwrap();

        let retried = queue.last_job().await.unwrap();
        assert_eq!(retried.state, JobState::Failed);
        assert!(retried.scheduled_at.is_some());
        assert!(queue.dead_jobs().await.is_empty());
    }
}
