//! Host job-processor surface for rescue.
//!
//! Provides:
//! - [`Job`]: the serializable job description, including the per-job
//!   rescue counters that travel with it through every requeue
//! - [`JobSubmitter`] / [`JobSource`]: the two sides of a queue backend
//! - [`MemoryQueue`] and [`RedisQueue`] backends
//! - [`Worker`] with a [`JobMiddleware`] chain around every execution
//!
//! ## Job Creation
//!
//! ```
//! use rescue_queue::{Job, JobPriority};
//! use serde_json::json;
//!
//! let job = Job::new("emails", "send_welcome", json!(["user@example.com"]))
//!     .with_priority(JobPriority::High);
//!
//! assert_eq!(job.queue, "emails");
//! assert_eq!(job.job_type, "send_welcome");
//! assert_eq!(job.rescue_counters.get("[NetworkError]"), 0);
//! ```
//!
//! ## Processing
//!
//! ```
//! use rescue_queue::*;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let queue = Arc::new(MemoryQueue::new());
//! queue.submit(Job::new("default", "send_email", json!([]))).await?;
//!
//! let mut worker = Worker::new(queue.clone());
//! worker.register_handler("send_email", |_job| async { Ok(()) });
//!
//! let run = worker.process_next().await?;
//! assert!(matches!(run, Some(JobRun::Completed(_))));
//! # Ok::<(), QueueError>(())
//! # });
//! ```

pub mod error;
pub mod job;
pub mod queue;
pub mod redis_queue;
pub mod worker;

pub use error::{JobError, JobOutcome, QueueError, QueueResult};
pub use job::{Job, JobData, JobId, JobPriority, JobState, RescueCounters};
pub use queue::{JobSource, JobSubmitter, MemoryQueue};
pub use redis_queue::{RedisQueue, RedisQueueConfig};
pub use worker::{
    BoxFuture, JobHandler, JobMiddleware, JobRun, JobTimeout, Next, Worker, WorkerConfig,
    handler_fn,
};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{JobError, JobOutcome, QueueError, QueueResult};
    pub use crate::job::{Job, JobData, JobId, JobPriority, JobState, RescueCounters};
    pub use crate::queue::{JobSource, JobSubmitter, MemoryQueue};
    pub use crate::worker::{JobMiddleware, JobRun, Next, Worker, WorkerConfig};
}
