// Rescue - declarative error rescue for background jobs
//
// A job type lists the errors it can recover from. When one of them is
// raised, the job goes back on the queue after a delay instead of failing,
// until the error group's budget is spent.

// Re-export the rescue engine
pub use rescue_core::*;

// Member crates
pub use rescue_core;
pub use rescue_log;
pub use rescue_queue;

// Host job surface
pub use rescue_queue::{
    Job, JobError, JobMiddleware, JobOutcome, JobRun, JobSource, JobSubmitter, MemoryQueue,
    QueueError, QueueResult, RedisQueue, RedisQueueConfig, Worker, WorkerConfig,
};

// Logging
pub use rescue_log::{Level, LogSink, Logger, MemorySink};

/// Prelude for common imports.
///
/// ```
/// use rescue::prelude::*;
///
/// #[derive(Debug, thiserror::Error)]
/// #[error("network down")]
/// struct NetworkError;
///
/// let mut types = JobTypes::new(RescueConfig::default());
/// types.define("fetch", |rules| {
///     rules.register(errors![NetworkError], RescueOptions::new().delay(10.0).limit(3))?;
///     Ok(())
/// })?;
/// # Ok::<(), RescueError>(())
/// ```
pub mod prelude {
    pub use rescue_core::prelude::*;
    pub use rescue_log::{Level, Logger};
    pub use rescue_queue::prelude::*;
}
