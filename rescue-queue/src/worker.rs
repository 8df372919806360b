//! Worker that runs job handlers through a middleware chain.

use crate::error::{JobError, JobOutcome, QueueError, QueueResult};
use crate::job::{Job, JobId};
use crate::queue::JobSource;
use async_trait::async_trait;
use rescue_log::{debug, error, info, warn};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Job handler function type.
pub type JobHandler = Arc<dyn Fn(Job) -> BoxFuture<'static, JobOutcome> + Send + Sync>;

/// Raised inside the chain when a handler exceeds the worker's job timeout.
///
/// It is an ordinary [`JobError`], so middleware can match on it like any
/// other error the handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Job timed out after {after:?}")]
pub struct JobTimeout {
    /// Configured timeout
    pub after: Duration,
}

/// Interception point wrapped around every job execution.
#[async_trait]
pub trait JobMiddleware: Send + Sync {
    /// Run `next` (the rest of the chain and the handler) for `job`.
    ///
    /// Returning `Err` hands the error to the host's generic failure path.
    async fn call(&self, job: &Job, next: Next<'_>) -> JobOutcome;
}

/// The remainder of a middleware chain.
pub struct Next<'a> {
    handler: &'a JobHandler,
    chain: &'a [Arc<dyn JobMiddleware>],
}

impl<'a> Next<'a> {
    /// Chain that runs `chain` in order, then `handler`.
    pub fn new(handler: &'a JobHandler, chain: &'a [Arc<dyn JobMiddleware>]) -> Self {
        Self { handler, chain }
    }

    /// Continue with the next middleware, or the handler when none is left.
    pub async fn run(self, job: &Job) -> JobOutcome {
        match self.chain.split_first() {
            Some((head, rest)) => {
                head.call(
                    job,
                    Next {
                        handler: self.handler,
                        chain: rest,
                    },
                )
                .await
            }
            None => (self.handler)(job.clone()).await,
        }
    }
}

/// Wrap an async closure as a [`JobHandler`].
pub fn handler_fn<F, Fut>(handler: F) -> JobHandler
where
    F: Fn(Job) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = JobOutcome> + Send + 'static,
{
    Arc::new(move |job: Job| -> BoxFuture<'static, JobOutcome> { Box::pin(handler(job)) })
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of concurrent polling tasks
    pub concurrency: usize,

    /// Poll interval when the source is empty
    pub poll_interval: Duration,

    /// Timeout for a single job execution
    pub job_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            poll_interval: Duration::from_secs(1),
            job_timeout: Duration::from_secs(300),
        }
    }
}

/// Result of processing one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobRun {
    /// The chain returned `Ok`; the job was acknowledged
    Completed(JobId),
    /// An error escaped the chain and was reported to the source
    Failed {
        /// Job identifier
        id: JobId,
        /// Rendered error
        error: String,
    },
}

#[derive(Clone)]
struct Pipeline {
    source: Arc<dyn JobSource>,
    handlers: HashMap<String, JobHandler>,
    middleware: Vec<Arc<dyn JobMiddleware>>,
    job_timeout: Duration,
}

impl Pipeline {
    async fn process_next(&self) -> QueueResult<Option<JobRun>> {
        let Some(job) = self.source.dequeue().await? else {
            return Ok(None);
        };

        debug!("Processing job {} (type: {})", job.id, job.job_type);

        let outcome = match self.handlers.get(&job.job_type) {
            Some(handler) => {
                let timed = timed_handler(handler.clone(), self.job_timeout);
                Next::new(&timed, &self.middleware).run(&job).await
            }
            None => Err(JobError::from(QueueError::NoHandler(job.job_type.clone()))),
        };

        match outcome {
            Ok(()) => {
                self.source.complete(&job).await?;
                debug!("Job {} completed", job.id);
                Ok(Some(JobRun::Completed(job.id)))
            }
            Err(err) => {
                let message = err.to_string();
                warn!("Job {} failed: {}", job.id, message);
                self.source.fail(&job, message.clone()).await?;
                Ok(Some(JobRun::Failed {
                    id: job.id,
                    error: message,
                }))
            }
        }
    }
}

fn timed_handler(handler: JobHandler, after: Duration) -> JobHandler {
    Arc::new(move |job: Job| -> BoxFuture<'static, JobOutcome> {
        let handler = handler.clone();
        Box::pin(async move {
            match tokio::time::timeout(after, handler(job)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(JobError::from(JobTimeout { after })),
            }
        })
    })
}

/// Worker pulling jobs from a [`JobSource`].
///
/// Handlers and middleware must be registered before [`Worker::start`];
/// running tasks keep the pipeline they were started with.
pub struct Worker {
    pipeline: Arc<Pipeline>,
    config: WorkerConfig,
    running: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl Worker {
    /// Create a new worker.
    pub fn new(source: Arc<dyn JobSource>) -> Self {
        Self::with_config(source, WorkerConfig::default())
    }

    /// Create a worker with custom configuration.
    pub fn with_config(source: Arc<dyn JobSource>, config: WorkerConfig) -> Self {
        Self {
            pipeline: Arc::new(Pipeline {
                source,
                handlers: HashMap::new(),
                middleware: Vec::new(),
                job_timeout: config.job_timeout,
            }),
            config,
            running: Arc::new(AtomicBool::new(false)),
            handles: Vec::new(),
        }
    }

    /// Register a job handler.
    ///
    /// # Examples
    ///
    /// ```
    /// use rescue_queue::{MemoryQueue, Worker};
    /// use std::sync::Arc;
    ///
    /// let mut worker = Worker::new(Arc::new(MemoryQueue::new()));
    /// worker.register_handler("send_email", |job| async move {
    ///     println!("Sending email: {:?}", job.args);
    ///     Ok(())
    /// });
    /// ```
    pub fn register_handler<F, Fut>(&mut self, job_type: impl Into<String>, handler: F)
    where
        F: Fn(Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobOutcome> + Send + 'static,
    {
        Arc::make_mut(&mut self.pipeline)
            .handlers
            .insert(job_type.into(), handler_fn(handler));
    }

    /// Append a middleware; the first added runs outermost.
    pub fn add_middleware(&mut self, middleware: Arc<dyn JobMiddleware>) {
        Arc::make_mut(&mut self.pipeline).middleware.push(middleware);
    }

    /// Dequeue and process a single job.
    pub async fn process_next(&self) -> QueueResult<Option<JobRun>> {
        self.pipeline.process_next().await
    }

    /// Start the polling tasks.
    pub async fn start(&mut self) -> QueueResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(QueueError::WorkerAlreadyRunning);
        }

        info!("Starting worker with concurrency {}", self.config.concurrency);

        for i in 0..self.config.concurrency {
            let pipeline = self.pipeline.clone();
            let running = self.running.clone();
            let poll_interval = self.config.poll_interval;

            let handle = tokio::spawn(async move {
                while running.load(Ordering::SeqCst) {
                    match pipeline.process_next().await {
                        Ok(Some(_)) => {}
                        Ok(None) => tokio::time::sleep(poll_interval).await,
                        Err(e) => {
                            error!("Worker {} failed to process job: {}", i, e);
                            tokio::time::sleep(poll_interval).await;
                        }
                    }
                }
                debug!("Worker {} stopped", i);
            });

            self.handles.push(handle);
        }

        Ok(())
    }

    /// Stop the polling tasks.
    pub async fn stop(&mut self) -> QueueResult<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(QueueError::WorkerNotRunning);
        }

        info!("Stopping worker");
        for handle in self.handles.drain(..) {
            handle.abort();
        }
        Ok(())
    }

    /// Check if the worker is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("config", &self.config)
            .field("handlers", &self.pipeline.handlers.len())
            .field("middleware", &self.pipeline.middleware.len())
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{JobSubmitter, MemoryQueue};
    use serde_json::json;
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        calls: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl JobMiddleware for Recorder {
        async fn call(&self, job: &Job, next: Next<'_>) -> JobOutcome {
            self.calls.lock().unwrap().push(format!("{}:before", self.name));
            let outcome = next.run(job).await;
            self.calls.lock().unwrap().push(format!("{}:after", self.name));
            outcome
        }
    }

    struct Swallow;

    #[async_trait]
    impl JobMiddleware for Swallow {
        async fn call(&self, job: &Job, next: Next<'_>) -> JobOutcome {
            let _ = next.run(job).await;
            Ok(())
        }
    }

    #[test]
    fn test_worker_config_default() {
        let config = WorkerConfig::default();
        assert_eq!(config.concurrency, 10);
        assert_eq!(config.job_timeout, Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_process_next_completes_job() {
        let queue = Arc::new(MemoryQueue::new());
        queue.submit(Job::new("default", "ok", json!([]))).await.unwrap();

        let mut worker = Worker::new(queue.clone());
        worker.register_handler("ok", |_job| async { Ok(()) });

        let run = worker.process_next().await.unwrap();
        assert!(matches!(run, Some(JobRun::Completed(_))));
        assert_eq!(queue.completed_count().await, 1);
        assert!(worker.process_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_middleware_runs_outermost_first() {
        let queue = Arc::new(MemoryQueue::new());
        queue.submit(Job::new("default", "ok", json!([]))).await.unwrap();

        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut worker = Worker::new(queue.clone());
        worker.add_middleware(Arc::new(Recorder { name: "outer", calls: calls.clone() }));
        worker.add_middleware(Arc::new(Recorder { name: "inner", calls: calls.clone() }));

        let handler_calls = calls.clone();
        worker.register_handler("ok", move |_job| {
            let calls = handler_calls.clone();
            async move {
                calls.lock().unwrap().push("handler".to_string());
                Ok(())
            }
        });

        worker.process_next().await.unwrap();

        assert_eq!(
            *calls.lock().unwrap(),
            vec!["outer:before", "inner:before", "handler", "inner:after", "outer:after"]
        );
    }

    #[tokio::test]
    async fn test_escaping_error_reaches_host_failure_path() {
        let queue = Arc::new(MemoryQueue::new());
        queue
            .submit(Job::new("default", "broken", json!([])).with_max_attempts(1))
            .await
            .unwrap();

        let mut worker = Worker::new(queue.clone());
        worker.register_handler("broken", |_job| async {
            Err(JobError::from("disk on fire"))
        });

        let run = worker.process_next().await.unwrap().unwrap();
        assert!(matches!(run, JobRun::Failed { ref error, .. } if error == "disk on fire"));
        assert_eq!(queue.dead_jobs().await.len(), 1);
    }

    #[tokio::test]
    async fn test_middleware_can_handle_error() {
        let queue = Arc::new(MemoryQueue::new());
        queue.submit(Job::new("default", "broken", json!([]))).await.unwrap();

        let mut worker = Worker::new(queue.clone());
        worker.add_middleware(Arc::new(Swallow));
        worker.register_handler("broken", |_job| async { Err(JobError::from("ignored")) });

        let run = worker.process_next().await.unwrap();
        assert!(matches!(run, Some(JobRun::Completed(_))));
        assert!(queue.dead_jobs().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_handler_fails_job() {
        let queue = Arc::new(MemoryQueue::new());
        queue.submit(Job::new("default", "unknown", json!([]))).await.unwrap();

        let worker = Worker::new(queue.clone());
        let run = worker.process_next().await.unwrap().unwrap();

        assert!(matches!(run, JobRun::Failed { ref error, .. } if error.contains("unknown")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_a_job_error() {
        let queue = Arc::new(MemoryQueue::new());
        queue.submit(Job::new("default", "slow", json!([]))).await.unwrap();

        let config = WorkerConfig {
            job_timeout: Duration::from_secs(1),
            ..WorkerConfig::default()
        };
        let mut worker = Worker::with_config(queue.clone(), config);
        worker.register_handler("slow", |_job| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });

        let run = worker.process_next().await.unwrap().unwrap();
        assert!(matches!(run, JobRun::Failed { ref error, .. } if error.contains("timed out")));
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let mut worker = Worker::with_config(
            Arc::new(MemoryQueue::new()),
            WorkerConfig {
                concurrency: 2,
                poll_interval: Duration::from_millis(10),
                job_timeout: Duration::from_secs(1),
            },
        );

        worker.start().await.unwrap();
        assert!(worker.is_running());
        assert!(matches!(worker.start().await, Err(QueueError::WorkerAlreadyRunning)));

        worker.stop().await.unwrap();
        assert!(!worker.is_running());
        assert!(matches!(worker.stop().await, Err(QueueError::WorkerNotRunning)));
    }
}
