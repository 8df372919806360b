//! Per-error rescue rules for background jobs.
//!
//! A job type declares which errors it can recover from and how: after what
//! delay, how many times, with how much jitter, and on which queue. When a
//! job fails with a declared error, the [`Rescuer`] puts a copy of the job
//! back on the queue instead of letting the failure reach the host. Each
//! error group keeps its own attempt counter inside the job itself, so the
//! budget follows the job through every requeue.
//!
//! ## Declaring Rules
//!
//! ```
//! use rescue_core::prelude::*;
//!
//! #[derive(Debug, thiserror::Error)]
//! #[error("network down")]
//! struct NetworkError;
//!
//! #[derive(Debug, thiserror::Error)]
//! #[error("timed out")]
//! struct TimeoutError;
//!
//! let config = RescueConfig::default();
//! let mut rules = RuleRegistry::new(&config);
//! rules.register(errors![NetworkError], RescueOptions::new().delay(10.0).limit(2))?;
//! rules.register(
//!     errors![TimeoutError],
//!     RescueOptions::new().delay(Delay::linear(5.0)).queue("slow"),
//! )?;
//!
//! let found = rules.find_rule_for(&TimeoutError).unwrap();
//! assert_eq!(found.group.key(), "[TimeoutError]");
//! # Ok::<(), RescueError>(())
//! ```
//!
//! ## Running Inside a Worker
//!
//! ```
//! use rescue_core::prelude::*;
//! use rescue_queue::{Job, JobError, JobRun, JobSubmitter, MemoryQueue, Worker};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[derive(Debug, thiserror::Error)]
//! #[error("network down")]
//! struct NetworkError;
//!
//! # tokio_test::block_on(async {
//! let config = RescueConfig::default();
//! let mut types = JobTypes::new(config.clone());
//! types.define("fetch", |rules| {
//!     rules.register(errors![NetworkError], RescueOptions::new().delay(0.0))?;
//!     Ok(())
//! })?;
//!
//! let queue = Arc::new(MemoryQueue::new());
//! let rescuer = Rescuer::new(Arc::new(config), queue.clone());
//!
//! let mut worker = Worker::new(queue.clone());
//! worker.add_middleware(Arc::new(RescueMiddleware::new(rescuer, Arc::new(types))));
//! worker.register_handler("fetch", |_job| async {
//!     Err::<(), JobError>(Box::new(NetworkError))
//! });
//!
//! queue.submit(Job::new("default", "fetch", json!([]))).await.unwrap();
//! let run = worker.process_next().await.unwrap();
//!
//! assert!(matches!(run, Some(JobRun::Completed(_))));
//! assert_eq!(queue.last_job().await.unwrap().rescue_counters.get("[NetworkError]"), 1);
//! # Ok::<(), RescueError>(())
//! # });
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod group;
pub mod job_types;
pub mod middleware;
pub mod options;
pub mod registry;
pub mod rules_file;

pub use config::{DEFAULT_DELAY, DEFAULT_JITTER, DEFAULT_LIMIT, RescueConfig, RescueConfigBuilder};
pub use engine::{Decision, Rescue, RescuePlan, Rescuer, reschedule};
pub use error::{RescueError, RescueResult};
pub use group::{ErrorGroup, ErrorType, IntoErrorGroup};
pub use job_types::JobTypes;
pub use middleware::RescueMiddleware;
pub use options::{Delay, RescueOptions, RetryRule, RuleDefaults};
pub use registry::{RuleEntry, RuleRegistry};
pub use rules_file::{ErrorCatalog, FileFormat, RulesLoader};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::RescueConfig;
    pub use crate::engine::{Decision, Rescue, RescuePlan, Rescuer};
    pub use crate::error::{RescueError, RescueResult};
    pub use crate::errors;
    pub use crate::group::{ErrorGroup, ErrorType};
    pub use crate::job_types::JobTypes;
    pub use crate::middleware::RescueMiddleware;
    pub use crate::options::{Delay, RescueOptions};
    pub use crate::registry::RuleRegistry;
    pub use crate::rules_file::{ErrorCatalog, RulesLoader};
}
