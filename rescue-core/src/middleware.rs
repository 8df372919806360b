//! Worker middleware that rescues declared failures.

use crate::engine::Rescuer;
use crate::job_types::JobTypes;
use async_trait::async_trait;
use rescue_queue::{Job, JobMiddleware, JobOutcome, Next};
use std::sync::Arc;

/// Wraps every job execution with the [`Rescuer`].
///
/// The executing job's type is looked up in the catalog; types without rules
/// run untouched. A rescued failure is reported to the worker as success, so
/// the host only sees errors that were not rescued.
#[derive(Clone)]
pub struct RescueMiddleware {
    rescuer: Rescuer,
    job_types: Arc<JobTypes>,
}

impl RescueMiddleware {
    pub fn new(rescuer: Rescuer, job_types: Arc<JobTypes>) -> Self {
        Self { rescuer, job_types }
    }

    pub fn rescuer(&self) -> &Rescuer {
        &self.rescuer
    }

    pub fn job_types(&self) -> &JobTypes {
        &self.job_types
    }
}

#[async_trait]
impl JobMiddleware for RescueMiddleware {
    async fn call(&self, job: &Job, next: Next<'_>) -> JobOutcome {
        let Some(rules) = self
            .job_types
            .get(&job.job_type)
            .filter(|rules| !rules.is_empty())
        else {
            return next.run(job).await;
        };

        self.rescuer
            .execute(job, &rules, || next.run(job))
            .await
            .map(|_| ())
    }
}
