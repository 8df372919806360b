//! Rescheduling engine.
//!
//! Runs a job body once. When it fails with an error covered by the job
//! type's rules, and the group's budget is not spent, a copy of the job is
//! submitted again with a delay and the failure counts as handled. Every
//! other failure is returned unchanged.

use crate::config::RescueConfig;
use crate::options::RetryRule;
use crate::registry::RuleRegistry;
use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use rescue_log::{debug, error, warn};
use rescue_queue::{Job, JobError, JobOutcome, JobState, JobSubmitter};
use std::error::Error;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Log target of the per-rescue info line.
pub const LOG_TARGET: &str = "rescue";

/// How a matched failure will be rescheduled.
#[derive(Debug, Clone, PartialEq)]
pub struct RescuePlan {
    /// Counter key of the matched group
    pub group_key: String,
    /// 1-based rescue count for the group, including this one
    pub attempt: u32,
    /// Delay after clamping and jitter
    pub delay_seconds: f64,
    /// Queue override declared by the rule
    pub queue: Option<String>,
}

/// What to do with a failure.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// No rule covers the error
    Unmatched,
    /// A rule matched but the group has used its budget
    Exhausted {
        group_key: String,
        attempt: u32,
        limit: u32,
    },
    /// Resubmit the job
    Reschedule(RescuePlan),
}

/// Outcome of a body run that did not propagate an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Rescue {
    /// The body succeeded
    Completed,
    /// The body failed and the job was resubmitted
    Rescheduled(RescuePlan),
}

/// The rescheduling engine.
#[derive(Clone)]
pub struct Rescuer {
    config: Arc<RescueConfig>,
    submitter: Arc<dyn JobSubmitter>,
}

impl Rescuer {
    pub fn new(config: Arc<RescueConfig>, submitter: Arc<dyn JobSubmitter>) -> Self {
        Self { config, submitter }
    }

    pub fn config(&self) -> &RescueConfig {
        &self.config
    }

    /// Run `body` for `job` and rescue its failure if `rules` cover it.
    ///
    /// Returns the body's own error, untouched, when it is unmatched, when
    /// its budget is spent, or when resubmission fails.
    ///
    /// ```
    /// use rescue_core::{Rescue, Rescuer, RescueConfig, RescueOptions, RuleRegistry, errors};
    /// use rescue_queue::{Job, JobError, MemoryQueue};
    /// use serde_json::json;
    /// use std::sync::Arc;
    ///
    /// #[derive(Debug, thiserror::Error)]
    /// #[error("network down")]
    /// struct NetworkError;
    ///
    /// # tokio_test::block_on(async {
    /// let config = Arc::new(RescueConfig::default());
    /// let queue = Arc::new(MemoryQueue::new());
    /// let rescuer = Rescuer::new(config.clone(), queue.clone());
    ///
    /// let mut rules = RuleRegistry::new(&config);
    /// rules.register(errors![NetworkError], RescueOptions::new().delay(10.0)).unwrap();
    ///
    /// let job = Job::new("default", "fetch", json!([]));
    /// let outcome = rescuer
    ///     .execute(&job, &rules, || async { Err::<(), JobError>(Box::new(NetworkError)) })
    ///     .await;
    ///
    /// assert!(matches!(outcome, Ok(Rescue::Rescheduled(_))));
    /// let resubmitted = queue.last_job().await.unwrap();
    /// assert_eq!(resubmitted.rescue_counters.get("[NetworkError]"), 1);
    /// # });
    /// ```
    pub async fn execute<F, Fut>(
        &self,
        job: &Job,
        rules: &RuleRegistry,
        body: F,
    ) -> Result<Rescue, JobError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = JobOutcome>,
    {
        match body().await {
            Ok(()) => Ok(Rescue::Completed),
            Err(err) => self.rescue(job, rules, err).await,
        }
    }

    /// Handle a failure `err` raised by `job`.
    pub async fn rescue(
        &self,
        job: &Job,
        rules: &RuleRegistry,
        err: JobError,
    ) -> Result<Rescue, JobError> {
        let decision = self.decide(job, rules, err.as_ref());

        let plan = match decision {
            Decision::Unmatched => {
                debug!("No rescue rule for job {} error: {}", job.id, err);
                return Err(err);
            }
            Decision::Exhausted {
                group_key,
                attempt,
                limit,
            } => {
                debug!(
                    "Rescue budget for {} spent on job {} ({} > {})",
                    group_key, job.id, attempt, limit
                );
                return Err(err);
            }
            Decision::Reschedule(plan) => plan,
        };

        self.config.logger().info(
            LOG_TARGET,
            &format!(
                "[rescue] Job failed {} times with error: {}; rescheduling in {} seconds",
                plan.attempt, err, plan.delay_seconds
            ),
        );

        match self.submitter.submit(reschedule(job, &plan)).await {
            Ok(_) => Ok(Rescue::Rescheduled(plan)),
            Err(submit_err) => {
                error!(
                    "Failed to resubmit job {} after {}: {}",
                    job.id, err, submit_err
                );
                Err(err)
            }
        }
    }

    /// Pick the rule for `err` and, within budget, plan the resubmission.
    ///
    /// Draws the jitter, so two calls may plan different delays.
    pub fn decide(
        &self,
        job: &Job,
        rules: &RuleRegistry,
        err: &(dyn Error + Send + Sync + 'static),
    ) -> Decision {
        let Some(entry) = rules.find_rule_for(err) else {
            return Decision::Unmatched;
        };

        let group_key = entry.group.key();
        let attempt = job.rescue_counters.get(&group_key).saturating_add(1);

        if attempt > entry.rule.limit {
            return Decision::Exhausted {
                group_key,
                attempt,
                limit: entry.rule.limit,
            };
        }

        Decision::Reschedule(RescuePlan {
            delay_seconds: delay_for(&entry.rule, attempt),
            queue: entry.rule.queue.clone(),
            group_key,
            attempt,
        })
    }
}

/// Base delay for `attempt` plus jitter.
fn delay_for(rule: &RetryRule, attempt: u32) -> f64 {
    let mut base = rule.delay.seconds_for(attempt);
    if !base.is_finite() || base < 0.0 {
        warn!(
            "Delay function returned {} for attempt {}; using 0",
            base, attempt
        );
        base = 0.0;
    }

    if rule.jitter == 0.0 || base == 0.0 {
        return base;
    }
    base + rule.jitter * rand::rng().random::<f64>() * base
}

/// Copy of `job` prepared for resubmission under `plan`.
///
/// Only the planned group's counter changes. A zero delay leaves the copy
/// unscheduled. The host attempt taken by the failed run is given back, so
/// rescues never spend the host's own retry budget.
pub fn reschedule(job: &Job, plan: &RescuePlan) -> Job {
    let mut next = job.clone();
    if job.state == JobState::Processing {
        next.attempts = job.attempts.saturating_sub(1);
    }
    next.state = JobState::Pending;
    next.run_id = None;
    next.scheduled_at = (plan.delay_seconds > 0.0).then(|| after(Utc::now(), plan.delay_seconds));
    next.rescue_counters.set(plan.group_key.clone(), plan.attempt);
    if let Some(queue) = &plan.queue {
        next.queue = queue.clone();
    }
    next
}

fn after(now: DateTime<Utc>, seconds: f64) -> DateTime<Utc> {
    Duration::try_from_secs_f64(seconds)
        .ok()
        .and_then(|delay| TimeDelta::from_std(delay).ok())
        .and_then(|delay| now.checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
