//! Job description and per-job bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Job unique identifier.
pub type JobId = Uuid;

/// Job arguments payload.
pub type JobData = serde_json::Value;

/// Job priority levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub enum JobPriority {
    /// Lowest priority
    Low = 0,
    /// Normal priority (default)
    #[default]
    Normal = 1,
    /// High priority
    High = 2,
    /// Critical priority
    Critical = 3,
}

impl JobPriority {
    /// All priorities, most urgent first.
    pub const DESCENDING: [JobPriority; 4] = [
        JobPriority::Critical,
        JobPriority::High,
        JobPriority::Normal,
        JobPriority::Low,
    ];

    pub(crate) fn as_key(&self) -> &'static str {
        match self {
            JobPriority::Low => "low",
            JobPriority::Normal => "normal",
            JobPriority::High => "high",
            JobPriority::Critical => "critical",
        }
    }
}

/// Lifecycle state as seen by the host processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum JobState {
    /// Waiting to be processed
    #[default]
    Pending,
    /// Currently being processed
    Processing,
    /// Completed successfully
    Completed,
    /// Failed, will be retried by the host
    Failed,
    /// Failed permanently
    Dead,
}

/// Rescue attempt counters keyed by the rendered error group.
///
/// Travels inside the job through every requeue; a key that was never
/// written reads as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RescueCounters(BTreeMap<String, u32>);

impl RescueCounters {
    /// Create an empty counter map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter for `key`, zero when absent.
    pub fn get(&self, key: &str) -> u32 {
        self.0.get(key).copied().unwrap_or(0)
    }

    /// Overwrite the counter for `key`.
    pub fn set(&mut self, key: impl Into<String>, value: u32) {
        self.0.insert(key.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over `(key, counter)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl<K: Into<String>> FromIterator<(K, u32)> for RescueCounters {
    fn from_iter<I: IntoIterator<Item = (K, u32)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// A unit of work as stored in and submitted to a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier
    #[serde(rename = "jid")]
    pub id: JobId,

    /// Job type name, used to find the handler and the rescue rules
    #[serde(rename = "class")]
    pub job_type: String,

    /// Job arguments
    pub args: JobData,

    /// Queue name
    pub queue: String,

    /// Job priority
    #[serde(default)]
    pub priority: JobPriority,

    /// Host lifecycle state
    #[serde(default)]
    pub state: JobState,

    /// Number of times the host has started this job
    #[serde(default)]
    pub attempts: u32,

    /// Host retry budget for errors that escape all middleware
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Identifies the host run that started the job; fresh on every start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,

    /// Last error reported to the host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// When the job was created
    pub created_at: DateTime<Utc>,

    /// Earliest execution time; `None` means eligible immediately
    #[serde(rename = "at", default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,

    /// Rescue attempt counters
    #[serde(default, skip_serializing_if = "RescueCounters::is_empty")]
    pub rescue_counters: RescueCounters,

    /// Free-form metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

fn default_max_attempts() -> u32 {
    3
}

impl Job {
    /// Create a new job.
    pub fn new(queue: impl Into<String>, job_type: impl Into<String>, args: JobData) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_type: job_type.into(),
            args,
            queue: queue.into(),
            priority: JobPriority::default(),
            state: JobState::Pending,
            attempts: 0,
            max_attempts: default_max_attempts(),
            run_id: None,
            error: None,
            created_at: Utc::now(),
            scheduled_at: None,
            rescue_counters: RescueCounters::new(),
            metadata: HashMap::new(),
        }
    }

    /// Set job priority.
    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the host retry budget.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Schedule the job for later.
    pub fn schedule_at(mut self, time: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(time);
        self
    }

    /// Schedule the job after a delay.
    pub fn schedule_after(mut self, duration: chrono::Duration) -> Self {
        self.scheduled_at = Some(Utc::now() + duration);
        self
    }

    /// Add metadata.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Check if the job is ready to be processed.
    pub fn is_ready(&self) -> bool {
        self.scheduled_at.is_none_or(|at| Utc::now() >= at)
    }

    /// Check if the host may retry the job.
    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }

    /// Mark job as processing.
    pub fn start_processing(&mut self) {
        self.state = JobState::Processing;
        self.attempts += 1;
        self.run_id = Some(Uuid::new_v4());
    }

    /// Mark job as completed.
    pub fn complete(&mut self) {
        self.state = JobState::Completed;
        self.error = None;
    }

    /// Record a failure that reached the host.
    pub fn fail(&mut self, error: String) {
        self.state = if self.can_retry() {
            JobState::Failed
        } else {
            JobState::Dead
        };
        self.error = Some(error);
    }

    /// Host backoff before the next generic retry: 2^(attempts-1) seconds, capped at one hour.
    pub fn backoff_delay(&self) -> chrono::Duration {
        let exponent = self.attempts.saturating_sub(1).min(12);
        let seconds = 2_i64.pow(exponent);
        chrono::Duration::seconds(seconds.min(3600))
    }
}
