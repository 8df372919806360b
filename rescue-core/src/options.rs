//! Delay specifications, declared options and resolved retry rules.

use crate::error::{RescueError, RescueResult};
use std::fmt;
use std::sync::Arc;

type DelayFn = Arc<dyn Fn(u32) -> f64 + Send + Sync>;

/// How long to wait before a rescued job runs again, in seconds.
#[derive(Clone)]
pub enum Delay {
    /// Same delay for every attempt.
    Fixed(f64),
    /// Delay computed from the 1-based attempt number.
    Computed(DelayFn),
}

impl Delay {
    /// Fixed delay in seconds.
    pub fn fixed(seconds: f64) -> Self {
        Delay::Fixed(seconds)
    }

    /// Delay computed from the attempt number.
    ///
    /// ```
    /// use rescue_core::Delay;
    ///
    /// let delay = Delay::computed(|attempt| attempt as f64 * 5.0);
    /// assert_eq!(delay.seconds_for(2), 10.0);
    /// ```
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(u32) -> f64 + Send + Sync + 'static,
    {
        Delay::Computed(Arc::new(f))
    }

    /// `step * attempt` seconds.
    pub fn linear(step: f64) -> Self {
        Self::computed(move |attempt| step * f64::from(attempt))
    }

    /// `base * 2^(attempt - 1)` seconds.
    pub fn exponential(base: f64) -> Self {
        Self::computed(move |attempt| {
            let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
            base * 2_f64.powi(exponent)
        })
    }

    /// Raw delay for `attempt`, before clamping and jitter.
    pub fn seconds_for(&self, attempt: u32) -> f64 {
        match self {
            Delay::Fixed(seconds) => *seconds,
            Delay::Computed(f) => f(attempt),
        }
    }

    /// Reject negative or non-finite fixed delays.
    ///
    /// Computed delays can only be checked when they run.
    pub(crate) fn validate(&self) -> RescueResult<()> {
        match self {
            Delay::Fixed(seconds) if !seconds.is_finite() || *seconds < 0.0 => Err(
                RescueError::InvalidDelay(format!("{} must be a non-negative number", seconds)),
            ),
            _ => Ok(()),
        }
    }
}

impl Default for Delay {
    fn default() -> Self {
        Delay::Fixed(crate::config::DEFAULT_DELAY)
    }
}

impl fmt::Debug for Delay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delay::Fixed(seconds) => f.debug_tuple("Fixed").field(seconds).finish(),
            Delay::Computed(_) => f.write_str("Computed(<fn>)"),
        }
    }
}

impl From<f64> for Delay {
    fn from(seconds: f64) -> Self {
        Delay::Fixed(seconds)
    }
}

impl From<u32> for Delay {
    fn from(seconds: u32) -> Self {
        Delay::Fixed(f64::from(seconds))
    }
}

/// Options declared with a rule; unset fields take the registry defaults.
#[derive(Clone, Debug, Default)]
pub struct RescueOptions {
    pub delay: Option<Delay>,
    pub limit: Option<u32>,
    pub jitter: Option<f64>,
    pub queue: Option<String>,
}

impl RescueOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay before the rescued job runs again.
    pub fn delay(mut self, delay: impl Into<Delay>) -> Self {
        self.delay = Some(delay.into());
        self
    }

    /// Maximum number of rescues for the group.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Jitter fraction; 0 disables randomization.
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Queue for the rescheduled job.
    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    /// Validate and fill unset fields from `defaults`.
    pub fn resolve(self, defaults: &RuleDefaults) -> RescueResult<RetryRule> {
        if let Some(delay) = &self.delay {
            delay.validate()?;
        }
        if let Some(jitter) = self.jitter {
            validate_jitter(jitter)?;
        }
        if let Some(queue) = &self.queue {
            validate_queue(queue)?;
        }

        Ok(RetryRule {
            delay: self.delay.unwrap_or_else(|| defaults.delay.clone()),
            limit: self.limit.unwrap_or(defaults.limit),
            jitter: self.jitter.unwrap_or(defaults.jitter),
            queue: self.queue,
        })
    }
}

pub(crate) fn validate_jitter(jitter: f64) -> RescueResult<()> {
    if jitter.is_finite() && jitter >= 0.0 {
        Ok(())
    } else {
        Err(RescueError::InvalidJitter(format!(
            "{} must be a non-negative number",
            jitter
        )))
    }
}

fn validate_queue(queue: &str) -> RescueResult<()> {
    if queue.trim().is_empty() {
        return Err(RescueError::InvalidQueue("queue name must not be blank".to_string()));
    }
    if queue.chars().any(char::is_whitespace) {
        return Err(RescueError::InvalidQueue(format!(
            "queue name {:?} must not contain whitespace",
            queue
        )));
    }
    Ok(())
}

/// Values used for options a rule does not declare.
#[derive(Clone, Debug)]
pub struct RuleDefaults {
    pub delay: Delay,
    pub limit: u32,
    pub jitter: f64,
}

impl Default for RuleDefaults {
    fn default() -> Self {
        Self {
            delay: Delay::default(),
            limit: crate::config::DEFAULT_LIMIT,
            jitter: crate::config::DEFAULT_JITTER,
        }
    }
}

/// Fully resolved options for one error group.
#[derive(Clone, Debug)]
pub struct RetryRule {
    /// Base delay before the next attempt
    pub delay: Delay,
    /// Rescues allowed before the error propagates
    pub limit: u32,
    /// Random fraction of the delay added on top
    pub jitter: f64,
    /// Queue override for the rescheduled job
    pub queue: Option<String>,
}
