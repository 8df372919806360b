//! Process-wide rescue configuration.
//!
//! Built once at startup and passed explicitly to the engine and to each
//! [`RuleRegistry`](crate::RuleRegistry); nothing reads it through a global.

use crate::error::{RescueError, RescueResult};
use crate::options::{Delay, RuleDefaults, validate_jitter};
use rescue_log::Logger;
use std::env;

/// Default delay in seconds.
pub const DEFAULT_DELAY: f64 = 60.0;

/// Default number of rescues per error group.
pub const DEFAULT_LIMIT: u32 = 10;

/// Default jitter fraction.
pub const DEFAULT_JITTER: f64 = 0.15;

/// Defaults for undeclared rule options, and the rescue logger.
#[derive(Clone, Debug)]
pub struct RescueConfig {
    delay: Delay,
    limit: u32,
    jitter: f64,
    logger: Logger,
}

impl Default for RescueConfig {
    fn default() -> Self {
        Self {
            delay: Delay::default(),
            limit: DEFAULT_LIMIT,
            jitter: DEFAULT_JITTER,
            logger: Logger::default(),
        }
    }
}

impl RescueConfig {
    /// Start from the built-in defaults.
    pub fn builder() -> RescueConfigBuilder {
        RescueConfigBuilder::default()
    }

    /// Built-in defaults overridden by `RESCUE_DELAY`, `RESCUE_LIMIT` and
    /// `RESCUE_JITTER`.
    pub fn from_env() -> RescueResult<Self> {
        Self::builder().load_env()?.build()
    }

    pub fn delay(&self) -> &Delay {
        &self.delay
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Defaults applied to rules registered against this configuration.
    pub fn rule_defaults(&self) -> RuleDefaults {
        RuleDefaults {
            delay: self.delay.clone(),
            limit: self.limit,
            jitter: self.jitter,
        }
    }
}

/// Builder for [`RescueConfig`]; validation happens in [`build`](Self::build).
#[derive(Clone, Debug, Default)]
pub struct RescueConfigBuilder {
    config: RescueConfig,
}

impl RescueConfigBuilder {
    pub fn delay(mut self, delay: impl Into<Delay>) -> Self {
        self.config.delay = delay.into();
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.config.limit = limit;
        self
    }

    pub fn jitter(mut self, jitter: f64) -> Self {
        self.config.jitter = jitter;
        self
    }

    /// Destination of the one-line-per-rescue log.
    pub fn logger(mut self, logger: Logger) -> Self {
        self.config.logger = logger;
        self
    }

    /// Apply `RESCUE_DELAY`, `RESCUE_LIMIT` and `RESCUE_JITTER` when set.
    pub fn load_env(self) -> RescueResult<Self> {
        self.load_vars(|name| env::var(name).ok())
    }

    fn load_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> RescueResult<Self> {
        if let Some(raw) = lookup("RESCUE_DELAY") {
            let seconds = raw.trim().parse::<f64>().map_err(|_| {
                RescueError::InvalidDelay(format!("RESCUE_DELAY={:?} is not a number", raw))
            })?;
            self.config.delay = Delay::fixed(seconds);
        }
        if let Some(raw) = lookup("RESCUE_LIMIT") {
            self.config.limit = raw.trim().parse::<u32>().map_err(|_| {
                RescueError::InvalidLimit(format!(
                    "RESCUE_LIMIT={:?} is not a non-negative integer",
                    raw
                ))
            })?;
        }
        if let Some(raw) = lookup("RESCUE_JITTER") {
            self.config.jitter = raw.trim().parse::<f64>().map_err(|_| {
                RescueError::InvalidJitter(format!("RESCUE_JITTER={:?} is not a number", raw))
            })?;
        }
        Ok(self)
    }

    /// Validate and finish.
    pub fn build(self) -> RescueResult<RescueConfig> {
        self.config.delay.validate()?;
        validate_jitter(self.config.jitter)?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rescue_log::{Level, MemorySink};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RescueConfig::default();
        assert_eq!(config.delay().seconds_for(1), 60.0);
        assert_eq!(config.limit(), 10);
        assert_eq!(config.jitter(), 0.15);
    }

    #[test]
    fn test_builder_overrides() {
        let config = RescueConfig::builder()
            .delay(30.0)
            .limit(5)
            .jitter(0.0)
            .build()
            .unwrap();

        assert_eq!(config.delay().seconds_for(1), 30.0);
        assert_eq!(config.limit(), 5);
        assert_eq!(config.jitter(), 0.0);
    }

    #[test]
    fn test_builder_accepts_computed_delay() {
        let config = RescueConfig::builder()
            .delay(Delay::computed(|_| 30.0))
            .build()
            .unwrap();
        assert_eq!(config.delay().seconds_for(4), 30.0);
    }

    #[test]
    fn test_builder_rejects_invalid_values() {
        assert!(matches!(
            RescueConfig::builder().delay(-5.0).build(),
            Err(RescueError::InvalidDelay(_))
        ));
        assert!(matches!(
            RescueConfig::builder().jitter(f64::NAN).build(),
            Err(RescueError::InvalidJitter(_))
        ));
    }

    #[test]
    fn test_logger_is_configurable() {
        let sink = Arc::new(MemorySink::new());
        let config = RescueConfig::builder()
            .logger(Logger::new(sink.clone()))
            .build()
            .unwrap();

        config.logger().info("test", "hello");
        assert_eq!(sink.messages_at(Level::Info), vec!["hello"]);
    }

    #[test]
    fn test_rule_defaults_follow_config() {
        let config = RescueConfig::builder().limit(3).jitter(0.5).build().unwrap();
        let defaults = config.rule_defaults();

        assert_eq!(defaults.limit, 3);
        assert_eq!(defaults.jitter, 0.5);
    }

    #[test]
    fn test_load_vars() {
        let config = RescueConfig::builder()
            .load_vars(vars(&[
                ("RESCUE_DELAY", "12.5"),
                ("RESCUE_LIMIT", " 4 "),
                ("RESCUE_JITTER", "0"),
            ]))
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(config.delay().seconds_for(1), 12.5);
        assert_eq!(config.limit(), 4);
        assert_eq!(config.jitter(), 0.0);
    }

    #[test]
    fn test_load_vars_rejects_garbage() {
        let result = RescueConfig::builder().load_vars(vars(&[("RESCUE_LIMIT", "-1")]));
        assert!(matches!(result, Err(RescueError::InvalidLimit(_))));

        let result = RescueConfig::builder().load_vars(vars(&[("RESCUE_DELAY", "soon")]));
        assert!(matches!(result, Err(RescueError::InvalidDelay(_))));

        let result = RescueConfig::builder().load_vars(vars(&[("RESCUE_JITTER", "lots")]));
        assert!(matches!(result, Err(RescueError::InvalidJitter(_))));
    }

    #[test]
    fn test_negative_env_delay_fails_on_build() {
        let result = RescueConfig::builder()
            .load_vars(vars(&[("RESCUE_DELAY", "-3")]))
            .unwrap()
            .build();
        assert!(matches!(result, Err(RescueError::InvalidDelay(_))));
    }
}
