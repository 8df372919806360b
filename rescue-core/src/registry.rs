//! Ordered rule table for one job type.

use crate::config::RescueConfig;
use crate::error::{RescueError, RescueResult};
use crate::group::{ErrorGroup, IntoErrorGroup};
use crate::options::{RescueOptions, RetryRule, RuleDefaults};
use std::error::Error;

/// A group together with its resolved rule.
#[derive(Clone, Debug)]
pub struct RuleEntry {
    pub group: ErrorGroup,
    pub rule: RetryRule,
}

/// Rules declared for a job type, in registration order.
///
/// Later registrations win when several groups match the same error, so a
/// subtype (or a later call) can narrow what an earlier rule covers.
///
/// # Examples
///
/// ```
/// use rescue_core::{RescueConfig, RescueOptions, RuleRegistry, errors};
///
/// #[derive(Debug, thiserror::Error)]
/// #[error("network down")]
/// struct NetworkError;
///
/// let mut rules = RuleRegistry::new(&RescueConfig::default());
/// rules
///     .register(errors![NetworkError], RescueOptions::new().delay(10.0).limit(2))
///     .unwrap();
///
/// let found = rules.find_rule_for(&NetworkError).unwrap();
/// assert_eq!(found.group.key(), "[NetworkError]");
/// assert_eq!(found.rule.limit, 2);
/// ```
#[derive(Clone, Debug, Default)]
pub struct RuleRegistry {
    entries: Vec<RuleEntry>,
    defaults: RuleDefaults,
}

impl RuleRegistry {
    /// Empty registry resolving undeclared options from `config`.
    pub fn new(config: &RescueConfig) -> Self {
        Self {
            entries: Vec::new(),
            defaults: config.rule_defaults(),
        }
    }

    /// Declare a rule for `errors`.
    ///
    /// Validates the group and every declared option before touching the
    /// table; on error nothing is added. A group whose key is already taken
    /// by a group of different error types is rejected, since both would
    /// share one attempt counter.
    pub fn register(
        &mut self,
        errors: impl IntoErrorGroup,
        options: RescueOptions,
    ) -> RescueResult<&mut Self> {
        let group = ErrorGroup::new(errors)?;
        let key = group.key();
        if self
            .entries
            .iter()
            .any(|entry| entry.group.key() == key && !entry.group.same_as(&group))
        {
            return Err(RescueError::InvalidErrorGroup(format!(
                "{} is already used by a group of other error types; give one of them an explicit name",
                key
            )));
        }
        let rule = options.resolve(&self.defaults)?;

        rescue_log::debug!("Registered rescue rule for {}", group);
        self.entries.push(RuleEntry { group, rule });
        Ok(self)
    }

    /// Most recently registered entry whose group matches `err`.
    pub fn find_rule_for(&self, err: &(dyn Error + 'static)) -> Option<&RuleEntry> {
        self.entries.iter().rev().find(|entry| entry.group.matches(err))
    }

    /// Independent copy for a subtype; later registrations on either side
    /// do not affect the other.
    pub fn inherit(&self) -> Self {
        self.clone()
    }

    /// Entries in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &RuleEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn defaults(&self) -> &RuleDefaults {
        &self.defaults
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::ErrorType;
    use crate::options::Delay;
    use crate::errors;

    #[derive(Debug, thiserror::Error)]
    #[error("network down")]
    struct NetworkError;

    #[derive(Debug, thiserror::Error)]
    #[error("timed out")]
    struct TimeoutError;

    #[derive(Debug, thiserror::Error)]
    #[error("unexpected")]
    struct UnexpectedError;

    #[derive(Debug, thiserror::Error)]
    enum TestError {
        #[error("base")]
        Base,
        #[error("parent")]
        Parent,
        #[error("child")]
        Child,
    }

    fn parent() -> ErrorType {
        ErrorType::variant::<TestError, _>("ParentError", |e| {
            matches!(e, TestError::Parent | TestError::Child)
        })
    }

    fn child() -> ErrorType {
        ErrorType::variant::<TestError, _>("ChildError", |e| matches!(e, TestError::Child))
    }

    fn registry() -> RuleRegistry {
        RuleRegistry::new(&RescueConfig::default())
    }

    #[test]
    fn test_unmatched_error() {
        let mut rules = registry();
        rules.register(errors![NetworkError], RescueOptions::new()).unwrap();

        assert!(rules.find_rule_for(&UnexpectedError).is_none());
    }

    #[test]
    fn test_empty_registry_matches_nothing() {
        assert!(registry().find_rule_for(&NetworkError).is_none());
    }

    #[test]
    fn test_group_matches_any_member() {
        let mut rules = registry();
        rules
            .register(errors![NetworkError, TimeoutError], RescueOptions::new().limit(3))
            .unwrap();

        let found = rules.find_rule_for(&TimeoutError).unwrap();
        assert_eq!(found.group.key(), "[NetworkError, TimeoutError]");
        assert_eq!(found.rule.limit, 3);
    }

    #[test]
    fn test_last_match_wins() {
        let mut rules = registry();
        rules
            .register(ErrorType::of::<TestError>(), RescueOptions::new().delay(10.0))
            .unwrap()
            .register(parent(), RescueOptions::new().delay(20.0))
            .unwrap()
            .register(child(), RescueOptions::new().delay(30.0))
            .unwrap();

        let delay_for = |err: TestError| {
            let entry = rules.find_rule_for(&err).unwrap();
            (entry.group.key(), entry.rule.delay.seconds_for(1))
        };

        assert_eq!(delay_for(TestError::Base), ("[TestError]".to_string(), 10.0));
        assert_eq!(delay_for(TestError::Parent), ("[ParentError]".to_string(), 20.0));
        assert_eq!(delay_for(TestError::Child), ("[ChildError]".to_string(), 30.0));
    }

    #[test]
    fn test_broad_rule_registered_later_overrides_narrow_one() {
        let mut rules = registry();
        rules
            .register(child(), RescueOptions::new().limit(1))
            .unwrap()
            .register(ErrorType::of::<TestError>(), RescueOptions::new().limit(7))
            .unwrap();

        assert_eq!(rules.find_rule_for(&TestError::Child).unwrap().rule.limit, 7);
    }

    #[test]
    fn test_registration_uses_config_defaults() {
        let config = RescueConfig::builder().delay(5.0).limit(4).jitter(0.0).build().unwrap();
        let mut rules = RuleRegistry::new(&config);
        rules.register(errors![NetworkError], RescueOptions::new()).unwrap();

        let entry = rules.find_rule_for(&NetworkError).unwrap();
        assert_eq!(entry.rule.delay.seconds_for(1), 5.0);
        assert_eq!(entry.rule.limit, 4);
        assert_eq!(entry.rule.jitter, 0.0);
    }

    #[test]
    fn test_invalid_registration_adds_nothing() {
        let mut rules = registry();

        let err = rules
            .register(errors![NetworkError], RescueOptions::new().jitter(-1.0))
            .unwrap_err();
        assert!(matches!(err, RescueError::InvalidJitter(_)));

        let err = rules
            .register(Vec::<ErrorType>::new(), RescueOptions::new())
            .unwrap_err();
        assert!(matches!(err, RescueError::InvalidErrorGroup(_)));

        assert!(rules.is_empty());
    }

    mod net {
        #[derive(Debug, thiserror::Error)]
        #[error("net timeout")]
        pub struct Timeout;
    }

    mod db {
        #[derive(Debug, thiserror::Error)]
        #[error("db timeout")]
        pub struct Timeout;
    }

    #[test]
    fn test_colliding_key_is_rejected() {
        let mut rules = registry();
        rules.register(errors![net::Timeout], RescueOptions::new().limit(1)).unwrap();

        let err = rules
            .register(errors![db::Timeout], RescueOptions::new().limit(1))
            .unwrap_err();
        assert!(matches!(err, RescueError::InvalidErrorGroup(ref m) if m.contains("[Timeout]")));
        assert_eq!(rules.len(), 1);
        assert!(rules.find_rule_for(&db::Timeout).is_none());

        rules
            .register(ErrorType::named::<db::Timeout>("db::Timeout"), RescueOptions::new())
            .unwrap();
        assert_eq!(rules.find_rule_for(&db::Timeout).unwrap().group.key(), "[db::Timeout]");
        assert_eq!(rules.find_rule_for(&net::Timeout).unwrap().group.key(), "[Timeout]");
    }

    #[test]
    fn test_same_group_may_be_registered_again() {
        let mut rules = registry();
        rules
            .register(errors![NetworkError], RescueOptions::new().limit(1))
            .unwrap()
            .register(errors![NetworkError], RescueOptions::new().limit(4))
            .unwrap();

        assert_eq!(rules.len(), 2);
        assert_eq!(rules.find_rule_for(&NetworkError).unwrap().rule.limit, 4);
    }

    #[test]
    fn test_collision_with_inherited_group_is_rejected() {
        let mut base = registry();
        base.register(errors![net::Timeout], RescueOptions::new()).unwrap();

        let mut sub = base.inherit();
        assert!(sub.register(errors![db::Timeout], RescueOptions::new()).is_err());
    }

    #[test]
    fn test_inherit_copies_then_diverges() {
        let mut base = registry();
        base.register(errors![NetworkError], RescueOptions::new()).unwrap();

        let mut sub = base.inherit();
        sub.register(errors![TimeoutError], RescueOptions::new()).unwrap();
        base.register(errors![UnexpectedError], RescueOptions::new()).unwrap();

        let sub_keys: Vec<String> = sub.iter().map(|e| e.group.key()).collect();
        let base_keys: Vec<String> = base.iter().map(|e| e.group.key()).collect();

        assert_eq!(sub_keys, vec!["[NetworkError]", "[TimeoutError]"]);
        assert_eq!(base_keys, vec!["[NetworkError]", "[UnexpectedError]"]);
        assert!(base.find_rule_for(&TimeoutError).is_none());
        assert!(sub.find_rule_for(&UnexpectedError).is_none());
    }

    #[test]
    fn test_computed_delay_is_kept() {
        let mut rules = registry();
        rules
            .register(
                errors![NetworkError],
                RescueOptions::new().delay(Delay::computed(|n| f64::from(n) * 5.0)),
            )
            .unwrap();

        let entry = rules.find_rule_for(&NetworkError).unwrap();
        assert_eq!(entry.rule.delay.seconds_for(2), 10.0);
    }
}
