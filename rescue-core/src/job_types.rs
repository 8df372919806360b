//! Catalog of rule registries keyed by job type.

use crate::config::RescueConfig;
use crate::error::{RescueError, RescueResult};
use crate::registry::RuleRegistry;
use std::collections::HashMap;
use std::sync::Arc;

/// Job type name to its frozen [`RuleRegistry`].
///
/// Registries are built when a type is defined and shared read-only with the
/// workers afterwards. A subtype starts from a copy of its parent's rules.
///
/// ```
/// use rescue_core::{JobTypes, RescueConfig, RescueOptions, errors};
///
/// #[derive(Debug, thiserror::Error)]
/// #[error("network down")]
/// struct NetworkError;
///
/// #[derive(Debug, thiserror::Error)]
/// #[error("payment declined")]
/// struct DeclinedError;
///
/// let mut types = JobTypes::new(RescueConfig::default());
/// types.define("sync_account", |rules| {
///     rules.register(errors![NetworkError], RescueOptions::new().limit(5))?;
///     Ok(())
/// })?;
/// types.define_subtype("sync_billing", "sync_account", |rules| {
///     rules.register(errors![DeclinedError], RescueOptions::new().limit(1))?;
///     Ok(())
/// })?;
///
/// assert_eq!(types.get("sync_account").unwrap().len(), 1);
/// assert_eq!(types.get("sync_billing").unwrap().len(), 2);
/// # Ok::<(), rescue_core::RescueError>(())
/// ```
#[derive(Debug, Default)]
pub struct JobTypes {
    config: RescueConfig,
    types: HashMap<String, Arc<RuleRegistry>>,
}

impl JobTypes {
    /// Empty catalog whose registries take their defaults from `config`.
    pub fn new(config: RescueConfig) -> Self {
        Self {
            config,
            types: HashMap::new(),
        }
    }

    /// Define (or redefine) `name`, declaring its rules in `declare`.
    ///
    /// If `declare` fails the catalog is left unchanged.
    pub fn define<F>(&mut self, name: impl Into<String>, declare: F) -> RescueResult<Arc<RuleRegistry>>
    where
        F: FnOnce(&mut RuleRegistry) -> RescueResult<()>,
    {
        let mut rules = RuleRegistry::new(&self.config);
        declare(&mut rules)?;
        Ok(self.insert(name.into(), rules))
    }

    /// Define `name` as a subtype of `parent`: copy the parent's rules, then
    /// extend them in `declare`.
    ///
    /// Later changes to either side are not seen by the other.
    pub fn define_subtype<F>(
        &mut self,
        name: impl Into<String>,
        parent: &str,
        declare: F,
    ) -> RescueResult<Arc<RuleRegistry>>
    where
        F: FnOnce(&mut RuleRegistry) -> RescueResult<()>,
    {
        let mut rules = self
            .types
            .get(parent)
            .map(|rules| rules.inherit())
            .ok_or_else(|| RescueError::UnknownJobType(parent.to_string()))?;
        declare(&mut rules)?;
        Ok(self.insert(name.into(), rules))
    }

    fn insert(&mut self, name: String, rules: RuleRegistry) -> Arc<RuleRegistry> {
        rescue_log::debug!("Defined job type {} with {} rescue rule(s)", name, rules.len());
        let rules = Arc::new(rules);
        self.types.insert(name, rules.clone());
        rules
    }

    /// Rules for `name`, if the type is defined.
    pub fn get(&self, name: &str) -> Option<Arc<RuleRegistry>> {
        self.types.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Defined type names, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn config(&self) -> &RescueConfig {
        &self.config
    }
}
