//! Declarative rules documents.
//!
//! A document lists rules in declaration order:
//!
//! ```toml
//! [[rescue]]
//! errors = ["NetworkError", "TimeoutError"]
//! delay = 10                 # or { linear = 5 } / { exponential = 2 }
//! limit = 2
//! jitter = 0.0
//! queue = "low"
//! ```
//!
//! Error names are resolved through an [`ErrorCatalog`], since a type cannot
//! be looked up by name at runtime.

use crate::error::{RescueError, RescueResult};
use crate::group::{ErrorGroup, ErrorType};
use crate::options::{Delay, RescueOptions};
use crate::registry::RuleRegistry;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::error::Error;
use std::fs;
use std::path::Path;

const ENTRY_KEYS: [&str; 5] = ["errors", "delay", "limit", "jitter", "queue"];

/// Supported document formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Toml,
}

impl FileFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "json" => Some(FileFormat::Json),
            "toml" => Some(FileFormat::Toml),
            _ => None,
        }
    }
}

/// Error types that documents may refer to, by name.
#[derive(Debug, Clone, Default)]
pub struct ErrorCatalog {
    types: HashMap<String, ErrorType>,
}

impl ErrorCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `E` under its short type name.
    pub fn with<E: Error + 'static>(self) -> Self {
        self.with_type(ErrorType::of::<E>())
    }

    /// Add an error type under its own name.
    pub fn with_type(mut self, error_type: ErrorType) -> Self {
        self.insert(error_type);
        self
    }

    pub fn insert(&mut self, error_type: ErrorType) {
        self.types.insert(error_type.name().to_string(), error_type);
    }

    pub fn get(&self, name: &str) -> Option<&ErrorType> {
        self.types.get(name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Loads rules documents into a [`RuleRegistry`].
#[derive(Debug, Clone)]
pub struct RulesLoader {
    format: FileFormat,
    catalog: ErrorCatalog,
}

impl RulesLoader {
    pub fn new(format: FileFormat, catalog: ErrorCatalog) -> Self {
        Self { format, catalog }
    }

    /// Pick the format from the file extension.
    pub fn auto(path: impl AsRef<Path>, catalog: ErrorCatalog) -> RescueResult<Self> {
        let ext = path
            .as_ref()
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| RescueError::Load("No file extension found".to_string()))?;

        let format = FileFormat::from_extension(ext)
            .ok_or_else(|| RescueError::Load(format!("Unsupported format: {}", ext)))?;

        Ok(Self::new(format, catalog))
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    /// Read `path` and register its rules; returns how many were added.
    pub fn load_file(&self, path: impl AsRef<Path>, rules: &mut RuleRegistry) -> RescueResult<usize> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            RescueError::Load(format!("Failed to read {}: {}", path.display(), e))
        })?;
        self.load_str(&content, rules)
    }

    /// Register the rules in `content`; returns how many were added.
    ///
    /// All or nothing: on error `rules` is unchanged, and the message names
    /// the offending entry.
    pub fn load_str(&self, content: &str, rules: &mut RuleRegistry) -> RescueResult<usize> {
        let document = self.parse(content)?;
        let entries = rescue_entries(&document)?;

        let mut staged = rules.clone();
        for (index, entry) in entries.iter().enumerate() {
            let location = format!("rescue[{}]", index);
            let (group, options) = self.entry(entry).map_err(|e| e.at(&location))?;
            staged.register(group, options).map_err(|e| e.at(&location))?;
        }

        rescue_log::debug!("Loaded {} rescue rule(s)", entries.len());
        *rules = staged;
        Ok(entries.len())
    }

    fn parse(&self, content: &str) -> RescueResult<Value> {
        match self.format {
            FileFormat::Json => serde_json::from_str(content)
                .map_err(|e| RescueError::Parse(format!("JSON parse error: {}", e))),
            FileFormat::Toml => {
                let toml_value: toml::Value = toml::from_str(content)
                    .map_err(|e| RescueError::Parse(format!("TOML parse error: {}", e)))?;
                serde_json::to_value(toml_value).map_err(|e| {
                    RescueError::Parse(format!("TOML to JSON conversion error: {}", e))
                })
            }
        }
    }

    fn entry(&self, entry: &Value) -> RescueResult<(ErrorGroup, RescueOptions)> {
        let entry = entry
            .as_object()
            .ok_or_else(|| RescueError::Parse("entry must be a table".to_string()))?;
        reject_unknown_keys(entry)?;

        let group = self.group(entry.get("errors"))?;

        let mut options = RescueOptions::new();
        if let Some(delay) = entry.get("delay") {
            options.delay = Some(parse_delay(delay)?);
        }
        if let Some(limit) = entry.get("limit") {
            options.limit = Some(parse_limit(limit)?);
        }
        if let Some(jitter) = entry.get("jitter") {
            options.jitter = Some(jitter.as_f64().ok_or_else(|| {
                RescueError::InvalidJitter(format!("{} is not a number", jitter))
            })?);
        }
        if let Some(queue) = entry.get("queue") {
            options.queue = Some(
                queue
                    .as_str()
                    .ok_or_else(|| RescueError::InvalidQueue(format!("{} is not a string", queue)))?
                    .to_string(),
            );
        }

        Ok((group, options))
    }

    fn group(&self, errors: Option<&Value>) -> RescueResult<ErrorGroup> {
        let names: Vec<&Value> = match errors {
            None => Vec::new(),
            Some(Value::Array(items)) => items.iter().collect(),
            Some(single) => vec![single],
        };

        let types = names
            .into_iter()
            .map(|name| {
                let name = name.as_str().ok_or_else(|| {
                    RescueError::InvalidErrorGroup(format!("{} is not an error name", name))
                })?;
                self.catalog.get(name).cloned().ok_or_else(|| {
                    RescueError::InvalidErrorGroup(format!("unknown error type {:?}", name))
                })
            })
            .collect::<RescueResult<Vec<ErrorType>>>()?;

        ErrorGroup::new(types)
    }
}

fn rescue_entries(document: &Value) -> RescueResult<&[Value]> {
    let root = document
        .as_object()
        .ok_or_else(|| RescueError::Parse("document must be a table".to_string()))?;

    if let Some(key) = root.keys().find(|key| key.as_str() != "rescue") {
        return Err(RescueError::Parse(format!("unknown key {:?}", key)));
    }

    match root.get("rescue") {
        None => Ok(&[][..]),
        Some(Value::Array(entries)) => Ok(entries.as_slice()),
        Some(_) => Err(RescueError::Parse("\"rescue\" must be a list of tables".to_string())),
    }
}

fn reject_unknown_keys(entry: &Map<String, Value>) -> RescueResult<()> {
    match entry.keys().find(|key| !ENTRY_KEYS.contains(&key.as_str())) {
        Some(key) => Err(RescueError::Parse(format!("unknown key {:?}", key))),
        None => Ok(()),
    }
}

fn parse_delay(value: &Value) -> RescueResult<Delay> {
    if let Some(seconds) = value.as_f64() {
        return Ok(Delay::fixed(seconds));
    }

    let invalid = || {
        RescueError::InvalidDelay(format!(
            "{} is not a number, {{ linear = n }} or {{ exponential = n }}",
            value
        ))
    };

    let strategy = value.as_object().filter(|map| map.len() == 1).ok_or_else(invalid)?;
    let (name, arg) = strategy.iter().next().ok_or_else(invalid)?;
    let arg = arg
        .as_f64()
        .filter(|n| n.is_finite() && *n >= 0.0)
        .ok_or_else(|| RescueError::InvalidDelay(format!("{} needs a non-negative number", name)))?;

    match name.as_str() {
        "linear" => Ok(Delay::linear(arg)),
        "exponential" => Ok(Delay::exponential(arg)),
        _ => Err(invalid()),
    }
}

fn parse_limit(value: &Value) -> RescueResult<u32> {
    value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| RescueError::InvalidLimit(format!("{} is not a non-negative integer", value)))
}
