//! Environment-driven log configuration.

use crate::level::{Format, Level};
use std::env;

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether debug mode is enabled
    pub debug: bool,
    /// Minimum log level
    pub level: Level,
    /// Output format
    pub format: Format,
    /// Whether colors are enabled
    pub color: bool,
    /// Whether to include timestamps
    pub timestamps: bool,
    /// Whether to include the target (module path)
    pub module_path: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            level: Level::Info,
            format: Format::Json,
            color: false,
            timestamps: true,
            module_path: true,
        }
    }
}

impl LogConfig {
    /// Read the configuration from `RESCUE_*` environment variables.
    ///
    /// Unset or unparsable variables fall back to the defaults; `RESCUE_DEBUG`
    /// lowers the default level to debug.
    pub fn from_env() -> Self {
        let debug = flag("RESCUE_DEBUG").unwrap_or(false);

        let level = env::var("RESCUE_LOG_LEVEL")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(if debug { Level::Debug } else { Level::Info });

        let format = env::var("RESCUE_LOG_FORMAT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(Format::Json);

        let color = flag("RESCUE_LOG_COLOR").unwrap_or_else(color_supported);

        Self {
            debug,
            level,
            format,
            color,
            timestamps: flag("RESCUE_LOG_TIMESTAMPS").unwrap_or(true),
            module_path: flag("RESCUE_LOG_MODULE").unwrap_or(true),
        }
    }
}

fn flag(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

fn color_supported() -> bool {
    env::var("NO_COLOR").is_err() && env::var("TERM").is_ok()
}
