//! Injectable log sinks.
//!
//! Components that must report to an operator-chosen destination hold a
//! [`Logger`] instead of calling the global macros. The default logger writes
//! through the global formatter; tests swap in a [`MemorySink`] to assert on
//! the emitted lines.

use crate::level::Level;
use std::fmt;
use std::sync::{Arc, Mutex};

/// A single emitted log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Severity
    pub level: Level,
    /// Origin of the record, usually a module path
    pub target: String,
    /// Rendered message
    pub message: String,
}

/// Destination for leveled text messages.
pub trait LogSink: Send + Sync {
    /// Write one record.
    fn write(&self, level: Level, target: &str, message: &str);
}

/// Sink that forwards to the global stderr formatter, honoring the global level.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl LogSink for StderrSink {
    fn write(&self, level: Level, target: &str, message: &str) {
        crate::log(level, target, message);
    }
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LogSink for NullSink {
    fn write(&self, _level: Level, _target: &str, _message: &str) {}
}

/// Sink that keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<Record>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the captured records, oldest first.
    pub fn records(&self) -> Vec<Record> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Captured messages at the given level.
    pub fn messages_at(&self, level: Level) -> Vec<String> {
        self.records()
            .into_iter()
            .filter(|r| r.level == level)
            .map(|r| r.message)
            .collect()
    }

    /// Drop all captured records.
    pub fn clear(&self) {
        if let Ok(mut records) = self.records.lock() {
            records.clear();
        }
    }
}

impl LogSink for MemorySink {
    fn write(&self, level: Level, target: &str, message: &str) {
        if let Ok(mut records) = self.records.lock() {
            records.push(Record {
                level,
                target: target.to_string(),
                message: message.to_string(),
            });
        }
    }
}

/// Cloneable handle to a [`LogSink`].
///
/// # Examples
///
/// ```
/// use rescue_log::{Level, Logger, MemorySink};
/// use std::sync::Arc;
///
/// let sink = Arc::new(MemorySink::new());
/// let logger = Logger::new(sink.clone());
///
/// logger.info("rescue::engine", "rescheduling in 10 seconds");
///
/// assert_eq!(sink.messages_at(Level::Info), vec!["rescheduling in 10 seconds"]);
/// ```
#[derive(Clone)]
pub struct Logger {
    sink: Arc<dyn LogSink>,
}

impl Logger {
    /// Wrap an arbitrary sink.
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    /// Logger writing through the global stderr formatter.
    pub fn stderr() -> Self {
        Self::new(Arc::new(StderrSink))
    }

    /// Logger that discards everything.
    pub fn null() -> Self {
        Self::new(Arc::new(NullSink))
    }

    /// Write a record at `level`.
    pub fn log(&self, level: Level, target: &str, message: &str) {
        self.sink.write(level, target, message);
    }

    pub fn debug(&self, target: &str, message: &str) {
        self.log(Level::Debug, target, message);
    }

    pub fn info(&self, target: &str, message: &str) {
        self.log(Level::Info, target, message);
    }

    pub fn warn(&self, target: &str, message: &str) {
        self.log(Level::Warn, target, message);
    }

    pub fn error(&self, target: &str, message: &str) {
        self.log(Level::Error, target, message);
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::stderr()
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_captures_in_order() {
        let sink = Arc::new(MemorySink::new());
        let logger = Logger::new(sink.clone());

        logger.info("a", "first");
        logger.warn("b", "second");

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].message, "first");
        assert_eq!(records[1].level, Level::Warn);
        assert_eq!(records[1].target, "b");
    }

    #[test]
    fn test_memory_sink_clear() {
        let sink = MemorySink::new();
        sink.write(Level::Error, "t", "boom");
        sink.clear();
        assert!(sink.records().is_empty());
    }

    #[test]
    fn test_logger_clones_share_sink() {
        let sink = Arc::new(MemorySink::new());
        let logger = Logger::new(sink.clone());
        let copy = logger.clone();

        copy.debug("t", "from clone");

        assert_eq!(sink.messages_at(Level::Debug), vec!["from clone"]);
    }

    #[test]
    fn test_null_logger_accepts_records() {
        Logger::null().error("t", "ignored");
    }
}
