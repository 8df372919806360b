//! Declaration-time errors.
//!
//! Runtime job failures are never wrapped in these; they travel as the
//! original [`rescue_queue::JobError`].

use thiserror::Error;

/// Result type for rule declaration and configuration.
pub type RescueResult<T> = Result<T, RescueError>;

/// Errors raised while declaring rules or loading configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RescueError {
    /// The error group is empty or names something that is not an error type
    #[error("Invalid error group: {0}")]
    InvalidErrorGroup(String),

    /// Delay is negative, not finite, or not a recognized delay specification
    #[error("Invalid delay: {0}")]
    InvalidDelay(String),

    /// Limit is not a non-negative integer
    #[error("Invalid limit: {0}")]
    InvalidLimit(String),

    /// Jitter is negative or not finite
    #[error("Invalid jitter: {0}")]
    InvalidJitter(String),

    /// Queue is not a usable queue name
    #[error("Invalid queue: {0}")]
    InvalidQueue(String),

    /// A rules document could not be parsed
    #[error("Failed to parse rules: {0}")]
    Parse(String),

    /// A rules document could not be read
    #[error("Failed to load rules: {0}")]
    Load(String),

    /// Job type is not defined in the catalog
    #[error("Unknown job type: {0}")]
    UnknownJobType(String),
}

impl RescueError {
    /// Prefix the message with the location it came from, keeping the kind.
    pub(crate) fn at(self, location: &str) -> Self {
        match self {
            RescueError::InvalidErrorGroup(m) => {
                RescueError::InvalidErrorGroup(format!("{}: {}", location, m))
            }
            RescueError::InvalidDelay(m) => RescueError::InvalidDelay(format!("{}: {}", location, m)),
            RescueError::InvalidLimit(m) => RescueError::InvalidLimit(format!("{}: {}", location, m)),
            RescueError::InvalidJitter(m) => {
                RescueError::InvalidJitter(format!("{}: {}", location, m))
            }
            RescueError::InvalidQueue(m) => RescueError::InvalidQueue(format!("{}: {}", location, m)),
            RescueError::Parse(m) => RescueError::Parse(format!("{}: {}", location, m)),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = RescueError::InvalidJitter("-0.5".to_string());
        assert_eq!(err.to_string(), "Invalid jitter: -0.5");
    }

    #[test]
    fn test_at_keeps_kind() {
        let err = RescueError::InvalidLimit("must be >= 0".to_string()).at("rescue[2]");
        assert_eq!(err, RescueError::InvalidLimit("rescue[2]: must be >= 0".to_string()));
    }
}
