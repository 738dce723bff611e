//! The error type returned by the scheduler library.

use thiserror::Error;

/// Everything that can go wrong while configuring or feeding a `Scheduler`.
///
/// Removing an unknown id, starting twice and stopping twice are not errors.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The time coercion produced something that cannot be ordered.
    #[error("invalid time value {raw:?}: not a finite number of seconds")]
    InvalidTime { raw: String },

    /// A configuration value is out of range.
    #[error("invalid scheduler configuration: {0}")]
    InvalidConfig(String),

    /// Loading configuration from a file or the environment failed.
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    /// The default tokio timer was requested outside of a tokio runtime.
    #[error("no tokio runtime available for the default timer")]
    NoRuntime,
}

/// A `Result` alias for scheduler operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;
