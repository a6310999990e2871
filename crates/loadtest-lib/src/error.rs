//! Error taxonomy for the load test
//!
//! Only [`LoadTestError::Config`] is fatal. Everything else is absorbed at
//! the poller, sampler or iteration boundary and turned into a log line
//! plus a failure outcome.

use thiserror::Error;

/// Errors raised by load test components
#[derive(Debug, Error)]
pub enum LoadTestError {
    /// The API answered with a status the caller does not accept
    #[error("unexpected status {status}: {body}")]
    Transport { status: u16, body: String },

    /// The request never produced a response
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A response body could not be interpreted
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// The readiness attempt budget ran out
    #[error("readiness not reached after {attempts} attempts")]
    Timeout { attempts: u32 },

    /// Startup configuration is missing or invalid
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A Kubernetes quantity string could not be converted
    #[error("invalid quantity: {0:?}")]
    InvalidQuantity(String),
}

impl LoadTestError {
    /// Whether this error must abort the run before load generation
    pub fn is_fatal(&self) -> bool {
        matches!(self, LoadTestError::Config(_))
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            LoadTestError::Transport { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for LoadTestError {
    fn from(err: serde_json::Error) -> Self {
        LoadTestError::Parse(err.to_string())
    }
}

impl From<config::ConfigError> for LoadTestError {
    fn from(err: config::ConfigError) -> Self {
        LoadTestError::Config(err.to_string())
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, LoadTestError>;
