//! Error types for the RL core library

use thiserror::Error;

/// Core error type for RL operations
#[derive(Error, Debug)]
pub enum RLError {
    /// Malformed configuration or telemetry that makes a computation undefined
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Action index outside the enumerated action table
    #[error("Invalid action: index {index} is outside 0..{count}")]
    InvalidAction { index: usize, count: usize },

    /// Not enough stored transitions to satisfy a sample request
    #[error("Insufficient data: requested {requested}, only {available} available")]
    InsufficientData { requested: usize, available: usize },

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),

    /// Checkpoint blob is unreadable or incompatible with the network
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Operation addressed a round session that was never opened
    #[error("Unknown session: {0}")]
    UnknownSession(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl RLError {
    /// Shorthand for a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Whether this error is the routine "not enough data yet" case
    #[must_use]
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, Self::InsufficientData { .. })
    }
}

/// Result type alias for RL operations
pub type Result<T> = std::result::Result<T, RLError>;
