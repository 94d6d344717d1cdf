use thiserror::Error;

use crate::types::RecordingStatus;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid filename template: {0}")]
    InvalidTemplate(String),

    #[error("Invalid retention policy: {0}")]
    InvalidPolicy(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Illegal recording transition: {from} -> {to}")]
    InvalidTransition {
        from: RecordingStatus,
        to: RecordingStatus,
    },

    #[error("A failed recording requires a non-empty error message")]
    MissingFailureMessage,

    #[error("Unknown recording status: {0}")]
    UnknownStatus(String),
}

impl CoreError {
    /// Short machine-readable code, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Config(_) => "CONFIG_ERROR",
            CoreError::InvalidTemplate(_) => "INVALID_TEMPLATE",
            CoreError::InvalidPolicy(_) => "INVALID_POLICY",
            CoreError::InvalidTarget(_) => "INVALID_TARGET",
            CoreError::InvalidTransition { .. } => "INVALID_TRANSITION",
            CoreError::MissingFailureMessage => "MISSING_FAILURE_MESSAGE",
            CoreError::UnknownStatus(_) => "UNKNOWN_STATUS",
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
