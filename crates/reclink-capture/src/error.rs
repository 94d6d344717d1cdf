//! Error types for the reclink-capture crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error(transparent)]
    Store(#[from] reclink_store::StoreError),

    /// The state machine refused a transition.
    #[error(transparent)]
    Core(#[from] reclink_core::CoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CaptureError>;
