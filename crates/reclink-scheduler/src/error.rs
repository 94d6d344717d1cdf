use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Rejected by `upsert_target`: bad template, policy or platform.
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("target not found: {id}")]
    TargetNotFound { id: String },

    #[error("recording not found: {id}")]
    RecordingNotFound { id: String },

    #[error("recording {id} is still active")]
    RecordingActive { id: String },

    #[error(transparent)]
    Store(#[from] reclink_store::StoreError),

    #[error(transparent)]
    Capture(#[from] reclink_capture::CaptureError),

    #[error(transparent)]
    Core(#[from] reclink_core::CoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
