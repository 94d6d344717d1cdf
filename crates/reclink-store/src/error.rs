use thiserror::Error;

/// Errors that can occur while reading or writing lifecycle state.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("target not found: {id}")]
    TargetNotFound { id: String },

    #[error("recording not found: {id}")]
    RecordingNotFound { id: String },

    /// Another `pending`/`recording` row already exists for the target.
    #[error("target {target_id} already has an active recording")]
    ActiveRecordingExists { target_id: String },

    #[error("target already exists for {platform}/{broadcaster_id}")]
    DuplicateTarget {
        platform: String,
        broadcaster_id: String,
    },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Core(#[from] reclink_core::CoreError),

    /// A previous holder of the connection lock panicked.
    #[error("database connection lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, StoreError>;
