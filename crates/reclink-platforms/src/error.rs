use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{platform} API returned HTTP {status}")]
    Status { platform: &'static str, status: u16 },

    #[error("unexpected {platform} response: {reason}")]
    Response {
        platform: &'static str,
        reason: String,
    },

    #[error("probe failed to start: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("probe timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("unknown platform: {0}")]
    Unknown(String),
}

pub type Result<T> = std::result::Result<T, PlatformError>;
