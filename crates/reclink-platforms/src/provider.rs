use async_trait::async_trait;

use reclink_core::template::{DEFAULT_EXTENSION, DEFAULT_TEMPLATE};
use reclink_core::StreamInfo;

use crate::error::Result;

/// One streaming platform.
#[async_trait]
pub trait PlatformProvider: Send + Sync {
    /// Registry key, matched against `Target::platform`.
    fn name(&self) -> &str;

    /// URL handed to the capture binary for `broadcaster_id`.
    fn stream_url(&self, broadcaster_id: &str) -> String;

    /// `Ok(None)` when the broadcaster is offline.
    async fn get_stream_info(&self, broadcaster_id: &str) -> Result<Option<StreamInfo>>;

    /// Platform-specific flags placed before the generic output/url/quality
    /// arguments.
    fn build_capture_args(&self, broadcaster_id: &str, quality: &str) -> Vec<String>;

    /// File extension used when a target does not set `output_format`.
    fn default_extension(&self) -> &str {
        DEFAULT_EXTENSION
    }

    /// Template used when a target does not set `filename_template`.
    fn default_template(&self) -> &str {
        DEFAULT_TEMPLATE
    }

    /// Executable that performs the capture; `None` uses the configured binary.
    fn capture_program(&self) -> Option<&str> {
        None
    }
}
