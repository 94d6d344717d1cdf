use std::sync::Arc;

use async_trait::async_trait;

use reclink_core::StreamInfo;

use crate::error::Result;
use crate::probe::StreamProbe;
use crate::provider::PlatformProvider;

/// YouTube live, detected by probing the channel's `/live` URL.
pub struct YoutubeProvider {
    probe: Arc<StreamProbe>,
}

impl YoutubeProvider {
    pub fn new(probe: Arc<StreamProbe>) -> Self {
        Self { probe }
    }
}

/// Accepts a channel id (`UC…`, 24 chars), an `@handle`, a URL or path, or a
/// bare username.
pub fn live_url(broadcaster_id: &str) -> String {
    let id = broadcaster_id.trim();
    if id.starts_with("UC") && id.len() == 24 {
        format!("https://www.youtube.com/channel/{id}/live")
    } else if id.starts_with('@') {
        format!("https://www.youtube.com/{id}/live")
    } else if id.starts_with("http") || id.contains('/') {
        let url = if id.starts_with("http") {
            id.to_string()
        } else {
            format!("https://www.youtube.com/{}", id.trim_start_matches('/'))
        };
        if url.contains("/live") {
            url
        } else {
            format!("{}/live", url.trim_end_matches('/'))
        }
    } else {
        format!("https://www.youtube.com/@{id}/live")
    }
}

#[async_trait]
impl PlatformProvider for YoutubeProvider {
    fn name(&self) -> &str {
        "youtube"
    }

    fn stream_url(&self, broadcaster_id: &str) -> String {
        live_url(broadcaster_id)
    }

    async fn get_stream_info(&self, broadcaster_id: &str) -> Result<Option<StreamInfo>> {
        if !self.probe.is_live(&live_url(broadcaster_id)).await? {
            return Ok(None);
        }
        let name = broadcaster_id.trim().trim_start_matches('@');
        Ok(Some(StreamInfo::live(broadcaster_id, name)))
    }

    fn build_capture_args(&self, _broadcaster_id: &str, _quality: &str) -> Vec<String> {
        vec!["--stream-segment-threads".into(), "2".into()]
    }
}
