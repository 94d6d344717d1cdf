use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use reclink_core::StreamInfo;

use crate::error::{PlatformError, Result};
use crate::provider::PlatformProvider;

const CHANNEL_API: &str = "https://api.chzzk.naver.com/service/v1/channels";
/// The API rejects requests without a browser user agent.
const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

pub struct ChzzkProvider {
    http: reqwest::Client,
}

impl ChzzkProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

/// `content.openLive` decides liveness; name and description are optional.
fn parse_channel(broadcaster_id: &str, body: &Value) -> Option<StreamInfo> {
    let content = body.get("content").filter(|c| !c.is_null())?;
    if !content.get("openLive").and_then(Value::as_bool).unwrap_or(false) {
        return None;
    }
    let name = content
        .get("channelName")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(broadcaster_id);
    let title = content
        .get("channelDescription")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(String::from);
    let mut info = StreamInfo::live(broadcaster_id, name);
    info.title = title;
    info.thumbnail_url = content
        .get("channelImageUrl")
        .and_then(Value::as_str)
        .map(String::from);
    Some(info)
}

#[async_trait]
impl PlatformProvider for ChzzkProvider {
    fn name(&self) -> &str {
        "chzzk"
    }

    fn stream_url(&self, broadcaster_id: &str) -> String {
        format!("https://chzzk.naver.com/live/{}", broadcaster_id.trim())
    }

    async fn get_stream_info(&self, broadcaster_id: &str) -> Result<Option<StreamInfo>> {
        let resp = self
            .http
            .get(format!("{CHANNEL_API}/{}", broadcaster_id.trim()))
            .header(reqwest::header::USER_AGENT, BROWSER_UA)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(PlatformError::Status {
                platform: "chzzk",
                status: resp.status().as_u16(),
            });
        }
        let body: Value = resp.json().await?;
        let info = parse_channel(broadcaster_id, &body);
        if info.is_none() {
            debug!(%broadcaster_id, "chzzk channel not live");
        }
        Ok(info)
    }

    fn build_capture_args(&self, _broadcaster_id: &str, _quality: &str) -> Vec<String> {
        Vec::new()
    }
}
