use async_trait::async_trait;
use serde_json::Value;

use reclink_core::config::SoopliveConfig;
use reclink_core::StreamInfo;

use crate::error::{PlatformError, Result};
use crate::provider::PlatformProvider;

const LIVE_API: &str = "https://live.sooplive.co.kr/afreeca/player_live_api.php";

pub struct SoopliveProvider {
    http: reqwest::Client,
    config: SoopliveConfig,
}

impl SoopliveProvider {
    pub fn new(http: reqwest::Client, config: SoopliveConfig) -> Self {
        Self { http, config }
    }
}

/// `CHANNEL.RESULT`: 1 live, -6 live but subscriber-only, 0 offline.
/// Anything else is reported as an error so it is retried next poll.
fn parse_live_response(broadcaster_id: &str, body: &Value) -> Result<Option<StreamInfo>> {
    let channel = body.get("CHANNEL").ok_or_else(|| PlatformError::Response {
        platform: "sooplive",
        reason: "missing CHANNEL object".into(),
    })?;
    let code = channel.get("RESULT").and_then(Value::as_i64);
    match code {
        Some(0) => Ok(None),
        Some(1) | Some(-6) => {
            let name = channel
                .get("BJNICK")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .unwrap_or(broadcaster_id);
            let mut info = StreamInfo::live(broadcaster_id, name);
            info.title = channel
                .get("TITLE")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(String::from);
            Ok(Some(info))
        }
        other => Err(PlatformError::Response {
            platform: "sooplive",
            reason: format!("unexpected CHANNEL.RESULT {other:?}"),
        }),
    }
}

#[async_trait]
impl PlatformProvider for SoopliveProvider {
    fn name(&self) -> &str {
        "sooplive"
    }

    fn stream_url(&self, broadcaster_id: &str) -> String {
        format!("https://play.sooplive.co.kr/{}", broadcaster_id.trim())
    }

    async fn get_stream_info(&self, broadcaster_id: &str) -> Result<Option<StreamInfo>> {
        let resp = self
            .http
            .post(LIVE_API)
            .form(&[
                ("bid", broadcaster_id.trim()),
                ("quality", "original"),
                ("type", "aid"),
                ("pwd", ""),
                ("stream_type", "common"),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(PlatformError::Status {
                platform: "sooplive",
                status: resp.status().as_u16(),
            });
        }
        // Served as text/html, so decode the body ourselves.
        let text = resp.text().await?;
        let body: Value = serde_json::from_str(&text).map_err(|e| PlatformError::Response {
            platform: "sooplive",
            reason: e.to_string(),
        })?;
        parse_live_response(broadcaster_id, &body)
    }

    fn build_capture_args(&self, _broadcaster_id: &str, _quality: &str) -> Vec<String> {
        match (&self.config.username, &self.config.password) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => vec![
                "--soop-username".into(),
                user.clone(),
                "--soop-password".into(),
                pass.clone(),
                "--soop-purge-credentials".into(),
            ],
            _ => Vec::new(),
        }
    }

    fn default_extension(&self) -> &str {
        "ts"
    }
}
