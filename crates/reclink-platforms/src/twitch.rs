use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use reclink_core::config::TwitchConfig;
use reclink_core::StreamInfo;

use crate::error::{PlatformError, Result};
use crate::probe::StreamProbe;
use crate::provider::PlatformProvider;

const TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";
const STREAMS_URL: &str = "https://api.twitch.tv/helix/streams";
/// Refresh app tokens this long before Twitch says they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Deserialize)]
struct StreamsResponse {
    data: Vec<HelixStream>,
}

#[derive(Debug, Deserialize)]
struct HelixStream {
    user_login: String,
    user_name: String,
    #[serde(default)]
    title: String,
    viewer_count: Option<u64>,
    #[serde(default)]
    thumbnail_url: String,
    started_at: Option<DateTime<Utc>>,
}

impl HelixStream {
    fn into_info(self) -> StreamInfo {
        let thumbnail = self
            .thumbnail_url
            .replace("{width}", "320")
            .replace("{height}", "180");
        StreamInfo {
            streamer_id: self.user_login,
            streamer_name: self.user_name,
            title: Some(self.title).filter(|t| !t.is_empty()),
            is_live: true,
            viewer_count: self.viewer_count,
            thumbnail_url: Some(thumbnail).filter(|t| !t.is_empty()),
            started_at: self.started_at,
        }
    }
}

/// Twitch via the Helix API, or the dry-run probe when no credentials are set.
pub struct TwitchProvider {
    http: reqwest::Client,
    config: TwitchConfig,
    probe: Arc<StreamProbe>,
    /// Cached app access token and the instant it stops being usable.
    token: Mutex<Option<(String, Instant)>>,
}

impl TwitchProvider {
    pub fn new(http: reqwest::Client, config: TwitchConfig, probe: Arc<StreamProbe>) -> Self {
        Self {
            http,
            config,
            probe,
            token: Mutex::new(None),
        }
    }

    fn has_api_credentials(&self) -> bool {
        self.config.client_id.is_some()
            && (self.config.api_token.is_some() || self.config.client_secret.is_some())
    }

    async fn bearer_token(&self) -> Result<String> {
        if let Some(token) = &self.config.api_token {
            return Ok(token.clone());
        }

        let mut cached = self.token.lock().await;
        if let Some((token, valid_until)) = cached.as_ref() {
            if Instant::now() < *valid_until {
                return Ok(token.clone());
            }
        }

        let (Some(client_id), Some(client_secret)) =
            (&self.config.client_id, &self.config.client_secret)
        else {
            return Err(PlatformError::Response {
                platform: "twitch",
                reason: "client credentials not configured".into(),
            });
        };

        let resp = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(PlatformError::Status {
                platform: "twitch",
                status: resp.status().as_u16(),
            });
        }
        let body: TokenResponse = resp.json().await?;
        let lifetime = Duration::from_secs(body.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        debug!(expires_in = body.expires_in, "twitch app token refreshed");
        *cached = Some((body.access_token.clone(), Instant::now() + lifetime));
        Ok(body.access_token)
    }

    async fn helix_stream(&self, login: &str) -> Result<Option<StreamInfo>> {
        let token = self.bearer_token().await?;
        let client_id = self.config.client_id.as_deref().unwrap_or_default();
        let resp = self
            .http
            .get(STREAMS_URL)
            .query(&[("user_login", login)])
            .bearer_auth(token)
            .header("Client-Id", client_id)
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            // Revoked or expired early: next call fetches a fresh token.
            *self.token.lock().await = None;
        }
        if !resp.status().is_success() {
            return Err(PlatformError::Status {
                platform: "twitch",
                status: resp.status().as_u16(),
            });
        }
        let body: StreamsResponse = resp.json().await?;
        Ok(first_live(body))
    }
}

fn first_live(body: StreamsResponse) -> Option<StreamInfo> {
    body.data.into_iter().next().map(HelixStream::into_info)
}

#[async_trait]
impl PlatformProvider for TwitchProvider {
    fn name(&self) -> &str {
        "twitch"
    }

    fn stream_url(&self, broadcaster_id: &str) -> String {
        format!("https://www.twitch.tv/{}", broadcaster_id.trim().to_lowercase())
    }

    async fn get_stream_info(&self, broadcaster_id: &str) -> Result<Option<StreamInfo>> {
        if self.has_api_credentials() {
            match self.helix_stream(broadcaster_id).await {
                Ok(info) => return Ok(info),
                Err(e) => warn!(%broadcaster_id, "helix lookup failed, probing instead: {e}"),
            }
        }
        let live = self.probe.is_live(&self.stream_url(broadcaster_id)).await?;
        Ok(live.then(|| StreamInfo::live(broadcaster_id, broadcaster_id)))
    }

    fn build_capture_args(&self, _broadcaster_id: &str, _quality: &str) -> Vec<String> {
        ["--twitch-disable-ads", "--stream-segment-threads", "2"]
            .into_iter()
            .map(String::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(config: TwitchConfig) -> TwitchProvider {
        TwitchProvider::new(
            reqwest::Client::new(),
            config,
            Arc::new(StreamProbe::new("streamlink", Duration::from_secs(1))),
        )
    }

    #[test]
    fn parses_helix_streams() {
        let body: StreamsResponse = serde_json::from_str(
            r#"{"data":[{"id":"1","user_id":"2","user_login":"shroud","user_name":"Shroud",
                "title":"ranked","viewer_count":4200,"started_at":"2024-12-25T14:30:00Z",
                "thumbnail_url":"https://cdn/x-{width}x{height}.jpg"}],"pagination":{}}"#,
        )
        .unwrap();
        let info = first_live(body).unwrap();
        assert_eq!(info.streamer_name, "Shroud");
        assert_eq!(info.title.as_deref(), Some("ranked"));
        assert_eq!(info.viewer_count, Some(4200));
        assert_eq!(info.thumbnail_url.as_deref(), Some("https://cdn/x-320x180.jpg"));
        assert!(info.started_at.is_some());

        let offline: StreamsResponse = serde_json::from_str(r#"{"data":[]}"#).unwrap();
        assert!(first_live(offline).is_none());
    }

    #[test]
    fn credentials_detection() {
        assert!(!provider(TwitchConfig::default()).has_api_credentials());
        assert!(provider(TwitchConfig {
            client_id: Some("id".into()),
            client_secret: Some("secret".into()),
            api_token: None,
        })
        .has_api_credentials());
        // A token alone cannot call Helix without a client id.
        assert!(!provider(TwitchConfig {
            client_id: None,
            client_secret: None,
            api_token: Some("tok".into()),
        })
        .has_api_credentials());
    }

    #[test]
    fn url_and_args() {
        let p = provider(TwitchConfig::default());
        assert_eq!(p.stream_url(" Shroud "), "https://www.twitch.tv/shroud");
        assert_eq!(
            p.build_capture_args("shroud", "best"),
            vec!["--twitch-disable-ads", "--stream-segment-threads", "2"]
        );
    }
}
