use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use reclink_core::config::PlatformsConfig;
use reclink_core::StreamInfo;

use crate::chzzk::ChzzkProvider;
use crate::error::Result;
use crate::probe::StreamProbe;
use crate::provider::PlatformProvider;
use crate::sooplive::SoopliveProvider;
use crate::twitch::TwitchProvider;
use crate::youtube::YoutubeProvider;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Platform name → provider.
#[derive(Default, Clone)]
pub struct PlatformRegistry {
    providers: HashMap<String, Arc<dyn PlatformProvider>>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The four built-in platforms. `capture_binary` doubles as the probe.
    pub fn with_defaults(config: &PlatformsConfig, capture_binary: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(concat!("reclink/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let probe = Arc::new(StreamProbe::new(
            capture_binary,
            Duration::from_secs(config.probe_timeout_secs),
        ));

        let mut registry = Self::new();
        registry.register(Arc::new(TwitchProvider::new(
            http.clone(),
            config.twitch.clone(),
            probe.clone(),
        )));
        registry.register(Arc::new(YoutubeProvider::new(probe)));
        registry.register(Arc::new(ChzzkProvider::new(http.clone())));
        registry.register(Arc::new(SoopliveProvider::new(
            http,
            config.sooplive.clone(),
        )));
        info!(platforms = ?registry.names(), "platform registry ready");
        Ok(registry)
    }

    /// Add or replace the provider registered under `provider.name()`.
    pub fn register(&mut self, provider: Arc<dyn PlatformProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, platform: &str) -> Option<Arc<dyn PlatformProvider>> {
        self.providers.get(platform).cloned()
    }

    pub fn contains(&self, platform: &str) -> bool {
        self.providers.contains_key(platform)
    }

    /// Registered platform names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Liveness lookup that folds "offline", "unknown platform" and transport
    /// errors into `None`; errors are logged and retried on the next poll.
    pub async fn get_stream_info(&self, platform: &str, broadcaster_id: &str) -> Option<StreamInfo> {
        let Some(provider) = self.get(platform) else {
            warn!(%platform, "no provider registered");
            return None;
        };
        match provider.get_stream_info(broadcaster_id).await {
            Ok(Some(info)) if info.is_live => Some(info),
            Ok(_) => {
                debug!(%platform, %broadcaster_id, "offline");
                None
            }
            Err(e) => {
                warn!(%platform, %broadcaster_id, "liveness check failed: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::error::PlatformError;

    struct Fixed {
        name: &'static str,
        answer: fn() -> Result<Option<StreamInfo>>,
    }

    #[async_trait]
    impl PlatformProvider for Fixed {
        fn name(&self) -> &str {
            self.name
        }
        fn stream_url(&self, id: &str) -> String {
            format!("fixed://{id}")
        }
        async fn get_stream_info(&self, _id: &str) -> Result<Option<StreamInfo>> {
            (self.answer)()
        }
        fn build_capture_args(&self, _id: &str, _q: &str) -> Vec<String> {
            Vec::new()
        }
    }

    fn registry() -> PlatformRegistry {
        let mut r = PlatformRegistry::new();
        r.register(Arc::new(Fixed {
            name: "live",
            answer: || Ok(Some(StreamInfo::live("a", "A"))),
        }));
        r.register(Arc::new(Fixed {
            name: "down",
            answer: || Err(PlatformError::Timeout { secs: 1 }),
        }));
        r.register(Arc::new(Fixed {
            name: "stale",
            answer: || {
                let mut info = StreamInfo::live("a", "A");
                info.is_live = false;
                Ok(Some(info))
            },
        }));
        r
    }

    #[tokio::test]
    async fn errors_and_offline_fold_to_none() {
        let r = registry();
        assert!(r.get_stream_info("live", "a").await.is_some());
        assert!(r.get_stream_info("down", "a").await.is_none());
        assert!(r.get_stream_info("stale", "a").await.is_none());
        assert!(r.get_stream_info("nope", "a").await.is_none());
    }

    #[test]
    fn defaults_register_builtin_platforms() {
        let r = PlatformRegistry::with_defaults(&PlatformsConfig::default(), "streamlink").unwrap();
        assert_eq!(r.names(), vec!["chzzk", "sooplive", "twitch", "youtube"]);
        assert!(r.contains("twitch"));
        assert!(!r.contains("kick"));
    }
}
