use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
pub const MIN_POLL_INTERVAL_SECS: u64 = 5;
pub const MAX_POLL_INTERVAL_SECS: u64 = 3600;
pub const DEFAULT_ROTATION_INTERVAL_SECS: u64 = 600; // 10 minutes
pub const DEFAULT_SIZE_REFRESH_SECS: u64 = 10;
pub const DEFAULT_STOP_GRACE_SECS: u64 = 5;
pub const DEFAULT_TAIL_LINES: usize = 10;
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 15;

/// Top-level config (reclink.toml + RECLINK_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReclinkConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub platforms: PlatformsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory; captures land in `<recordings_dir>/<platform>/`.
    #[serde(default = "default_recordings_dir")]
    pub recordings_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            recordings_dir: default_recordings_dir(),
        }
    }
}

/// How the external capture binary is invoked and stopped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_capture_binary")]
    pub binary: String,
    /// Seconds between SIGINT and a forced kill.
    #[serde(default = "default_stop_grace_secs")]
    pub stop_grace_secs: u64,
    /// Lines of stdout/stderr retained per process for failure diagnostics.
    #[serde(default = "default_tail_lines")]
    pub tail_lines: usize,
    /// Appended to every invocation after the platform arguments.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            binary: default_capture_binary(),
            stop_grace_secs: DEFAULT_STOP_GRACE_SECS,
            tail_lines: DEFAULT_TAIL_LINES,
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_rotation_interval_secs")]
    pub rotation_interval_secs: u64,
    #[serde(default = "default_size_refresh_secs")]
    pub size_refresh_secs: u64,
}

impl SchedulerConfig {
    /// Poll interval clamped to [5 s, 3600 s].
    pub fn effective_poll_interval_secs(&self) -> u64 {
        self.poll_interval_secs
            .clamp(MIN_POLL_INTERVAL_SECS, MAX_POLL_INTERVAL_SECS)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            rotation_interval_secs: DEFAULT_ROTATION_INTERVAL_SECS,
            size_refresh_secs: DEFAULT_SIZE_REFRESH_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformsConfig {
    /// Upper bound on a single dry-run liveness probe.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    #[serde(default)]
    pub twitch: TwitchConfig,
    #[serde(default)]
    pub sooplive: SoopliveConfig,
}

impl Default for PlatformsConfig {
    fn default() -> Self {
        Self {
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            twitch: TwitchConfig::default(),
            sooplive: SoopliveConfig::default(),
        }
    }
}

/// Helix credentials. Either an app `client_id` + `client_secret` pair or a
/// pre-issued `api_token` (which still needs `client_id`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TwitchConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub api_token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SoopliveConfig {
    pub username: Option<String>,
    pub password: Option<String>,
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.reclink/reclink.db", home)
}

fn default_recordings_dir() -> String {
    "./recordings".to_string()
}

fn default_capture_binary() -> String {
    "streamlink".to_string()
}

fn default_stop_grace_secs() -> u64 {
    DEFAULT_STOP_GRACE_SECS
}

fn default_tail_lines() -> usize {
    DEFAULT_TAIL_LINES
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_rotation_interval_secs() -> u64 {
    DEFAULT_ROTATION_INTERVAL_SECS
}

fn default_size_refresh_secs() -> u64 {
    DEFAULT_SIZE_REFRESH_SECS
}

fn default_probe_timeout_secs() -> u64 {
    DEFAULT_PROBE_TIMEOUT_SECS
}

impl ReclinkConfig {
    /// Load config from a TOML file with RECLINK_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. `$RECLINK_CONFIG`
    ///   3. ~/.reclink/reclink.toml
    ///
    /// Nested keys use a double underscore, e.g.
    /// `RECLINK_SCHEDULER__POLL_INTERVAL_SECS=30`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("RECLINK_CONFIG").ok())
            .unwrap_or_else(default_config_path);

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("RECLINK_").ignore(&["CONFIG"]).split("__"))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.reclink/reclink.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let cfg: ReclinkConfig = Figment::new()
            .merge(Toml::file(&path))
            .extract()
            .unwrap();
        assert_eq!(cfg.capture.binary, "streamlink");
        assert_eq!(cfg.capture.stop_grace_secs, 5);
        assert_eq!(cfg.capture.tail_lines, 10);
        assert_eq!(cfg.scheduler.poll_interval_secs, 60);
        assert_eq!(cfg.scheduler.rotation_interval_secs, 600);
        assert_eq!(cfg.platforms.probe_timeout_secs, 15);
        assert!(cfg.database.path.ends_with(".reclink/reclink.db"));
    }

    #[test]
    fn toml_sections_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reclink.toml");
        std::fs::write(
            &path,
            r#"
[storage]
recordings_dir = "/srv/captures"

[capture]
binary = "/opt/bin/streamlink"
extra_args = ["--retry-streams", "5"]

[scheduler]
poll_interval_secs = 2

[platforms.twitch]
client_id = "abc"
"#,
        )
        .unwrap();

        let cfg: ReclinkConfig = Figment::new()
            .merge(Toml::file(&path))
            .extract()
            .unwrap();
        assert_eq!(cfg.storage.recordings_dir, "/srv/captures");
        assert_eq!(cfg.capture.binary, "/opt/bin/streamlink");
        assert_eq!(cfg.capture.extra_args, vec!["--retry-streams", "5"]);
        assert_eq!(cfg.platforms.twitch.client_id.as_deref(), Some("abc"));
        assert!(cfg.platforms.twitch.client_secret.is_none());
        // Below the floor: clamped, not rejected.
        assert_eq!(cfg.scheduler.effective_poll_interval_secs(), 5);
    }

    #[test]
    fn poll_interval_ceiling() {
        let cfg = SchedulerConfig {
            poll_interval_secs: 86_400,
            ..SchedulerConfig::default()
        };
        assert_eq!(cfg.effective_poll_interval_secs(), 3600);
    }
}
