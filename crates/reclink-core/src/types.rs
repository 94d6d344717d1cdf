//! Domain types shared by every reclink crate.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::template::FilenameTemplate;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a fresh time-ordered ID (UUIDv7).
            pub fn new() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Opaque identifier of a monitored [`Target`].
    TargetId
);

string_id!(
    /// Opaque identifier of one [`Recording`] attempt.
    RecordingId
);

// ---------------------------------------------------------------------------
// Retention policy
// ---------------------------------------------------------------------------

/// Which bound a target's retention policy enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationType {
    /// Delete recordings older than `max_age_days`.
    Time,
    /// Keep only the newest `max_count` recordings.
    Count,
    /// Keep the newest recordings whose combined size fits in `max_size_gb`.
    Size,
}

impl fmt::Display for RotationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RotationType::Time => "time",
            RotationType::Count => "count",
            RotationType::Size => "size",
        };
        write!(f, "{s}")
    }
}

impl FromStr for RotationType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "time" => Ok(RotationType::Time),
            "count" => Ok(RotationType::Count),
            "size" => Ok(RotationType::Size),
            other => Err(CoreError::InvalidPolicy(format!(
                "unknown rotation type: {other}"
            ))),
        }
    }
}

/// Per-target retention policy. Only the parameter matching `rotation_type`
/// is consulted; the other two are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub rotation_enabled: bool,
    pub rotation_type: Option<RotationType>,
    pub max_age_days: Option<u32>,
    pub max_count: Option<u32>,
    pub max_size_gb: Option<f64>,
    /// Favorites are never selected for deletion when set.
    pub protect_favorites: bool,
    /// Zero-byte non-active recordings are always eligible when set.
    pub delete_empty_files: bool,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            rotation_enabled: false,
            rotation_type: None,
            max_age_days: None,
            max_count: None,
            max_size_gb: None,
            protect_favorites: true,
            delete_empty_files: true,
        }
    }
}

impl RetentionPolicy {
    pub fn by_count(max_count: u32) -> Self {
        Self {
            rotation_enabled: true,
            rotation_type: Some(RotationType::Count),
            max_count: Some(max_count),
            ..Self::default()
        }
    }

    pub fn by_age(max_age_days: u32) -> Self {
        Self {
            rotation_enabled: true,
            rotation_type: Some(RotationType::Time),
            max_age_days: Some(max_age_days),
            ..Self::default()
        }
    }

    pub fn by_size(max_size_gb: f64) -> Self {
        Self {
            rotation_enabled: true,
            rotation_type: Some(RotationType::Size),
            max_size_gb: Some(max_size_gb),
            ..Self::default()
        }
    }

    /// Reject an enabled policy whose active parameter is missing or out of range.
    ///
    /// A disabled policy is always valid; its parameters are kept as-is so
    /// re-enabling restores them.
    pub fn validate(&self) -> Result<()> {
        if !self.rotation_enabled {
            return Ok(());
        }
        let kind = self.rotation_type.ok_or_else(|| {
            CoreError::InvalidPolicy("rotation enabled without a rotation type".into())
        })?;
        match kind {
            RotationType::Time => match self.max_age_days {
                Some(d) if d >= 1 => Ok(()),
                _ => Err(CoreError::InvalidPolicy(
                    "time rotation requires max_age_days >= 1".into(),
                )),
            },
            RotationType::Count => match self.max_count {
                Some(n) if n >= 1 => Ok(()),
                _ => Err(CoreError::InvalidPolicy(
                    "count rotation requires max_count >= 1".into(),
                )),
            },
            RotationType::Size => match self.max_size_gb {
                Some(gb) if gb.is_finite() && gb > 0.0 => Ok(()),
                _ => Err(CoreError::InvalidPolicy(
                    "size rotation requires a positive max_size_gb".into(),
                )),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// A broadcaster on a platform that should be captured whenever it is live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    /// Registry key of the platform provider (e.g. `twitch`).
    pub platform: String,
    /// Platform-native channel identifier.
    pub broadcaster_id: String,
    pub display_name: String,
    pub quality: String,
    /// Extra capture arguments, whitespace separated.
    pub custom_args: Option<String>,
    /// File extension without the dot; platform default when unset.
    pub output_format: Option<String>,
    /// Platform default when unset.
    pub filename_template: Option<String>,
    pub enabled: bool,
    pub policy: RetentionPolicy,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Target {
    /// New enabled target with `best` quality and the default retention policy.
    pub fn new(
        platform: impl Into<String>,
        broadcaster_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TargetId::new(),
            platform: platform.into(),
            broadcaster_id: broadcaster_id.into(),
            display_name: display_name.into(),
            quality: "best".to_string(),
            custom_args: None,
            output_format: None,
            filename_template: None,
            enabled: true,
            policy: RetentionPolicy::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Structural checks that do not need the platform registry.
    pub fn validate(&self) -> Result<()> {
        if self.platform.trim().is_empty() {
            return Err(CoreError::InvalidTarget("platform must not be empty".into()));
        }
        if self.broadcaster_id.trim().is_empty() {
            return Err(CoreError::InvalidTarget(
                "broadcaster_id must not be empty".into(),
            ));
        }
        if self.quality.trim().is_empty() {
            return Err(CoreError::InvalidTarget("quality must not be empty".into()));
        }
        if let Some(ext) = &self.output_format {
            if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(CoreError::InvalidTarget(format!(
                    "output_format must be alphanumeric: {ext:?}"
                )));
            }
        }
        if let Some(template) = &self.filename_template {
            FilenameTemplate::parse(template)?;
        }
        self.policy.validate()
    }

    /// Whitespace-split `custom_args`.
    pub fn custom_arg_list(&self) -> Vec<String> {
        self.custom_args
            .as_deref()
            .map(|s| s.split_whitespace().map(String::from).collect())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Recording status
// ---------------------------------------------------------------------------

/// Lifecycle state of a [`Recording`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingStatus {
    /// Row created, capture process not launched yet.
    Pending,
    /// Capture process running.
    Recording,
    Completed,
    Failed,
    /// Legacy state; only ever repaired into `Completed`.
    Cancelled,
}

impl RecordingStatus {
    /// `pending` or `recording`: at most one per target.
    pub fn is_active(self) -> bool {
        matches!(self, RecordingStatus::Pending | RecordingStatus::Recording)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RecordingStatus::Completed | RecordingStatus::Failed)
    }

    pub fn can_transition_to(self, next: RecordingStatus) -> bool {
        use RecordingStatus::*;
        matches!(
            (self, next),
            (Pending, Recording)
                | (Pending, Completed)
                | (Pending, Failed)
                | (Recording, Completed)
                | (Recording, Failed)
                | (Cancelled, Completed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecordingStatus::Pending => "pending",
            RecordingStatus::Recording => "recording",
            RecordingStatus::Completed => "completed",
            RecordingStatus::Failed => "failed",
            RecordingStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RecordingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordingStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(RecordingStatus::Pending),
            "recording" => Ok(RecordingStatus::Recording),
            "completed" => Ok(RecordingStatus::Completed),
            "failed" => Ok(RecordingStatus::Failed),
            "cancelled" => Ok(RecordingStatus::Cancelled),
            other => Err(CoreError::UnknownStatus(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Recording
// ---------------------------------------------------------------------------

/// One capture attempt and the file it produced.
///
/// Status changes go through [`Recording::mark_recording`],
/// [`Recording::complete`] and [`Recording::fail`]; each refuses a transition
/// the state machine does not allow and leaves the value untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub id: RecordingId,
    /// `None` once the owning target has been deleted.
    pub target_id: Option<TargetId>,
    pub platform: String,
    pub broadcaster_id: String,
    pub streamer_name: String,
    pub quality: String,
    pub file_path: PathBuf,
    pub file_name: String,
    pub file_size: u64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Whole seconds between `start_time` and `end_time`.
    pub duration: Option<i64>,
    pub status: RecordingStatus,
    pub is_favorite: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Recording {
    /// A fresh `pending` row for `target`, writing to `file_path`.
    pub fn pending(target: &Target, streamer_name: &str, file_path: PathBuf) -> Self {
        let now = Utc::now();
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            id: RecordingId::new(),
            target_id: Some(target.id.clone()),
            platform: target.platform.clone(),
            broadcaster_id: target.broadcaster_id.clone(),
            streamer_name: streamer_name.to_string(),
            quality: target.quality.clone(),
            file_path,
            file_name,
            file_size: 0,
            start_time: None,
            end_time: None,
            duration: None,
            status: RecordingStatus::Pending,
            is_favorite: false,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// `pending -> recording`; stamps `start_time`.
    pub fn mark_recording(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.check(RecordingStatus::Recording)?;
        self.status = RecordingStatus::Recording;
        self.start_time = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Move to `completed`, stamping `end_time`/`duration` and clearing any
    /// error. A repaired `cancelled` row keeps an end time it already has.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.check(RecordingStatus::Completed)?;
        let end = match (self.status, self.end_time) {
            (RecordingStatus::Cancelled, Some(end)) => end,
            _ => now,
        };
        self.status = RecordingStatus::Completed;
        self.finish_at(end);
        self.error_message = None;
        self.updated_at = now;
        Ok(())
    }

    /// Move to `failed` with a diagnostic `message`, which must not be blank.
    pub fn fail(&mut self, message: impl Into<String>, now: DateTime<Utc>) -> Result<()> {
        let message = message.into();
        if message.trim().is_empty() {
            return Err(CoreError::MissingFailureMessage);
        }
        self.check(RecordingStatus::Failed)?;
        self.status = RecordingStatus::Failed;
        self.finish_at(now);
        self.error_message = Some(message);
        self.updated_at = now;
        Ok(())
    }

    /// Seconds elapsed since `start_time` (or row creation) at `now`.
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> i64 {
        let start = self.start_time.unwrap_or(self.created_at);
        (now - start).num_seconds().max(0)
    }

    /// Size of the capture file on disk, `None` when it does not exist.
    pub fn disk_size(&self) -> Option<u64> {
        file_size_on_disk(&self.file_path)
    }

    fn finish_at(&mut self, end: DateTime<Utc>) {
        self.end_time = Some(end);
        self.duration = Some(self.elapsed_secs(end));
    }

    fn check(&self, next: RecordingStatus) -> Result<()> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(CoreError::InvalidTransition {
                from: self.status,
                to: next,
            })
        }
    }
}

/// `metadata().len()` for regular files, `None` otherwise.
pub fn file_size_on_disk(path: &Path) -> Option<u64> {
    std::fs::metadata(path)
        .ok()
        .filter(|m| m.is_file())
        .map(|m| m.len())
}

// ---------------------------------------------------------------------------
// StreamInfo
// ---------------------------------------------------------------------------

/// Live-status snapshot returned by a platform provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub streamer_id: String,
    pub streamer_name: String,
    pub title: Option<String>,
    pub is_live: bool,
    pub viewer_count: Option<u64>,
    pub thumbnail_url: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

impl StreamInfo {
    /// Minimal live snapshot for providers that only learn "is live".
    pub fn live(streamer_id: impl Into<String>, streamer_name: impl Into<String>) -> Self {
        Self {
            streamer_id: streamer_id.into(),
            streamer_name: streamer_name.into(),
            title: None,
            is_live: true,
            viewer_count: None,
            thumbnail_url: None,
            started_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn recording() -> Recording {
        let target = Target::new("twitch", "somebody", "Somebody");
        Recording::pending(&target, "Somebody", PathBuf::from("/tmp/x/somebody.mp4"))
    }

    #[test]
    fn pending_row_is_denormalized() {
        let target = Target::new("twitch", "somebody", "Somebody");
        let rec = Recording::pending(&target, "Some Body", PathBuf::from("/r/twitch/a.mp4"));
        assert_eq!(rec.status, RecordingStatus::Pending);
        assert_eq!(rec.target_id.as_ref(), Some(&target.id));
        assert_eq!(rec.platform, "twitch");
        assert_eq!(rec.file_name, "a.mp4");
        assert_eq!(rec.quality, "best");
    }

    #[test]
    fn happy_path_duration() {
        let mut rec = recording();
        let start = Utc::now();
        rec.mark_recording(start).unwrap();
        rec.complete(start + Duration::seconds(120)).unwrap();
        assert_eq!(rec.status, RecordingStatus::Completed);
        assert_eq!(rec.duration, Some(120));
        assert_eq!(rec.end_time, Some(start + Duration::seconds(120)));
    }

    #[test]
    fn terminal_states_are_final() {
        let mut rec = recording();
        let now = Utc::now();
        rec.mark_recording(now).unwrap();
        rec.fail("boom", now).unwrap();
        assert!(rec.complete(now).is_err());
        assert!(rec.mark_recording(now).is_err());
        assert!(rec.fail("again", now).is_err());
        assert_eq!(rec.status, RecordingStatus::Failed);
        assert_eq!(rec.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn fail_requires_message() {
        let mut rec = recording();
        let err = rec.fail("   ", Utc::now()).unwrap_err();
        assert!(matches!(err, CoreError::MissingFailureMessage));
        assert_eq!(rec.status, RecordingStatus::Pending);
    }

    #[test]
    fn complete_clears_error_message() {
        let mut rec = recording();
        rec.status = RecordingStatus::Cancelled;
        rec.error_message = Some("stale".into());
        rec.complete(Utc::now()).unwrap();
        assert!(rec.error_message.is_none());
    }

    #[test]
    fn cancelled_repair_keeps_end_time() {
        let mut rec = recording();
        let start = Utc::now() - Duration::hours(2);
        let end = start + Duration::minutes(30);
        rec.status = RecordingStatus::Cancelled;
        rec.start_time = Some(start);
        rec.end_time = Some(end);
        rec.complete(Utc::now()).unwrap();
        assert_eq!(rec.end_time, Some(end));
        assert_eq!(rec.duration, Some(1800));
    }

    #[test]
    fn transition_table() {
        use RecordingStatus::*;
        assert!(Pending.can_transition_to(Recording));
        assert!(Pending.can_transition_to(Completed));
        assert!(Recording.can_transition_to(Failed));
        assert!(!Recording.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Recording.can_transition_to(Cancelled));
        assert!(Cancelled.can_transition_to(Completed));
    }

    #[test]
    fn status_string_round_trip() {
        for s in ["pending", "recording", "completed", "failed", "cancelled"] {
            let parsed: RecordingStatus = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s);
        }
        assert!("paused".parse::<RecordingStatus>().is_err());
    }

    #[test]
    fn policy_validation() {
        assert!(RetentionPolicy::default().validate().is_ok());
        assert!(RetentionPolicy::by_count(3).validate().is_ok());
        assert!(RetentionPolicy::by_count(0).validate().is_err());
        assert!(RetentionPolicy::by_age(0).validate().is_err());
        assert!(RetentionPolicy::by_size(f64::NAN).validate().is_err());
        assert!(RetentionPolicy::by_size(0.5).validate().is_ok());

        let missing_type = RetentionPolicy {
            rotation_enabled: true,
            ..RetentionPolicy::default()
        };
        assert!(missing_type.validate().is_err());

        // Parameters of other rotation types are ignored.
        let mut count = RetentionPolicy::by_count(2);
        count.max_age_days = Some(0);
        assert!(count.validate().is_ok());
    }

    #[test]
    fn target_validation() {
        let mut t = Target::new("twitch", "abc", "Abc");
        assert!(t.validate().is_ok());

        t.filename_template = Some("{streamer_id}_{nope}".into());
        assert!(matches!(t.validate(), Err(CoreError::InvalidTemplate(_))));

        t.filename_template = None;
        t.output_format = Some("m p4".into());
        assert!(matches!(t.validate(), Err(CoreError::InvalidTarget(_))));

        t.output_format = Some("ts".into());
        t.broadcaster_id = " ".into();
        assert!(t.validate().is_err());
    }

    #[test]
    fn custom_args_split_on_whitespace() {
        let mut t = Target::new("twitch", "abc", "Abc");
        assert!(t.custom_arg_list().is_empty());
        t.custom_args = Some("  --retry-streams 5\t--hls-live-edge 3 ".into());
        assert_eq!(
            t.custom_arg_list(),
            vec!["--retry-streams", "5", "--hls-live-edge", "3"]
        );
    }

    #[test]
    fn disk_size_reads_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = recording();
        rec.file_path = dir.path().join("cap.ts");
        assert_eq!(rec.disk_size(), None);
        std::fs::write(&rec.file_path, b"12345").unwrap();
        assert_eq!(rec.disk_size(), Some(5));
        // Directories do not count as capture files.
        rec.file_path = dir.path().to_path_buf();
        assert_eq!(rec.disk_size(), None);
    }
}
