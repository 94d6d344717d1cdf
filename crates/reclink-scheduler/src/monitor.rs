use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use reclink_capture::CaptureSupervisor;
use reclink_core::template::sanitize_component;
use reclink_core::{FilenameTemplate, Recording, RecordingId, StreamInfo, Target, TargetId, TemplateVars};
use reclink_platforms::{PlatformProvider, PlatformRegistry};
use reclink_store::{LifecycleRepository, StoreError};

use crate::error::Result;

/// Highest numeric suffix tried before giving up on a unique file name.
const MAX_NAME_SUFFIX: u32 = 10_000;

/// Result of one check cycle for a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "recording_id", rename_all = "snake_case")]
pub enum CheckOutcome {
    /// Target disabled or deleted; the monitor should exit.
    Disabled,
    AlreadyRecording,
    Offline,
    Started(RecordingId),
    /// A recording row was created but the capture could not be launched.
    StartFailed(RecordingId),
}

/// Everything a check cycle needs. Shared by all monitors.
pub(crate) struct MonitorContext {
    pub repo: Arc<dyn LifecycleRepository>,
    pub platforms: Arc<PlatformRegistry>,
    pub capture: CaptureSupervisor,
    pub recordings_dir: PathBuf,
    check_locks: Mutex<HashMap<TargetId, Arc<Mutex<()>>>>,
}

impl MonitorContext {
    pub fn new(
        repo: Arc<dyn LifecycleRepository>,
        platforms: Arc<PlatformRegistry>,
        capture: CaptureSupervisor,
        recordings_dir: PathBuf,
    ) -> Self {
        Self {
            repo,
            platforms,
            capture,
            recordings_dir,
            check_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn check_lock(&self, target_id: &TargetId) -> Arc<Mutex<()>> {
        let mut locks = self.check_locks.lock().await;
        locks.entry(target_id.clone()).or_default().clone()
    }

    pub async fn forget(&self, target_id: &TargetId) {
        self.check_locks.lock().await.remove(target_id);
    }
}

/// One liveness check for `target_id`, starting a capture when it is live.
///
/// Serialized per target: a trigger and the monitor loop never interleave.
/// `cancel` only interrupts the liveness lookup; once a recording row exists
/// the cycle runs to the end so the row always gets a process or a failure.
pub(crate) async fn check_once(
    ctx: &MonitorContext,
    target_id: &TargetId,
    cancel: &CancellationToken,
) -> Result<CheckOutcome> {
    let lock = ctx.check_lock(target_id).await;
    let _guard = lock.lock().await;

    let Some(target) = ctx.repo.get_target(target_id)? else {
        return Ok(CheckOutcome::Disabled);
    };
    if !target.enabled {
        return Ok(CheckOutcome::Disabled);
    }
    if ctx.repo.count_active_recordings(target_id)? > 0 {
        return Ok(CheckOutcome::AlreadyRecording);
    }

    let lookup = ctx
        .platforms
        .get_stream_info(&target.platform, &target.broadcaster_id);
    let info = tokio::select! {
        _ = cancel.cancelled() => return Ok(CheckOutcome::Offline),
        info = lookup => info,
    };
    let Some(info) = info else {
        return Ok(CheckOutcome::Offline);
    };
    let Some(provider) = ctx.platforms.get(&target.platform) else {
        return Ok(CheckOutcome::Offline);
    };

    let path = output_path(
        &ctx.recordings_dir,
        &target,
        provider.as_ref(),
        &info,
        Local::now().naive_local(),
    )?;
    let recording = Recording::pending(&target, &info.streamer_name, path);
    match ctx.repo.create_recording(&recording) {
        Ok(()) => {}
        Err(StoreError::ActiveRecordingExists { .. }) => return Ok(CheckOutcome::AlreadyRecording),
        Err(e) => return Err(e.into()),
    }
    info!(
        target_id = %target.id,
        recording_id = %recording.id,
        streamer = %info.streamer_name,
        title = ?info.title,
        "target is live, starting capture"
    );

    let id = recording.id.clone();
    if ctx.capture.start(recording, &target).await? {
        Ok(CheckOutcome::Started(id))
    } else {
        Ok(CheckOutcome::StartFailed(id))
    }
}

/// `<recordings_dir>/<platform>/<rendered name>`, made unique with `_N`.
pub(crate) fn output_path(
    recordings_dir: &Path,
    target: &Target,
    provider: &dyn PlatformProvider,
    info: &StreamInfo,
    now: NaiveDateTime,
) -> Result<PathBuf> {
    let template = FilenameTemplate::parse(
        target
            .filename_template
            .as_deref()
            .unwrap_or(provider.default_template()),
    )?;
    let extension = target
        .output_format
        .clone()
        .unwrap_or_else(|| provider.default_extension().to_string());
    let file_name = template.render(&TemplateVars {
        streamer_id: target.broadcaster_id.clone(),
        streamer_name: Some(info.streamer_name.clone()),
        platform: target.platform.clone(),
        title: info.title.clone(),
        quality: target.quality.clone(),
        timestamp: now,
        extension,
    });
    let dir = recordings_dir.join(sanitize_component(&target.platform));
    Ok(unique_path(&dir, &file_name))
}

fn unique_path(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }
    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (file_name, None),
    };
    for n in 1..=MAX_NAME_SUFFIX {
        let name = match ext {
            Some(ext) => format!("{stem}_{n}.{ext}"),
            None => format!("{stem}_{n}"),
        };
        let path = dir.join(name);
        if !path.exists() {
            return path;
        }
    }
    warn!(dir = %dir.display(), %file_name, "no free file name suffix, reusing base name");
    candidate
}

/// Poll `target_id` until cancelled or the target is disabled/removed.
///
/// A monitor that exits on its own stops the target's captures. When it is
/// cancelled, the caller decides whether they are stopped or handed over.
pub(crate) async fn run_monitor(
    ctx: Arc<MonitorContext>,
    target_id: TargetId,
    poll_interval: Duration,
    cancel: CancellationToken,
) {
    info!(target_id = %target_id, ?poll_interval, "monitor started");
    loop {
        if cancel.is_cancelled() {
            break;
        }
        match check_once(&ctx, &target_id, &cancel).await {
            Ok(CheckOutcome::Disabled) => {
                info!(target_id = %target_id, "target disabled or removed, monitor exiting");
                if let Err(e) = ctx.capture.stop_target(&target_id).await {
                    warn!(target_id = %target_id, "failed to stop captures: {e}");
                }
                return;
            }
            Ok(CheckOutcome::StartFailed(id)) => {
                warn!(target_id = %target_id, recording_id = %id, "capture failed to launch");
            }
            Ok(outcome) => debug!(target_id = %target_id, ?outcome, "check finished"),
            Err(e) => warn!(target_id = %target_id, "check failed: {e}"),
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }
    info!(target_id = %target_id, "monitor stopped");
}
