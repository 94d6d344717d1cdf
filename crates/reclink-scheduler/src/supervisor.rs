use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use reclink_capture::{CaptureSettings, CaptureSupervisor};
use reclink_core::{Recording, RecordingId, RecordingStatus, ReclinkConfig, Target, TargetId};
use reclink_platforms::PlatformRegistry;
use reclink_store::LifecycleRepository;

use crate::error::{Result, SchedulerError};
use crate::monitor::{check_once, run_monitor, CheckOutcome, MonitorContext};
use crate::reconcile::{reconcile, ReconcileReport};
use crate::refresher::run_refresher;
use crate::sweeper::{delete_recording_file, run_sweeper, sweep, SweepReport};

/// Upper bound for a cancelled task to wind down before it is aborted.
const TASK_STOP_TIMEOUT: Duration = Duration::from_secs(20);

/// Scheduler knobs resolved from [`ReclinkConfig`].
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub recordings_dir: PathBuf,
    pub poll_interval: Duration,
    pub rotation_interval: Duration,
    pub size_refresh: Duration,
    pub capture: CaptureSettings,
}

impl SchedulerSettings {
    pub fn from_config(config: &ReclinkConfig) -> Self {
        Self {
            recordings_dir: PathBuf::from(&config.storage.recordings_dir),
            poll_interval: Duration::from_secs(config.scheduler.effective_poll_interval_secs()),
            rotation_interval: Duration::from_secs(config.scheduler.rotation_interval_secs.max(1)),
            size_refresh: Duration::from_secs(config.scheduler.size_refresh_secs.max(1)),
            capture: CaptureSettings::from_config(&config.capture),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerInfo {
    pub running: bool,
    pub active_monitor_count: usize,
    pub poll_interval_secs: u64,
}

/// Per-target monitoring state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorStatus {
    pub target_id: TargetId,
    pub platform: String,
    pub display_name: String,
    pub enabled: bool,
    pub monitoring: bool,
}

struct TaskHandle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl TaskHandle {
    fn is_live(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Cancel, wait up to [`TASK_STOP_TIMEOUT`], then abort.
    async fn shutdown(mut self, what: &str) {
        self.cancel.cancel();
        if timeout(TASK_STOP_TIMEOUT, &mut self.handle).await.is_err() {
            warn!(task = what, "task did not stop in time, aborting");
            self.handle.abort();
        }
    }
}

/// Owns the target monitors, the rotation sweeper and the size refresher,
/// and is the only way to change targets while the scheduler runs.
pub struct SchedulerSupervisor {
    ctx: Arc<MonitorContext>,
    settings: SchedulerSettings,
    running: AtomicBool,
    /// Serializes start, stop and target edits. Held by whoever spawns or
    /// retires monitors, so the map always owns every live monitor.
    lifecycle: Mutex<()>,
    monitors: Mutex<HashMap<TargetId, TaskHandle>>,
    background: Mutex<Vec<(&'static str, TaskHandle)>>,
}

impl SchedulerSupervisor {
    pub fn new(
        repo: Arc<dyn LifecycleRepository>,
        platforms: Arc<PlatformRegistry>,
        settings: SchedulerSettings,
    ) -> Self {
        let capture = CaptureSupervisor::new(repo.clone(), platforms.clone(), settings.capture.clone());
        Self {
            ctx: Arc::new(MonitorContext::new(
                repo,
                platforms,
                capture,
                settings.recordings_dir.clone(),
            )),
            settings,
            running: AtomicBool::new(false),
            lifecycle: Mutex::new(()),
            monitors: Mutex::new(HashMap::new()),
            background: Mutex::new(Vec::new()),
        }
    }

    pub fn capture(&self) -> &CaptureSupervisor {
        &self.ctx.capture
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Reconcile, then start one monitor per enabled target plus the sweeper
    /// and the size refresher. A no-op when already running.
    ///
    /// # Errors
    ///
    /// `Io` if the recordings directory cannot be created; `Store` if the
    /// enabled targets cannot be listed. Reconciliation errors are logged.
    pub async fn start(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.settings.recordings_dir).await?;
        match reconcile(&*self.ctx.repo) {
            Ok(report) if report == ReconcileReport::default() => {}
            Ok(report) => info!(fixed = report.total(), "startup reconciliation applied"),
            Err(e) => error!("startup reconciliation failed: {e}"),
        }

        let targets = self.ctx.repo.list_enabled_targets()?;
        for target in &targets {
            self.install_monitor(target.id.clone()).await;
        }

        let mut background = self.background.lock().await;
        let cancel = CancellationToken::new();
        background.push((
            "rotation sweeper",
            TaskHandle {
                handle: tokio::spawn(run_sweeper(
                    self.ctx.repo.clone(),
                    self.settings.rotation_interval,
                    cancel.clone(),
                )),
                cancel,
            },
        ));
        let cancel = CancellationToken::new();
        background.push((
            "size refresher",
            TaskHandle {
                handle: tokio::spawn(run_refresher(
                    self.ctx.repo.clone(),
                    self.settings.size_refresh,
                    cancel.clone(),
                )),
                cancel,
            },
        ));

        self.running.store(true, Ordering::SeqCst);
        info!(
            monitors = targets.len(),
            poll_interval = ?self.settings.poll_interval,
            dir = %self.settings.recordings_dir.display(),
            "scheduler started"
        );
        Ok(())
    }

    /// Stop monitors and background tasks, then every capture. A no-op when
    /// not running.
    pub async fn stop(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        let monitors: Vec<_> = self.monitors.lock().await.drain().collect();
        monitors.iter().for_each(|(_, m)| m.cancel.cancel());
        for (_, monitor) in monitors {
            monitor.shutdown("monitor").await;
        }
        let background: Vec<_> = self.background.lock().await.drain(..).collect();
        for (name, task) in background {
            task.shutdown(name).await;
        }
        let stopped = self.ctx.capture.stop_all().await;
        info!(captures_stopped = stopped, "scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn info(&self) -> SchedulerInfo {
        let monitors = self.monitors.lock().await;
        SchedulerInfo {
            running: self.is_running(),
            active_monitor_count: monitors.values().filter(|m| m.is_live()).count(),
            poll_interval_secs: self.settings.poll_interval.as_secs(),
        }
    }

    fn spawn_monitor(&self, target_id: TargetId) -> TaskHandle {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_monitor(
            self.ctx.clone(),
            target_id,
            self.settings.poll_interval,
            cancel.clone(),
        ));
        TaskHandle { cancel, handle }
    }

    /// Spawn a monitor for `target_id` and register it. A monitor already
    /// registered for the target is shut down, never dropped.
    async fn install_monitor(&self, target_id: TargetId) {
        let monitor = self.spawn_monitor(target_id.clone());
        let previous = self.monitors.lock().await.insert(target_id, monitor);
        if let Some(previous) = previous {
            previous.shutdown("monitor").await;
        }
    }

    /// Stop the monitor for `target_id`; with `cascade` its captures too.
    async fn stop_monitor(&self, target_id: &TargetId, cascade: bool) -> Result<()> {
        let monitor = self.monitors.lock().await.remove(target_id);
        if let Some(monitor) = monitor {
            monitor.shutdown("monitor").await;
        }
        if cascade {
            let stopped = self.ctx.capture.stop_target(target_id).await?;
            if stopped > 0 {
                info!(target_id = %target_id, count = stopped, "stopped captures for target");
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Targets
    // -----------------------------------------------------------------------

    /// Validate and persist `target`, then align its monitor with `enabled`.
    ///
    /// Editing an enabled target restarts its monitor and hands any running
    /// capture to the new one. Disabling stops the monitor and its captures.
    #[instrument(skip(self, target), fields(target_id = %target.id))]
    pub async fn upsert_target(&self, mut target: Target) -> Result<Target> {
        target
            .validate()
            .map_err(|e| SchedulerError::InvalidTarget(e.to_string()))?;
        if !self.ctx.platforms.contains(&target.platform) {
            return Err(SchedulerError::InvalidTarget(format!(
                "unknown platform {:?} (known: {})",
                target.platform,
                self.ctx.platforms.names().join(", ")
            )));
        }

        let _lifecycle = self.lifecycle.lock().await;
        let now = Utc::now();
        match self.ctx.repo.get_target(&target.id)? {
            Some(existing) => {
                target.created_at = existing.created_at;
                target.updated_at = now;
                self.ctx.repo.update_target(&target)?;
                info!(enabled = target.enabled, "target updated");
            }
            None => {
                target.updated_at = now;
                self.ctx.repo.create_target(&target)?;
                info!(enabled = target.enabled, "target created");
            }
        }

        if self.is_running() {
            if target.enabled {
                self.stop_monitor(&target.id, false).await?;
                self.install_monitor(target.id.clone()).await;
            } else {
                self.stop_monitor(&target.id, true).await?;
            }
        }
        Ok(target)
    }

    /// Stop monitoring, stop captures and delete the target. Its recordings
    /// stay, detached from any target.
    #[instrument(skip(self))]
    pub async fn remove_target(&self, target_id: &TargetId) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.ctx.repo.get_target(target_id)?.is_none() {
            return Err(SchedulerError::TargetNotFound {
                id: target_id.to_string(),
            });
        }
        self.stop_monitor(target_id, true).await?;
        self.ctx.repo.delete_target(target_id)?;
        self.ctx.forget(target_id).await;
        info!("target removed");
        Ok(())
    }

    pub fn targets(&self) -> Result<Vec<Target>> {
        Ok(self.ctx.repo.list_targets()?)
    }

    pub async fn monitor_statuses(&self) -> Result<Vec<MonitorStatus>> {
        let targets = self.ctx.repo.list_targets()?;
        let monitors = self.monitors.lock().await;
        Ok(targets
            .into_iter()
            .map(|t| MonitorStatus {
                monitoring: monitors.get(&t.id).is_some_and(TaskHandle::is_live),
                target_id: t.id,
                platform: t.platform,
                display_name: t.display_name,
                enabled: t.enabled,
            })
            .collect())
    }

    /// One liveness check for `target_id` right now, whether or not the
    /// scheduler is running.
    #[instrument(skip(self))]
    pub async fn trigger_check_now(&self, target_id: &TargetId) -> Result<CheckOutcome> {
        if self.ctx.repo.get_target(target_id)?.is_none() {
            return Err(SchedulerError::TargetNotFound {
                id: target_id.to_string(),
            });
        }
        check_once(&self.ctx, target_id, &CancellationToken::new()).await
    }

    // -----------------------------------------------------------------------
    // Recordings
    // -----------------------------------------------------------------------

    pub fn active_recordings(&self) -> Result<Vec<Recording>> {
        Ok(self
            .ctx
            .repo
            .list_recordings_by_status(&[RecordingStatus::Pending, RecordingStatus::Recording])?)
    }

    /// Stop every active recording, watched or not. Returns how many.
    pub async fn stop_all_recordings(&self) -> Result<usize> {
        let mut ids = self.ctx.capture.watched_ids().await;
        for rec in self.active_recordings()? {
            if !ids.contains(&rec.id) {
                ids.push(rec.id);
            }
        }
        let mut stopped = 0;
        for id in &ids {
            match self.ctx.capture.stop(id).await {
                Ok(true) => stopped += 1,
                Ok(false) => {}
                Err(e) => warn!(recording_id = %id, "failed to stop recording: {e}"),
            }
        }
        info!(count = stopped, "stopped all recordings");
        Ok(stopped)
    }

    /// One rotation sweep right now.
    pub async fn run_rotation_cleanup(&self) -> SweepReport {
        sweep(&*self.ctx.repo).await
    }

    pub fn set_favorite(&self, id: &RecordingId, favorite: bool) -> Result<()> {
        self.ctx.repo.set_favorite(id, favorite)?;
        info!(recording_id = %id, favorite, "favorite flag changed");
        Ok(())
    }

    /// Delete a finished recording's file and row.
    #[instrument(skip(self))]
    pub async fn delete_recording(&self, id: &RecordingId) -> Result<()> {
        let Some(rec) = self.ctx.repo.get_recording(id)? else {
            return Err(SchedulerError::RecordingNotFound { id: id.to_string() });
        };
        if rec.status.is_active() {
            return Err(SchedulerError::RecordingActive { id: id.to_string() });
        }
        delete_recording_file(&rec).await?;
        self.ctx.repo.delete_recording(id)?;
        info!(file = %rec.file_path.display(), "recording deleted");
        Ok(())
    }
}
