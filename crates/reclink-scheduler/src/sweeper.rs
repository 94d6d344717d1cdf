use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use reclink_core::{Recording, Target};
use reclink_store::LifecycleRepository;

use crate::error::Result;
use crate::retention::select_for_deletion;

/// Outcome of one rotation sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Rotation-enabled targets examined.
    pub targets: usize,
    /// Recordings whose file and row were removed.
    pub deleted: usize,
    pub freed_bytes: u64,
    /// Targets or recordings that could not be processed.
    pub failures: usize,
}

/// Apply every rotation-enabled target's policy once.
///
/// A failure on one target or recording is counted and logged; the sweep
/// carries on with the rest.
pub async fn sweep(repo: &dyn LifecycleRepository) -> SweepReport {
    let mut report = SweepReport::default();
    let targets = match repo.list_rotation_enabled_targets() {
        Ok(targets) => targets,
        Err(e) => {
            error!("rotation sweep could not list targets: {e}");
            report.failures += 1;
            return report;
        }
    };

    for target in &targets {
        report.targets += 1;
        if let Err(e) = sweep_target(repo, target, &mut report).await {
            warn!(target_id = %target.id, "rotation failed for target: {e}");
            report.failures += 1;
        }
    }

    if report.deleted > 0 || report.failures > 0 {
        info!(
            targets = report.targets,
            deleted = report.deleted,
            freed_bytes = report.freed_bytes,
            failures = report.failures,
            "rotation sweep finished"
        );
    } else {
        debug!(targets = report.targets, "rotation sweep found nothing to delete");
    }
    report
}

async fn sweep_target(
    repo: &dyn LifecycleRepository,
    target: &Target,
    report: &mut SweepReport,
) -> Result<()> {
    let history = repo.list_recordings(&target.id)?;
    for rec in select_for_deletion(&history, &target.policy, Utc::now()) {
        match delete_recording_file(rec).await {
            Ok(()) => {}
            Err(e) => {
                warn!(recording_id = %rec.id, file = %rec.file_path.display(), "could not delete file: {e}");
                report.failures += 1;
                continue;
            }
        }
        if repo.delete_recording(&rec.id)? {
            report.deleted += 1;
            report.freed_bytes += rec.file_size;
            info!(
                target_id = %target.id,
                recording_id = %rec.id,
                file = %rec.file_path.display(),
                bytes = rec.file_size,
                "rotated out recording"
            );
        }
    }
    Ok(())
}

/// Remove the capture file; a file that is already gone counts as deleted.
pub(crate) async fn delete_recording_file(rec: &Recording) -> std::io::Result<()> {
    match tokio::fs::remove_file(&rec.file_path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(recording_id = %rec.id, "file already missing");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Sweep every `every` until cancelled. The first sweep runs one period in.
pub(crate) async fn run_sweeper(
    repo: Arc<dyn LifecycleRepository>,
    every: Duration,
    cancel: CancellationToken,
) {
    info!(?every, "rotation sweeper started");
    let mut ticker = interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                sweep(&*repo).await;
            }
        }
    }
    info!("rotation sweeper stopped");
}
