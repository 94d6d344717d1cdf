//! Keeps `file_size` and `duration` of running recordings current.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use reclink_core::types::file_size_on_disk;
use reclink_core::RecordingStatus;
use reclink_store::LifecycleRepository;

use crate::error::Result;

/// One pass over `recording` rows. Returns how many rows were updated.
pub fn refresh_once(repo: &dyn LifecycleRepository) -> Result<usize> {
    let now = Utc::now();
    let mut updated = 0;
    for rec in repo.list_recordings_by_status(&[RecordingStatus::Recording])? {
        let size = file_size_on_disk(&rec.file_path).unwrap_or(rec.file_size);
        let duration = rec.elapsed_secs(now);
        if size == rec.file_size && rec.duration == Some(duration) {
            continue;
        }
        if repo.update_progress(&rec.id, size, duration)? {
            updated += 1;
        }
    }
    Ok(updated)
}

pub(crate) async fn run_refresher(
    repo: Arc<dyn LifecycleRepository>,
    every: Duration,
    cancel: CancellationToken,
) {
    info!(?every, "size refresher started");
    let mut ticker = interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => match refresh_once(&*repo) {
                Ok(0) => {}
                Ok(n) => debug!(count = n, "refreshed running recordings"),
                Err(e) => warn!("size refresh failed: {e}"),
            },
        }
    }
    info!("size refresher stopped");
}
