//! Startup reconciliation of recording rows left behind by an unclean exit.
//!
//! Two passes that are planned separately and committed together:
//!
//! * crash recovery: rows still `recording` or `pending` have no process
//!   behind them any more and are finalized;
//! * data repair: `cancelled` rows with a usable file are promoted to
//!   `completed`, and `completed` rows whose stored size is zero get their
//!   real size.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use reclink_core::types::file_size_on_disk;
use reclink_core::{Recording, RecordingStatus};
use reclink_store::LifecycleRepository;

use crate::error::Result;

pub(crate) const INTERRUPTED_MESSAGE: &str =
    "capture was interrupted before it started (scheduler restarted)";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// `recording` rows finalized as `completed`.
    pub recovered: usize,
    /// `pending` rows finalized (completed if a file exists, else failed).
    pub pending_resolved: usize,
    /// `cancelled` rows promoted to `completed`.
    pub promoted: usize,
    /// `completed` rows whose size was corrected.
    pub resized: usize,
}

impl ReconcileReport {
    pub fn total(&self) -> usize {
        self.recovered + self.pending_resolved + self.promoted + self.resized
    }
}

/// Finalize active rows. `size_of` is the on-disk size lookup.
pub fn plan_crash_recovery(
    rows: &[Recording],
    now: DateTime<Utc>,
    size_of: impl Fn(&Recording) -> Option<u64>,
    report: &mut ReconcileReport,
) -> Vec<Recording> {
    let mut plan = Vec::new();
    for row in rows {
        let mut rec = row.clone();
        let disk = size_of(&rec);
        let planned = match rec.status {
            RecordingStatus::Recording => {
                if let Some(size) = disk {
                    rec.file_size = size;
                }
                report.recovered += 1;
                rec.complete(now)
            }
            RecordingStatus::Pending => {
                report.pending_resolved += 1;
                match disk.filter(|&size| size > 0) {
                    Some(size) => {
                        rec.file_size = size;
                        rec.complete(now)
                    }
                    None => rec.fail(INTERRUPTED_MESSAGE, now),
                }
            }
            _ => continue,
        };
        match planned {
            Ok(()) => plan.push(rec),
            Err(e) => warn!(recording_id = %row.id, "skipping crash recovery: {e}"),
        }
    }
    plan
}

/// Promote usable `cancelled` rows and fix zero sizes on `completed` rows.
pub fn plan_data_repairs(
    rows: &[Recording],
    now: DateTime<Utc>,
    size_of: impl Fn(&Recording) -> Option<u64>,
    report: &mut ReconcileReport,
) -> Vec<Recording> {
    let mut plan = Vec::new();
    for row in rows {
        let Some(size) = size_of(row).filter(|&size| size > 0) else {
            continue;
        };
        match row.status {
            RecordingStatus::Cancelled => {
                let mut rec = row.clone();
                rec.file_size = size;
                match rec.complete(now) {
                    Ok(()) => {
                        report.promoted += 1;
                        plan.push(rec);
                    }
                    Err(e) => warn!(recording_id = %row.id, "skipping repair: {e}"),
                }
            }
            RecordingStatus::Completed if row.file_size == 0 => {
                let mut rec = row.clone();
                rec.file_size = size;
                rec.updated_at = now;
                report.resized += 1;
                plan.push(rec);
            }
            _ => {}
        }
    }
    plan
}

/// Run both passes against `repo` and commit them as one batch.
pub fn reconcile(repo: &dyn LifecycleRepository) -> Result<ReconcileReport> {
    let now = Utc::now();
    let mut report = ReconcileReport::default();
    let disk = |rec: &Recording| file_size_on_disk(&rec.file_path);

    let active =
        repo.list_recordings_by_status(&[RecordingStatus::Pending, RecordingStatus::Recording])?;
    let mut batch = plan_crash_recovery(&active, now, disk, &mut report);

    let settled =
        repo.list_recordings_by_status(&[RecordingStatus::Cancelled, RecordingStatus::Completed])?;
    batch.extend(plan_data_repairs(&settled, now, disk, &mut report));

    if !batch.is_empty() {
        repo.update_recordings(&batch)?;
    }
    if report.total() > 0 {
        info!(
            recovered = report.recovered,
            pending = report.pending_resolved,
            promoted = report.promoted,
            resized = report.resized,
            "reconciled recordings from previous run"
        );
    }
    Ok(report)
}
