//! Which recordings a retention policy wants gone.
//!
//! Pure: no I/O, no clock. The sweeper feeds it a target's history and
//! deletes whatever comes back.

use chrono::{DateTime, Duration, Utc};

use reclink_core::{Recording, RetentionPolicy, RotationType};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Recordings of `history` that `policy` selects for deletion at `now`,
/// newest first.
///
/// Active (`pending`/`recording`) rows are never selected. Favorites are
/// dropped from the result when `protect_favorites` is set, after limits are
/// evaluated, so a protected favorite can leave a target over its limit.
pub fn select_for_deletion<'a>(
    history: &'a [Recording],
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> Vec<&'a Recording> {
    let mut candidates: Vec<&Recording> =
        history.iter().filter(|r| !r.status.is_active()).collect();
    candidates.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.as_str().cmp(a.id.as_str()))
    });
    candidates.dedup_by(|a, b| a.id == b.id);

    let mut selected = vec![false; candidates.len()];
    if policy.rotation_enabled {
        match policy.rotation_type {
            Some(RotationType::Count) => {
                if let Some(max) = policy.max_count {
                    for flag in selected.iter_mut().skip(max as usize) {
                        *flag = true;
                    }
                }
            }
            Some(RotationType::Time) => {
                if let Some(days) = policy.max_age_days {
                    let cutoff = now - Duration::days(i64::from(days));
                    for (flag, rec) in selected.iter_mut().zip(&candidates) {
                        *flag = rec.created_at < cutoff;
                    }
                }
            }
            Some(RotationType::Size) => {
                if let Some(gb) = policy.max_size_gb {
                    let limit = gb * BYTES_PER_GB;
                    let mut total = 0u64;
                    let mut over = false;
                    for (flag, rec) in selected.iter_mut().zip(&candidates) {
                        total = total.saturating_add(rec.file_size);
                        over = over || total as f64 > limit;
                        *flag = over;
                    }
                }
            }
            None => {}
        }
    }
    if policy.delete_empty_files {
        for (flag, rec) in selected.iter_mut().zip(&candidates) {
            if rec.file_size == 0 {
                *flag = true;
            }
        }
    }

    candidates
        .into_iter()
        .zip(selected)
        .filter(|(rec, flag)| *flag && !(policy.protect_favorites && rec.is_favorite))
        .map(|(rec, _)| rec)
        .collect()
}
