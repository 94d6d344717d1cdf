use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::{debug, instrument};

use reclink_core::{
    Recording, RecordingId, RecordingStatus, RetentionPolicy, RotationType, Target, TargetId,
};

use crate::db::init_db;
use crate::error::{Result, StoreError};
use crate::repository::LifecycleRepository;

const TARGET_COLUMNS: &str = "id, platform, broadcaster_id, display_name, quality, custom_args,
    output_format, filename_template, enabled, rotation_enabled, rotation_type, max_age_days,
    max_count, max_size_gb, protect_favorites, delete_empty_files, created_at, updated_at";

const RECORDING_COLUMNS: &str = "id, target_id, platform, broadcaster_id, streamer_name, quality,
    file_path, file_name, file_size, start_time, end_time, duration, status, is_favorite,
    error_message, created_at, updated_at";

/// [`LifecycleRepository`] over a single SQLite connection.
///
/// The connection sits behind a `Mutex`; every method holds it only for the
/// duration of its statements.
pub struct SqliteRepository {
    db: Mutex<Connection>,
}

impl SqliteRepository {
    /// Wrap an open connection, creating the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Open (or create) a database file in WAL mode.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;
        Self::new(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl LifecycleRepository for SqliteRepository {
    #[instrument(skip(self, target), fields(target_id = %target.id))]
    fn create_target(&self, target: &Target) -> Result<()> {
        let db = self.conn()?;
        let p = &target.policy;
        db.execute(
            "INSERT INTO targets
             (id, platform, broadcaster_id, display_name, quality, custom_args,
              output_format, filename_template, enabled, rotation_enabled, rotation_type,
              max_age_days, max_count, max_size_gb, protect_favorites, delete_empty_files,
              created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18)",
            params![
                target.id.as_str(),
                target.platform,
                target.broadcaster_id,
                target.display_name,
                target.quality,
                target.custom_args,
                target.output_format,
                target.filename_template,
                target.enabled,
                p.rotation_enabled,
                p.rotation_type.map(|t| t.to_string()),
                p.max_age_days,
                p.max_count,
                p.max_size_gb,
                p.protect_favorites,
                p.delete_empty_files,
                fmt_ts(&target.created_at),
                fmt_ts(&target.updated_at),
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::DuplicateTarget {
                    platform: target.platform.clone(),
                    broadcaster_id: target.broadcaster_id.clone(),
                }
            } else {
                e.into()
            }
        })?;
        debug!("target inserted");
        Ok(())
    }

    #[instrument(skip(self), fields(target_id = %id))]
    fn get_target(&self, id: &TargetId) -> Result<Option<Target>> {
        let db = self.conn()?;
        let target = db
            .query_row(
                &format!("SELECT {TARGET_COLUMNS} FROM targets WHERE id = ?1"),
                [id.as_str()],
                row_to_target,
            )
            .optional()?;
        Ok(target)
    }

    #[instrument(skip(self, target), fields(target_id = %target.id))]
    fn update_target(&self, target: &Target) -> Result<()> {
        let db = self.conn()?;
        let p = &target.policy;
        let rows_changed = db
            .execute(
                "UPDATE targets SET
                    platform = ?2, broadcaster_id = ?3, display_name = ?4, quality = ?5,
                    custom_args = ?6, output_format = ?7, filename_template = ?8,
                    enabled = ?9, rotation_enabled = ?10, rotation_type = ?11,
                    max_age_days = ?12, max_count = ?13, max_size_gb = ?14,
                    protect_favorites = ?15, delete_empty_files = ?16, updated_at = ?17
                 WHERE id = ?1",
                params![
                    target.id.as_str(),
                    target.platform,
                    target.broadcaster_id,
                    target.display_name,
                    target.quality,
                    target.custom_args,
                    target.output_format,
                    target.filename_template,
                    target.enabled,
                    p.rotation_enabled,
                    p.rotation_type.map(|t| t.to_string()),
                    p.max_age_days,
                    p.max_count,
                    p.max_size_gb,
                    p.protect_favorites,
                    p.delete_empty_files,
                    fmt_ts(&target.updated_at),
                ],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::DuplicateTarget {
                        platform: target.platform.clone(),
                        broadcaster_id: target.broadcaster_id.clone(),
                    }
                } else {
                    e.into()
                }
            })?;
        if rows_changed == 0 {
            return Err(StoreError::TargetNotFound {
                id: target.id.to_string(),
            });
        }
        Ok(())
    }

    #[instrument(skip(self), fields(target_id = %id))]
    fn delete_target(&self, id: &TargetId) -> Result<bool> {
        let db = self.conn()?;
        let n = db.execute("DELETE FROM targets WHERE id = ?1", [id.as_str()])?;
        Ok(n > 0)
    }

    fn list_targets(&self) -> Result<Vec<Target>> {
        self.query_targets("1 = 1")
    }

    fn list_enabled_targets(&self) -> Result<Vec<Target>> {
        self.query_targets("enabled = 1")
    }

    fn list_rotation_enabled_targets(&self) -> Result<Vec<Target>> {
        self.query_targets("rotation_enabled = 1")
    }

    #[instrument(skip(self, recording), fields(recording_id = %recording.id))]
    fn create_recording(&self, recording: &Recording) -> Result<()> {
        let db = self.conn()?;
        db.execute(
            &format!(
                "INSERT INTO recordings ({RECORDING_COLUMNS})
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17)"
            ),
            params![
                recording.id.as_str(),
                recording.target_id.as_ref().map(TargetId::as_str),
                recording.platform,
                recording.broadcaster_id,
                recording.streamer_name,
                recording.quality,
                recording.file_path.to_string_lossy().into_owned(),
                recording.file_name,
                recording.file_size as i64,
                recording.start_time.as_ref().map(fmt_ts),
                recording.end_time.as_ref().map(fmt_ts),
                recording.duration,
                recording.status.as_str(),
                recording.is_favorite,
                recording.error_message,
                fmt_ts(&recording.created_at),
                fmt_ts(&recording.updated_at),
            ],
        )
        .map_err(|e| active_conflict(e, recording))?;
        debug!(status = %recording.status, "recording inserted");
        Ok(())
    }

    #[instrument(skip(self), fields(recording_id = %id))]
    fn get_recording(&self, id: &RecordingId) -> Result<Option<Recording>> {
        let db = self.conn()?;
        let recording = db
            .query_row(
                &format!("SELECT {RECORDING_COLUMNS} FROM recordings WHERE id = ?1"),
                [id.as_str()],
                row_to_recording,
            )
            .optional()?;
        Ok(recording)
    }

    #[instrument(skip(self, recording), fields(recording_id = %recording.id, status = %recording.status))]
    fn update_recording(&self, recording: &Recording) -> Result<()> {
        let db = self.conn()?;
        write_recording(&db, recording)
    }

    #[instrument(skip(self, recordings), fields(count = recordings.len()))]
    fn update_recordings(&self, recordings: &[Recording]) -> Result<()> {
        let mut db = self.conn()?;
        let tx = db.transaction()?;
        for recording in recordings {
            write_recording(&tx, recording)?;
        }
        tx.commit()?;
        Ok(())
    }

    #[instrument(skip(self), fields(recording_id = %id))]
    fn delete_recording(&self, id: &RecordingId) -> Result<bool> {
        let db = self.conn()?;
        let n = db.execute("DELETE FROM recordings WHERE id = ?1", [id.as_str()])?;
        Ok(n > 0)
    }

    fn list_recordings(&self, target_id: &TargetId) -> Result<Vec<Recording>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(&format!(
            "SELECT {RECORDING_COLUMNS} FROM recordings
             WHERE target_id = ?1
             ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt.query_map([target_id.as_str()], row_to_recording)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn list_recordings_by_status(&self, statuses: &[RecordingStatus]) -> Result<Vec<Recording>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = (1..=statuses.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(",");
        let db = self.conn()?;
        let mut stmt = db.prepare(&format!(
            "SELECT {RECORDING_COLUMNS} FROM recordings
             WHERE status IN ({placeholders})
             ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt.query_map(
            params_from_iter(statuses.iter().map(|s| s.as_str())),
            row_to_recording,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn list_recent_recordings(&self, limit: usize) -> Result<Vec<Recording>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(&format!(
            "SELECT {RECORDING_COLUMNS} FROM recordings
             ORDER BY created_at DESC, id DESC
             LIMIT ?1"
        ))?;
        let rows = stmt.query_map([limit as i64], row_to_recording)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn active_recording(&self, target_id: &TargetId) -> Result<Option<Recording>> {
        let db = self.conn()?;
        let recording = db
            .query_row(
                &format!(
                    "SELECT {RECORDING_COLUMNS} FROM recordings
                     WHERE target_id = ?1 AND status IN ('pending','recording')"
                ),
                [target_id.as_str()],
                row_to_recording,
            )
            .optional()?;
        Ok(recording)
    }

    fn count_active_recordings(&self, target_id: &TargetId) -> Result<u32> {
        let db = self.conn()?;
        let n: u32 = db.query_row(
            "SELECT COUNT(*) FROM recordings
             WHERE target_id = ?1 AND status IN ('pending','recording')",
            [target_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    #[instrument(skip(self), fields(recording_id = %id))]
    fn set_favorite(&self, id: &RecordingId, favorite: bool) -> Result<()> {
        let db = self.conn()?;
        let rows_changed = db.execute(
            "UPDATE recordings SET is_favorite = ?1, updated_at = ?2 WHERE id = ?3",
            params![favorite, fmt_ts(&Utc::now()), id.as_str()],
        )?;
        if rows_changed == 0 {
            return Err(StoreError::RecordingNotFound { id: id.to_string() });
        }
        Ok(())
    }

    fn update_progress(&self, id: &RecordingId, file_size: u64, duration: i64) -> Result<bool> {
        let db = self.conn()?;
        let n = db.execute(
            "UPDATE recordings SET file_size = ?1, duration = ?2, updated_at = ?3
             WHERE id = ?4 AND status = 'recording'",
            params![file_size as i64, duration, fmt_ts(&Utc::now()), id.as_str()],
        )?;
        Ok(n > 0)
    }
}

impl SqliteRepository {
    fn query_targets(&self, predicate: &str) -> Result<Vec<Target>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(&format!(
            "SELECT {TARGET_COLUMNS} FROM targets WHERE {predicate} ORDER BY created_at, id"
        ))?;
        let rows = stmt.query_map([], row_to_target)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn write_recording(db: &Connection, recording: &Recording) -> Result<()> {
    let rows_changed = db
        .execute(
            "UPDATE recordings SET
                target_id = ?2, streamer_name = ?3, file_path = ?4, file_name = ?5,
                file_size = ?6, start_time = ?7, end_time = ?8, duration = ?9,
                status = ?10, is_favorite = ?11, error_message = ?12, updated_at = ?13
             WHERE id = ?1",
            params![
                recording.id.as_str(),
                recording.target_id.as_ref().map(TargetId::as_str),
                recording.streamer_name,
                recording.file_path.to_string_lossy().into_owned(),
                recording.file_name,
                recording.file_size as i64,
                recording.start_time.as_ref().map(fmt_ts),
                recording.end_time.as_ref().map(fmt_ts),
                recording.duration,
                recording.status.as_str(),
                recording.is_favorite,
                recording.error_message,
                fmt_ts(&recording.updated_at),
            ],
        )
        .map_err(|e| active_conflict(e, recording))?;
    if rows_changed == 0 {
        return Err(StoreError::RecordingNotFound {
            id: recording.id.to_string(),
        });
    }
    Ok(())
}

fn row_to_target(row: &Row<'_>) -> rusqlite::Result<Target> {
    let rotation_type = row
        .get::<_, Option<String>>(10)?
        .map(|s| s.parse::<RotationType>().map_err(|e| conversion_error(10, e)))
        .transpose()?;
    Ok(Target {
        id: TargetId(row.get(0)?),
        platform: row.get(1)?,
        broadcaster_id: row.get(2)?,
        display_name: row.get(3)?,
        quality: row.get(4)?,
        custom_args: row.get(5)?,
        output_format: row.get(6)?,
        filename_template: row.get(7)?,
        enabled: row.get(8)?,
        policy: RetentionPolicy {
            rotation_enabled: row.get(9)?,
            rotation_type,
            max_age_days: row.get(11)?,
            max_count: row.get(12)?,
            max_size_gb: row.get(13)?,
            protect_favorites: row.get(14)?,
            delete_empty_files: row.get(15)?,
        },
        created_at: parse_ts(16, row.get(16)?)?,
        updated_at: parse_ts(17, row.get(17)?)?,
    })
}

fn row_to_recording(row: &Row<'_>) -> rusqlite::Result<Recording> {
    let status = row
        .get::<_, String>(12)?
        .parse::<RecordingStatus>()
        .map_err(|e| conversion_error(12, e))?;
    let start_time = row
        .get::<_, Option<String>>(9)?
        .map(|s| parse_ts(9, s))
        .transpose()?;
    let end_time = row
        .get::<_, Option<String>>(10)?
        .map(|s| parse_ts(10, s))
        .transpose()?;
    Ok(Recording {
        id: RecordingId(row.get(0)?),
        target_id: row.get::<_, Option<String>>(1)?.map(TargetId),
        platform: row.get(2)?,
        broadcaster_id: row.get(3)?,
        streamer_name: row.get(4)?,
        quality: row.get(5)?,
        file_path: PathBuf::from(row.get::<_, String>(6)?),
        file_name: row.get(7)?,
        file_size: row.get::<_, i64>(8)?.max(0) as u64,
        start_time,
        end_time,
        duration: row.get(11)?,
        status,
        is_favorite: row.get(13)?,
        error_message: row.get(14)?,
        created_at: parse_ts(15, row.get(15)?)?,
        updated_at: parse_ts(16, row.get(16)?)?,
    })
}

/// Fixed-width UTC so lexical order matches chronological order.
fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
            if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn active_conflict(e: rusqlite::Error, recording: &Recording) -> StoreError {
    match (&recording.target_id, is_unique_violation(&e)) {
        (Some(target_id), true) => StoreError::ActiveRecordingExists {
            target_id: target_id.to_string(),
        },
        _ => e.into(),
    }
}
