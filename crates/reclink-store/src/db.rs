use rusqlite::Connection;

use crate::error::Result;

/// Create the targets and recordings tables.
///
/// Idempotent; also switches foreign key enforcement on for `conn`, which
/// SQLite scopes per connection.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS targets (
            id                 TEXT PRIMARY KEY,
            platform           TEXT NOT NULL,
            broadcaster_id     TEXT NOT NULL,
            display_name       TEXT NOT NULL,
            quality            TEXT NOT NULL DEFAULT 'best',
            custom_args        TEXT,
            output_format      TEXT,              -- extension, platform default if NULL
            filename_template  TEXT,              -- platform default if NULL
            enabled            INTEGER NOT NULL DEFAULT 1,
            rotation_enabled   INTEGER NOT NULL DEFAULT 0,
            rotation_type      TEXT,              -- 'time' | 'count' | 'size'
            max_age_days       INTEGER,
            max_count          INTEGER,
            max_size_gb        REAL,
            protect_favorites  INTEGER NOT NULL DEFAULT 1,
            delete_empty_files INTEGER NOT NULL DEFAULT 1,
            created_at         TEXT NOT NULL,
            updated_at         TEXT NOT NULL,
            UNIQUE (platform, broadcaster_id)
        ) STRICT;

        CREATE TABLE IF NOT EXISTS recordings (
            id             TEXT PRIMARY KEY,
            target_id      TEXT REFERENCES targets(id) ON DELETE SET NULL,
            platform       TEXT NOT NULL,
            broadcaster_id TEXT NOT NULL,
            streamer_name  TEXT NOT NULL,
            quality        TEXT NOT NULL,
            file_path      TEXT NOT NULL,
            file_name      TEXT NOT NULL,
            file_size      INTEGER NOT NULL DEFAULT 0,
            start_time     TEXT,
            end_time       TEXT,
            duration       INTEGER,           -- seconds
            status         TEXT NOT NULL
                CHECK (status IN ('pending','recording','completed','failed','cancelled')),
            is_favorite    INTEGER NOT NULL DEFAULT 0,
            error_message  TEXT,
            created_at     TEXT NOT NULL,
            updated_at     TEXT NOT NULL,
            CHECK (status <> 'failed' OR (error_message IS NOT NULL AND error_message <> ''))
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_recordings_target
            ON recordings(target_id, created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_recordings_status
            ON recordings(status);
        -- at most one pending/recording row per target
        CREATE UNIQUE INDEX IF NOT EXISTS idx_recordings_one_active
            ON recordings(target_id)
            WHERE status IN ('pending','recording') AND target_id IS NOT NULL;",
    )?;
    Ok(())
}
