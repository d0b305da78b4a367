//! SQLite DDL for the voice/job registry.
//!
//! All `CREATE TABLE` / `CREATE INDEX` statements live here so they are
//! reviewable and testable in isolation.

use rusqlite::Connection;

pub(crate) const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Complete DDL for the registry database.
///
/// Uses `IF NOT EXISTS` throughout so `apply_schema` is idempotent.
pub(crate) const SCHEMA_SQL: &str = r#"
-- Enable WAL mode for concurrent reads during writes.
PRAGMA journal_mode = WAL;

-- Enforce foreign key constraints.
PRAGMA foreign_keys = ON;

-- Schema version tracking.
CREATE TABLE IF NOT EXISTS schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Invited users. Rows are never hard-deleted; revocation is a status flip.
CREATE TABLE IF NOT EXISTS users (
    id            TEXT PRIMARY KEY,
    username      TEXT NOT NULL UNIQUE,
    invite_status TEXT NOT NULL DEFAULT 'pending',
    role          TEXT NOT NULL DEFAULT 'user',
    created_at    INTEGER NOT NULL DEFAULT 0,
    updated_at    INTEGER NOT NULL DEFAULT 0
);

-- Voice profiles: uploaded -> training -> ready | failed.
CREATE TABLE IF NOT EXISTS voice_profiles (
    id              TEXT PRIMARY KEY,
    user_id         TEXT NOT NULL REFERENCES users(id),
    name            TEXT NOT NULL,
    audio_path      TEXT NOT NULL,
    status          TEXT NOT NULL DEFAULT 'uploaded',
    provider_job_id TEXT,
    error_reason    TEXT,
    created_at      INTEGER NOT NULL DEFAULT 0,
    updated_at      INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_voices_user     ON voice_profiles(user_id);
CREATE INDEX IF NOT EXISTS idx_voices_provider ON voice_profiles(provider_job_id);

-- Generation jobs: queued -> processing -> complete | failed.
-- voice_id is intentionally not a foreign key: jobs are immutable history
-- and survive deletion of their voice profile.
CREATE TABLE IF NOT EXISTS generation_jobs (
    id              TEXT PRIMARY KEY,
    user_id         TEXT NOT NULL REFERENCES users(id),
    voice_id        TEXT NOT NULL,
    text            TEXT NOT NULL,
    exaggeration    REAL NOT NULL DEFAULT 0.5,
    pace            REAL NOT NULL DEFAULT 0.5,
    temperature     REAL NOT NULL DEFAULT 0.8,
    status          TEXT NOT NULL DEFAULT 'queued',
    provider_job_id TEXT,
    output_path     TEXT,
    error_reason    TEXT,
    created_at      INTEGER NOT NULL DEFAULT 0,
    updated_at      INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_jobs_user     ON generation_jobs(user_id);
CREATE INDEX IF NOT EXISTS idx_jobs_voice    ON generation_jobs(voice_id);
CREATE INDEX IF NOT EXISTS idx_jobs_provider ON generation_jobs(provider_job_id);

"#;

/// Apply the full schema to an open connection.
///
/// Safe to call multiple times. Seeds the schema version on a fresh database.
pub(crate) fn apply_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
        [CURRENT_SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

/// Read the stored schema version, if any.
pub(crate) fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<u32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_meta WHERE key = 'schema_version'")?;
    let mut rows = stmt.query([])?;
    match rows.next()? {
        Some(row) => {
            let value: String = row.get(0)?;
            Ok(value.parse().ok())
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();
        apply_schema(&conn).unwrap();
        assert_eq!(
            read_schema_version(&conn).unwrap(),
            Some(CURRENT_SCHEMA_VERSION)
        );
    }
}
