use rusqlite::Connection;

use crate::error::Result;

pub fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- Version tracking
        CREATE TABLE IF NOT EXISTS vsum_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- Generation jobs. seq is the creation order and decides supersession.
        CREATE TABLE IF NOT EXISTS jobs (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id TEXT NOT NULL UNIQUE,
            subject TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'queued',
            progress_percent INTEGER,
            error TEXT,
            model_hint TEXT,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
            updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        );

        -- Immutable summary snapshots, numbered per subject
        CREATE TABLE IF NOT EXISTS summary_versions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            subject TEXT NOT NULL,
            version INTEGER NOT NULL,
            model_used TEXT NOT NULL DEFAULT '',
            generated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
            processing_time_seconds REAL NOT NULL DEFAULT 0,
            summary_text TEXT NOT NULL DEFAULT '',
            transcript_text TEXT,
            task_id TEXT,
            job_seq INTEGER,
            UNIQUE(subject, version)
        );

        -- Indexes for common lookups
        CREATE INDEX IF NOT EXISTS idx_jobs_subject ON jobs(subject, seq);
        CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
        CREATE INDEX IF NOT EXISTS idx_versions_subject ON summary_versions(subject, version);
        ",
    )?;

    // Set schema version
    conn.execute(
        "INSERT OR REPLACE INTO vsum_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
