use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS messages (
            conversation_id TEXT NOT NULL,
            seq             INTEGER NOT NULL,
            id              TEXT NOT NULL UNIQUE,
            author_id       TEXT NOT NULL,
            content         TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            PRIMARY KEY (conversation_id, seq)
        );

        CREATE TABLE IF NOT EXISTS reports (
            id              TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL,
            author_id       TEXT NOT NULL,
            content         TEXT NOT NULL,
            reason          TEXT,
            reported_at     TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_reports_reported_at
            ON reports(reported_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
