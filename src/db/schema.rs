//! SQL DDL for the episodic store.
//!
//! Defines the `episodes` table, the `episodes_vec` (vec0) virtual table, and
//! `schema_meta`. All DDL uses `IF NOT EXISTS` for idempotent initialization.
//! Episodes are append-only; there is no update or delete path.

use rusqlite::{params, Connection, OptionalExtension};

/// Schema DDL for the plain tables.
const SCHEMA_SQL: &str = r#"
-- Append-only episode log
CREATE TABLE IF NOT EXISTS episodes (
    id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL,
    date TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_episodes_date ON episodes(date);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables for the given embedding width. Idempotent.
///
/// The vec0 virtual table bakes the vector width into its DDL, so the width
/// is recorded in `schema_meta` and checked on open.
pub fn init_schema(conn: &Connection, dimensions: usize) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    let vec_sql = format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS episodes_vec USING vec0(\n\
         id TEXT PRIMARY KEY,\n\
         embedding FLOAT[{dimensions}]\n\
         );"
    );
    conn.execute_batch(&vec_sql)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('embedding_dimensions', ?1)",
        params![dimensions.to_string()],
    )?;

    Ok(())
}

/// The embedding width the database was created with, if recorded.
pub fn stored_dimensions(conn: &Connection) -> rusqlite::Result<Option<usize>> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM schema_meta WHERE key = 'embedding_dimensions'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value.and_then(|v| v.parse().ok()))
}
