//! Write and read paths for the episodic store.
//!
//! Episodes are append-only: content plus its embedding, stamped with an
//! rfc3339 timestamp and a `YYYY-MM-DD` date used by the recency boost.
//! Rows are never edited or deleted.

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

use crate::memory::embedding_to_bytes;

/// A nearest-neighbor hit, before ranking.
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub content: String,
    pub date: String,
    pub distance: f64,
}

/// Append one episode. Both the row and its vector are written in a single
/// transaction. Returns the new episode's id.
pub fn record_episode(conn: &mut Connection, content: &str, embedding: &[f32]) -> Result<String> {
    let tx = conn.transaction()?;

    let id = uuid::Uuid::now_v7().to_string();
    let now = chrono::Local::now();

    tx.execute(
        "INSERT INTO episodes (id, content, created_at, date) VALUES (?1, ?2, ?3, ?4)",
        params![
            id,
            content,
            now.to_rfc3339(),
            now.format("%Y-%m-%d").to_string(),
        ],
    )?;
    tx.execute(
        "INSERT INTO episodes_vec (id, embedding) VALUES (?1, ?2)",
        params![id, embedding_to_bytes(embedding)],
    )?;

    tx.commit()?;
    Ok(id)
}

/// Vector KNN over the episode store. Results arrive ordered by distance.
pub fn nearest_episodes(
    conn: &Connection,
    embedding: &[f32],
    limit: usize,
) -> Result<Vec<Neighbor>> {
    let mut stmt = conn.prepare(
        "SELECT e.content, e.date, v.distance \
         FROM episodes_vec v JOIN episodes e ON e.id = v.id \
         WHERE v.embedding MATCH ?1 ORDER BY v.distance LIMIT ?2",
    )?;
    let results = stmt
        .query_map(params![embedding_to_bytes(embedding), limit as i64], |row| {
            Ok(Neighbor {
                content: row.get(0)?,
                date: row.get(1)?,
                distance: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(results)
}

/// One episode chosen uniformly at random, or `None` on an empty store.
pub fn random_episode(conn: &Connection) -> Result<Option<(String, String)>> {
    let row = conn
        .query_row(
            "SELECT content, date FROM episodes ORDER BY RANDOM() LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    Ok(row)
}

pub fn episode_count(conn: &Connection) -> Result<u64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM episodes", [], |row| row.get(0))?;
    Ok(count as u64)
}
