//! Two-tier memory: the fact table and the episodic vector store, plus the
//! ranking layer that turns raw KNN hits into prompt-ready candidates.
//!
//! [`MemoryEngine`] is the async facade the session engine talks to. It owns
//! the shared connections, routes CPU/IO-bound work through
//! `spawn_blocking`, and absorbs embedding failures into empty results so a
//! broken provider degrades recall instead of killing the turn.

pub mod episodes;
pub mod facts;
pub mod recall;

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::gateway::{Embedder, MemoryOperation};
use facts::FactStore;
use recall::{MemoryCandidate, RECALL_FETCH, RECALL_K};

/// Convert an f32 embedding slice to raw bytes for sqlite-vec.
pub fn embedding_to_bytes(embedding: &[f32]) -> &[u8] {
    unsafe {
        std::slice::from_raw_parts(
            embedding.as_ptr() as *const u8,
            embedding.len() * std::mem::size_of::<f32>(),
        )
    }
}

pub struct MemoryEngine {
    conn: Arc<Mutex<Connection>>,
    facts: Arc<Mutex<FactStore>>,
    embedder: Arc<dyn Embedder>,
}

impl MemoryEngine {
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        facts: FactStore,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            conn,
            facts: Arc::new(Mutex::new(facts)),
            embedder,
        }
    }

    /// Ranked episodic recall for a query. Returns an empty list — never an
    /// error — when the store is empty or the embedding call fails; the
    /// caller renders an empty memory section either way.
    pub async fn rank(&self, query: &str) -> Vec<MemoryCandidate> {
        let embedding = match self.embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "query embedding failed, recall skipped");
                return Vec::new();
            }
        };

        let conn = Arc::clone(&self.conn);
        let result = tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
            episodes::nearest_episodes(&conn, &embedding, RECALL_FETCH)
        })
        .await;

        match result {
            Ok(Ok(neighbors)) => {
                let today = chrono::Local::now().date_naive();
                recall::rank_candidates(neighbors, today, RECALL_K)
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "episode search failed, recall skipped");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(error = %e, "episode search task failed, recall skipped");
                Vec::new()
            }
        }
    }

    /// One episode chosen uniformly at random from the whole store, for
    /// ambient turns with no query. Scores are not populated.
    pub async fn surprise_recall(&self) -> Option<MemoryCandidate> {
        let conn = Arc::clone(&self.conn);
        let result = tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
            episodes::random_episode(&conn)
        })
        .await;

        match result {
            Ok(Ok(row)) => row.map(|(content, date)| MemoryCandidate {
                content,
                date,
                similarity: 0.0,
                recency_boost: 1.0,
                final_score: 0.0,
            }),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "random recall failed");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "random recall task failed");
                None
            }
        }
    }

    /// The full fact table as a JSON string for prompt-building.
    pub fn fact_snapshot(&self) -> String {
        self.facts.lock().expect("fact lock poisoned").snapshot()
    }

    /// Apply a memory instruction from the reasoning call: the fact merge
    /// always runs first, then the episode write. An embedding failure skips
    /// the episode (logged) rather than erroring.
    pub async fn apply(&self, op: &MemoryOperation) {
        if let Some(new_facts) = &op.new_facts {
            if !new_facts.is_empty() {
                tracing::info!(count = new_facts.len(), "merging new facts");
                let facts = Arc::clone(&self.facts);
                let new_facts = new_facts.clone();
                let result = tokio::task::spawn_blocking(move || {
                    facts
                        .lock()
                        .map_err(|e| anyhow::anyhow!("fact lock poisoned: {e}"))?
                        .merge(&new_facts)
                })
                .await;
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::error!(error = %e, "fact merge failed"),
                    Err(e) => tracing::error!(error = %e, "fact merge task failed"),
                }
            }
        }

        if let Some(episode) = &op.new_episode {
            if !episode.is_empty() {
                self.store_episode(episode).await;
            }
        }
    }

    async fn store_episode(&self, content: &str) {
        let embedding = match self.embedder.embed(content).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "episode embedding failed, skipping store");
                return;
            }
        };

        let conn = Arc::clone(&self.conn);
        let content = content.to_string();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
            episodes::record_episode(&mut conn, &content, &embedding)
        })
        .await;

        match result {
            Ok(Ok(id)) => tracing::info!(%id, "episode recorded"),
            Ok(Err(e)) => tracing::error!(error = %e, "episode store failed"),
            Err(e) => tracing::error!(error = %e, "episode store task failed"),
        }
    }
}
