//! Similarity-plus-recency ranking over episodic recall.
//!
//! KNN distances become a bounded similarity score, fresher episodes get a
//! multiplicative boost, and the blended score decides the final order. The
//! scoring itself is pure so it can be tested without a database.

use chrono::NaiveDate;

use crate::memory::episodes::Neighbor;

/// How many neighbors to pull from the vector index per query.
pub const RECALL_FETCH: usize = 3;
/// How many ranked candidates a query returns.
pub const RECALL_K: usize = 3;

/// Age assigned to episodes whose date does not parse.
const UNPARSABLE_AGE_DAYS: i64 = 9999;

/// A ranked recall candidate. Ephemeral — computed per query, never stored.
#[derive(Debug, Clone)]
pub struct MemoryCandidate {
    pub content: String,
    pub date: String,
    pub similarity: f64,
    pub recency_boost: f64,
    pub final_score: f64,
}

/// Blend similarity and recency, sort, and keep the top `k`.
///
/// The sort is stable and descending on `final_score`, so ties keep their
/// original (similarity) order.
pub fn rank_candidates(neighbors: Vec<Neighbor>, today: NaiveDate, k: usize) -> Vec<MemoryCandidate> {
    let mut candidates: Vec<MemoryCandidate> = neighbors
        .into_iter()
        .map(|n| {
            // distance 0 maps to 1.0 and decays from there; the +1 keeps the
            // score bounded and division safe
            let similarity = 1.0 / (1.0 + n.distance);
            let recency_boost = recency_boost(days_since(&n.date, today));
            MemoryCandidate {
                final_score: similarity * recency_boost,
                content: n.content,
                date: n.date,
                similarity,
                recency_boost,
            }
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(k);
    candidates
}

/// Boost tiers: ×1.2 within 3 days, ×1.1 within 30, ×1.0 beyond.
fn recency_boost(age_days: i64) -> f64 {
    if age_days <= 3 {
        1.2
    } else if age_days <= 30 {
        1.1
    } else {
        1.0
    }
}

/// Whole days between an episode date and `today`. Unparsable dates count
/// as ancient rather than erroring.
fn days_since(date: &str, today: NaiveDate) -> i64 {
    match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        Ok(parsed) => (today - parsed).num_days(),
        Err(_) => UNPARSABLE_AGE_DAYS,
    }
}
