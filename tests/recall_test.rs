mod helpers;

use helpers::{harness, spike, ScriptedTurn};

use animus::memory::episodes::record_episode;

/// Insert an episode with a fixed embedding, optionally rewriting its date
/// to simulate age.
fn seed_episode(h: &helpers::Harness, content: &str, embedding: &[f32], date: Option<&str>) {
    let mut conn = h.conn.lock().unwrap();
    record_episode(&mut conn, content, embedding).unwrap();
    if let Some(date) = date {
        conn.execute(
            "UPDATE episodes SET date = ?1 WHERE content = ?2",
            rusqlite::params![date, content],
        )
        .unwrap();
    }
}

#[tokio::test]
async fn rank_returns_nearest_first_for_same_age() {
    let h = harness(vec![]);
    h.embedder.set("what did we talk about?", spike(0));

    seed_episode(&h, "talked about the sea", &spike(0), None);
    seed_episode(&h, "argued about tabs vs spaces", &spike(1), None);

    let ranked = h.memory.rank("what did we talk about?").await;
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].content, "talked about the sea");
    assert!(ranked[0].final_score > ranked[1].final_score);
    // exact match: distance 0 → similarity 1.0, fresh → boost 1.2
    assert!((ranked[0].similarity - 1.0).abs() < 1e-6);
    assert!((ranked[0].recency_boost - 1.2).abs() < 1e-9);
}

#[tokio::test]
async fn fresh_episode_outranks_slightly_closer_ancient_one() {
    let h = harness(vec![]);
    h.embedder.set("query", spike(0));

    // ancient: closer in vector space, boost ×1.0
    let mut close = vec![0.0f32; helpers::DIM];
    close[0] = 0.9;
    close[1] = (1.0f32 - 0.81).sqrt();
    seed_episode(&h, "ancient close memory", &close, Some("2020-01-01"));

    // fresh: a bit farther, boost ×1.2
    let mut farther = vec![0.0f32; helpers::DIM];
    farther[0] = 0.8;
    farther[1] = 0.6;
    seed_episode(&h, "fresh farther memory", &farther, None);

    let ranked = h.memory.rank("query").await;
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].content, "fresh farther memory");
    // the blend, not raw similarity, decided the order
    assert!(ranked[1].similarity > ranked[0].similarity);
}

#[tokio::test]
async fn empty_store_yields_empty_ranking() {
    let h = harness(vec![]);
    let ranked = h.memory.rank("anything").await;
    assert!(ranked.is_empty());
}

#[tokio::test]
async fn embedding_failure_yields_empty_ranking() {
    let h = harness(vec![]);
    seed_episode(&h, "an episode that exists", &spike(0), None);
    h.embedder.fail.store(true, std::sync::atomic::Ordering::SeqCst);

    let ranked = h.memory.rank("anything").await;
    assert!(ranked.is_empty());
}

#[tokio::test]
async fn rank_caps_results_at_three() {
    let h = harness(vec![]);
    h.embedder.set("query", spike(0));
    for i in 0..5 {
        seed_episode(&h, &format!("episode {i}"), &spike(i), None);
    }

    let ranked = h.memory.rank("query").await;
    assert!(ranked.len() <= 3);
}

#[tokio::test]
async fn surprise_recall_returns_some_episode() {
    let h = harness(vec![]);
    assert!(h.memory.surprise_recall().await.is_none());

    seed_episode(&h, "the one memory", &spike(0), None);
    let candidate = h.memory.surprise_recall().await.unwrap();
    assert_eq!(candidate.content, "the one memory");
    assert!(!candidate.date.is_empty());
}

#[tokio::test]
async fn unparsable_date_still_ranks_without_boost() {
    let h = harness(vec![]);
    h.embedder.set("query", spike(0));
    seed_episode(&h, "dateless memory", &spike(0), Some("once upon a time"));

    let ranked = h.memory.rank("query").await;
    assert_eq!(ranked.len(), 1);
    assert!((ranked[0].recency_boost - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn empty_memory_section_still_reaches_the_prompt() {
    // No episodes at all: the turn must still run and the preamble must
    // carry an (empty) memory section rather than omitting the prompt.
    let h = harness(vec![ScriptedTurn::reply(helpers::brain_reply("hi", "happy"))]);

    h.orchestrator.handle_user_turn("hello".into()).await;

    let requests = h.reasoner.requests();
    assert_eq!(requests.len(), 1);
    let preamble = &requests[0].messages[0];
    assert!(preamble.content.contains("Related past moments: (none)"));
}
