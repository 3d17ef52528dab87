//! Always-on AI desktop companion — the session engine.
//!
//! Animus runs one long-lived companion session over a WebSocket: it hears
//! the user (text or voice), thinks via an external reasoning model, talks
//! back through TTS, and — crucially — keeps talking on its own after the
//! user goes quiet, with the urge to speak backing off exponentially the
//! longer the silence lasts.
//!
//! What it remembers lives in two tiers:
//!
//! | Tier | Contents | Storage |
//! |------|----------|---------|
//! | **Facts** | durable key/value attributes of the user | JSON file |
//! | **Episodes** | embedded one-line summaries of past moments | SQLite + [sqlite-vec](https://github.com/asg017/sqlite-vec) |
//!
//! Episodic recall blends vector similarity with a recency boost; ambient
//! proactive turns instead resurface one random episode.
//!
//! # Modules
//!
//! - [`config`] — Configuration loading from TOML files and environment variables
//! - [`db`] — SQLite database initialization and schema
//! - [`gateway`] — Trait seams for the external reasoning/speech/embedding calls
//! - [`memory`] — Fact table, episodic store, and the recall ranker
//! - [`session`] — Session state machine, history window, orchestrator, scheduler
//! - [`server`] — WebSocket transport and process wiring
//! - [`tools`] — Best-effort local tools (screen capture)

pub mod config;
pub mod db;
pub mod gateway;
pub mod memory;
pub mod server;
pub mod session;
pub mod tools;
