//! The WebSocket session server: one process, one active session.
//!
//! Wires the database, fact table, gateway, and session state into an axum
//! router with a `/ws` endpoint (the session transport) and a `/health`
//! liveness check. Each connection gets its own outbound writer task and
//! its own proactive scheduler; the scheduler dies with the connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::AnimusConfig;
use crate::db;
use crate::gateway::openai::OpenAiGateway;
use crate::gateway::{Embedder, Reasoner, SpeechGateway};
use crate::memory::facts::FactStore;
use crate::memory::MemoryEngine;
use crate::session::orchestrator::Orchestrator;
use crate::session::{scheduler, Mode, SessionHandle};
use crate::tools::{self, ScreenCapture};

// ── Message envelope ──────────────────────────────────────────────────────────

/// Frames the client sends us.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Inbound {
    TextInput { text: String },
    AudioInput { audio_base64: String },
    Interrupt,
}

/// Frames we send the client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Outbound {
    StateUpdate {
        state: Mode,
    },
    /// Echo of a transcribed audio frame.
    TextInput {
        text: String,
    },
    AudioChunk {
        text: String,
        audio_base64: Option<String>,
        expression: String,
    },
}

// ── Shared state ──────────────────────────────────────────────────────────────

pub struct AppState {
    session: SessionHandle,
    memory: Arc<MemoryEngine>,
    reasoner: Arc<dyn Reasoner>,
    speech: Arc<dyn SpeechGateway>,
    capture: Arc<dyn ScreenCapture>,
    /// One active session per process — a second connection is refused.
    connected: AtomicBool,
    started_at: std::time::Instant,
}

fn setup_shared_state(config: &AnimusConfig) -> Result<Arc<AppState>> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path, config.embedding.dimensions)?;
    let conn = Arc::new(Mutex::new(conn));

    let facts = FactStore::open(config.resolved_facts_path())?;
    tracing::info!(facts = facts.len(), "fact table loaded");

    let gateway = Arc::new(OpenAiGateway::new(
        config.llm.clone(),
        config.speech.clone(),
        config.embedding.clone(),
    )?);

    let memory = Arc::new(MemoryEngine::new(
        conn,
        facts,
        gateway.clone() as Arc<dyn Embedder>,
    ));
    let session = SessionHandle::new(
        Duration::from_secs(config.session.base_idle_secs),
        Duration::from_secs(config.session.max_idle_secs),
    );
    let capture = tools::capture_from_config(&config.tools);

    Ok(Arc::new(AppState {
        session,
        memory,
        reasoner: gateway.clone(),
        speech: gateway,
        capture,
        connected: AtomicBool::new(false),
        started_at: std::time::Instant::now(),
    }))
}

// ── Server ────────────────────────────────────────────────────────────────────

pub async fn serve(config: AnimusConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let state = setup_shared_state(&config)?;

    let router = Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "session server listening at ws://{bind_addr}/ws");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to listen for ctrl-c");
            tracing::info!("shutting down session server");
        })
        .await?;

    Ok(())
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    if state
        .connected
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        tracing::warn!("rejecting second concurrent connection");
        return StatusCode::CONFLICT.into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state))
        .into_response()
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    tracing::info!("session connected");
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();

    // Outbound writer: the orchestrator and scheduler both feed this queue.
    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, "outbound serialization failed");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let orchestrator = Orchestrator::new(
        state.session.clone(),
        state.memory.clone(),
        state.reasoner.clone(),
        state.speech.clone(),
        state.capture.clone(),
        tx,
    );
    let scheduler = tokio::spawn(scheduler::run(orchestrator.clone()));

    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "websocket error");
                break;
            }
        };
        match message {
            Message::Text(text) => match serde_json::from_str::<Inbound>(&text) {
                Ok(inbound) => dispatch(&orchestrator, &state, inbound),
                Err(e) => tracing::warn!(error = %e, "unrecognized inbound frame"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    // Teardown: the scheduler dies with the connection. An in-flight turn
    // still completes its side effects; its frames just go nowhere.
    scheduler.abort();
    writer.abort();
    state.connected.store(false, Ordering::SeqCst);
    tracing::info!("session disconnected");
}

fn dispatch(orchestrator: &Orchestrator, state: &Arc<AppState>, inbound: Inbound) {
    // every inbound frame counts as activity
    state.session.note_activity();
    match inbound {
        Inbound::TextInput { text } => {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.handle_user_turn(text).await });
        }
        Inbound::AudioInput { audio_base64 } => {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.handle_audio_turn(audio_base64).await });
        }
        Inbound::Interrupt => {
            tracing::info!("user interrupt");
            state.session.interrupt();
        }
    }
}
