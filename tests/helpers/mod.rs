#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::Connection;
use tokio::sync::mpsc;

use animus::db;
use animus::gateway::{
    BrainReply, Embedder, GatewayError, MemoryOperation, ReasoningRequest, Reasoner,
    SpeechGateway,
};
use animus::memory::facts::FactStore;
use animus::memory::MemoryEngine;
use animus::server::Outbound;
use animus::session::orchestrator::Orchestrator;
use animus::session::SessionHandle;
use animus::tools::{CaptureDisabled, ScreenCapture};

/// Embedding width used by all test fixtures.
pub const DIM: usize = 8;

/// Unit vector along dimension `seed`.
pub fn spike(seed: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; DIM];
    v[seed % DIM] = 1.0;
    v
}

/// A scripted reply from a test, without touching memory.
pub fn brain_reply(reply: &str, emotion: &str) -> BrainReply {
    BrainReply {
        thought: "test thought".into(),
        reply: reply.into(),
        emotion: emotion.into(),
        memory_operation: MemoryOperation::default(),
    }
}

// ── Mock gateway ──────────────────────────────────────────────────────────────

pub struct ScriptedTurn {
    result: Result<BrainReply, String>,
    delay: Duration,
}

impl ScriptedTurn {
    pub fn reply(reply: BrainReply) -> Self {
        Self {
            result: Ok(reply),
            delay: Duration::ZERO,
        }
    }

    pub fn failure(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
            delay: Duration::ZERO,
        }
    }

    /// A reply that takes `delay` of (virtual) time to produce.
    pub fn delayed(reply: BrainReply, delay: Duration) -> Self {
        Self {
            result: Ok(reply),
            delay,
        }
    }
}

/// Plays back a script of replies in order; an exhausted script fails like
/// a dead remote.
pub struct MockReasoner {
    script: Mutex<VecDeque<ScriptedTurn>>,
    requests: Mutex<Vec<ReasoningRequest>>,
}

impl MockReasoner {
    pub fn new(script: Vec<ScriptedTurn>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// How many times the reasoner has been invoked.
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ReasoningRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Reasoner for MockReasoner {
    async fn generate(&self, request: ReasoningRequest) -> Result<BrainReply, GatewayError> {
        self.requests.lock().unwrap().push(request);
        let turn = self.script.lock().unwrap().pop_front();
        let Some(turn) = turn else {
            return Err(GatewayError::RemoteCall("script exhausted".into()));
        };
        if !turn.delay.is_zero() {
            tokio::time::sleep(turn.delay).await;
        }
        turn.result.map_err(GatewayError::RemoteCall)
    }
}

pub struct MockSpeech {
    pub fail_tts: bool,
    pub transcript: String,
}

impl Default for MockSpeech {
    fn default() -> Self {
        Self {
            fail_tts: false,
            transcript: "what did you say".into(),
        }
    }
}

#[async_trait]
impl SpeechGateway for MockSpeech {
    async fn synthesize(&self, _text: &str, _emotion: &str) -> Result<String, GatewayError> {
        if self.fail_tts {
            return Err(GatewayError::RemoteCall("tts down".into()));
        }
        Ok("bW9jay1hdWRpbw==".into())
    }

    async fn transcribe(&self, _audio_base64: &str) -> Result<String, GatewayError> {
        Ok(self.transcript.clone())
    }
}

/// Embeds known texts to preset vectors; everything else gets `spike(0)`.
/// Flip `fail` to simulate a dead embedding provider.
pub struct MockEmbedder {
    map: Mutex<HashMap<String, Vec<f32>>>,
    pub fail: AtomicBool,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self {
            map: Mutex::new(HashMap::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn set(&self, text: &str, vector: Vec<f32>) {
        self.map.lock().unwrap().insert(text.to_string(), vector);
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, GatewayError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::RemoteCall("embedder down".into()));
        }
        Ok(self
            .map
            .lock()
            .unwrap()
            .get(text)
            .cloned()
            .unwrap_or_else(|| spike(0)))
    }
}

// ── Harness ───────────────────────────────────────────────────────────────────

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub session: SessionHandle,
    pub memory: Arc<MemoryEngine>,
    pub reasoner: Arc<MockReasoner>,
    pub embedder: Arc<MockEmbedder>,
    pub conn: Arc<Mutex<Connection>>,
    pub outbound: mpsc::UnboundedReceiver<Outbound>,
    _dir: tempfile::TempDir,
}

/// Build a full orchestrator over an in-memory episode store, a tempdir
/// fact table, and scripted collaborators. Capture is disabled by default.
pub fn harness(script: Vec<ScriptedTurn>) -> Harness {
    harness_with_capture(script, Arc::new(CaptureDisabled))
}

pub fn harness_with_capture(
    script: Vec<ScriptedTurn>,
    capture: Arc<dyn ScreenCapture>,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();

    db::load_sqlite_vec();
    let conn = Connection::open_in_memory().unwrap();
    db::schema::init_schema(&conn, DIM).unwrap();
    let conn = Arc::new(Mutex::new(conn));

    let facts = FactStore::open(dir.path().join("facts.json")).unwrap();
    let embedder = Arc::new(MockEmbedder::new());
    let memory = Arc::new(MemoryEngine::new(
        Arc::clone(&conn),
        facts,
        embedder.clone() as Arc<dyn Embedder>,
    ));

    let session = SessionHandle::new(Duration::from_secs(40), Duration::from_secs(3600));
    let reasoner = Arc::new(MockReasoner::new(script));
    let (tx, rx) = mpsc::unbounded_channel();

    let orchestrator = Orchestrator::new(
        session.clone(),
        Arc::clone(&memory),
        reasoner.clone() as Arc<dyn Reasoner>,
        Arc::new(MockSpeech::default()),
        capture,
        tx,
    );

    Harness {
        orchestrator,
        session,
        memory,
        reasoner,
        embedder,
        conn,
        outbound: rx,
        _dir: dir,
    }
}

/// Collect everything currently queued on the outbound channel.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Outbound> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(frame);
    }
    frames
}
