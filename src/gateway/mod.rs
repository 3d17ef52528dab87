//! External AI collaborators behind narrow trait seams.
//!
//! The session engine never talks HTTP directly — it goes through
//! [`Reasoner`] (one structured thinking step), [`SpeechGateway`] (TTS/STT),
//! and [`Embedder`] (text-to-vector). The production implementation for all
//! three is [`openai::OpenAiGateway`]; tests substitute scripted mocks.
//!
//! Failures surface as typed [`GatewayError`]s so callers decide the
//! degraded behavior explicitly, instead of inspecting sentinel payloads.

pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Reply body dispatched when the reasoning call fails.
pub const FALLBACK_REPLY: &str = "(brain short-circuited...)";
/// Expression shown alongside the fallback reply.
pub const FALLBACK_EMOTION: &str = "dizzy";

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The remote call itself failed: transport error, timeout, or a
    /// non-success HTTP status.
    #[error("remote call failed: {0}")]
    RemoteCall(String),
    /// The remote call succeeded but returned something that does not parse
    /// as the expected shape.
    #[error("malformed reply: {0}")]
    MalformedReply(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One reasoning invocation: ordered role-tagged messages plus an optional
/// JPEG attachment (base64) that rides on the final user message.
#[derive(Debug, Clone)]
pub struct ReasoningRequest {
    pub messages: Vec<ChatMessage>,
    pub image_base64: Option<String>,
}

/// Memory instructions the model may attach to a reply. All fields are
/// optional on the wire; an absent `is_silence_requested` means false.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemoryOperation {
    pub new_facts: Option<BTreeMap<String, serde_json::Value>>,
    pub new_episode: Option<String>,
    #[serde(default)]
    pub is_silence_requested: bool,
}

/// The structured result of one reasoning step.
///
/// All four top-level fields are required: a payload missing any of them is
/// rejected as [`GatewayError::MalformedReply`] rather than silently
/// defaulted.
#[derive(Debug, Clone, Deserialize)]
pub struct BrainReply {
    pub thought: String,
    pub reply: String,
    pub emotion: String,
    pub memory_operation: MemoryOperation,
}

impl BrainReply {
    /// The fixed degraded reply used when the reasoning call fails. Carries
    /// the error text as the thought and requests no memory changes.
    pub fn fallback(error: &str) -> Self {
        Self {
            thought: error.to_string(),
            reply: FALLBACK_REPLY.to_string(),
            emotion: FALLBACK_EMOTION.to_string(),
            memory_operation: MemoryOperation::default(),
        }
    }
}

/// Parse the text content of a reasoning response into a [`BrainReply`].
pub fn parse_brain_reply(content: &str) -> Result<BrainReply, GatewayError> {
    serde_json::from_str(content)
        .map_err(|e| GatewayError::MalformedReply(format!("{e}; content: {content:.200}")))
}

/// The reasoning model: one prompt in, one structured reply out.
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn generate(&self, request: ReasoningRequest) -> Result<BrainReply, GatewayError>;
}

/// Text-to-speech and speech-to-text.
#[async_trait]
pub trait SpeechGateway: Send + Sync {
    /// Synthesize `text` with an emotion hint. Returns base64 mp3 bytes.
    async fn synthesize(&self, text: &str, emotion: &str) -> Result<String, GatewayError>;

    /// Transcribe base64 webm audio to text. An empty transcript is valid.
    async fn transcribe(&self, audio_base64: &str) -> Result<String, GatewayError>;
}

/// Text-to-vector embedding.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, GatewayError>;
}
