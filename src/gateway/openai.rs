//! OpenAI-compatible HTTP implementation of the gateway traits.
//!
//! One [`OpenAiGateway`] serves all three seams. The reasoning and speech
//! providers are configured independently so the brain can live on one
//! vendor and the voice on another; both speak the same wire dialect.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{EmbeddingConfig, LlmConfig, SpeechConfig};
use crate::gateway::{
    parse_brain_reply, BrainReply, ChatMessage, Embedder, GatewayError, ReasoningRequest,
    Reasoner, Role, SpeechGateway,
};

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f64,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: WireContent,
}

/// Message content: plain text, or text-plus-image parts for vision turns.
#[derive(Serialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Serialize)]
struct SpeechRequest {
    model: String,
    voice: String,
    input: String,
    response_format: &'static str,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    input: String,
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

// ── Gateway ───────────────────────────────────────────────────────────────────

pub struct OpenAiGateway {
    http: reqwest::Client,
    llm: LlmConfig,
    speech: SpeechConfig,
    embedding: EmbeddingConfig,
}

impl OpenAiGateway {
    pub fn new(
        llm: LlmConfig,
        speech: SpeechConfig,
        embedding: EmbeddingConfig,
    ) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(llm.timeout_secs))
            .build()
            .map_err(|e| GatewayError::RemoteCall(format!("http client init failed: {e}")))?;
        Ok(Self {
            http,
            llm,
            speech,
            embedding,
        })
    }

    fn role_str(role: Role) -> &'static str {
        match role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Build the chat body. The image, when present, is folded into the last
    /// message as a data-URL part alongside its text.
    fn build_chat_body(&self, request: &ReasoningRequest) -> ChatCompletionRequest {
        let mut messages: Vec<WireMessage> = request
            .messages
            .iter()
            .map(|m: &ChatMessage| WireMessage {
                role: Self::role_str(m.role),
                content: WireContent::Text(m.content.clone()),
            })
            .collect();

        if let (Some(image), Some(last)) = (&request.image_base64, messages.last_mut()) {
            let text = match &last.content {
                WireContent::Text(t) => t.clone(),
                WireContent::Parts(_) => unreachable!("messages start as plain text"),
            };
            last.content = WireContent::Parts(vec![
                ContentPart::Text { text },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!("data:image/jpeg;base64,{image}"),
                    },
                },
            ]);
        }

        ChatCompletionRequest {
            model: self.llm.model.clone(),
            messages,
            temperature: self.llm.temperature,
            max_tokens: self.llm.max_tokens,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(GatewayError::RemoteCall(format!(
            "HTTP {status}: {body:.300}"
        )))
    }
}

#[async_trait]
impl Reasoner for OpenAiGateway {
    async fn generate(&self, request: ReasoningRequest) -> Result<BrainReply, GatewayError> {
        let body = self.build_chat_body(&request);

        let response = self
            .http
            .post(format!("{}/chat/completions", self.llm.base_url))
            .bearer_auth(&self.llm.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::RemoteCall(format!("chat request failed: {e}")))?;
        let response = Self::check_status(response).await?;

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedReply(format!("chat response: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| GatewayError::MalformedReply("empty choices array".into()))?;

        parse_brain_reply(&content)
    }
}

#[async_trait]
impl SpeechGateway for OpenAiGateway {
    async fn synthesize(&self, text: &str, emotion: &str) -> Result<String, GatewayError> {
        // The emotion rides as an inline hint the voice models understand.
        let body = SpeechRequest {
            model: self.speech.tts_model.clone(),
            voice: self.speech.tts_voice.clone(),
            input: format!("<{emotion}>{text}"),
            response_format: "mp3",
        };

        let response = self
            .http
            .post(format!("{}/audio/speech", self.speech.base_url))
            .bearer_auth(&self.speech.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::RemoteCall(format!("tts request failed: {e}")))?;
        let response = Self::check_status(response).await?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| GatewayError::RemoteCall(format!("tts body read failed: {e}")))?;
        Ok(BASE64.encode(&bytes))
    }

    async fn transcribe(&self, audio_base64: &str) -> Result<String, GatewayError> {
        let bytes = BASE64
            .decode(audio_base64)
            .map_err(|e| GatewayError::MalformedReply(format!("invalid base64 audio: {e}")))?;

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name("input.webm")
            .mime_str("audio/webm")
            .map_err(|e| GatewayError::RemoteCall(format!("multipart build failed: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .text("model", self.speech.stt_model.clone())
            .part("file", part);

        let response = self
            .http
            .post(format!("{}/audio/transcriptions", self.speech.base_url))
            .bearer_auth(&self.speech.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| GatewayError::RemoteCall(format!("stt request failed: {e}")))?;
        let response = Self::check_status(response).await?;

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedReply(format!("stt response: {e}")))?;
        Ok(parsed.text)
    }
}

#[async_trait]
impl Embedder for OpenAiGateway {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, GatewayError> {
        let body = EmbeddingRequest {
            model: self.embedding.model.clone(),
            input: text.to_string(),
            dimensions: self.embedding.dimensions,
        };

        let response = self
            .http
            .post(format!("{}/embeddings", self.embedding.base_url))
            .bearer_auth(&self.embedding.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::RemoteCall(format!("embedding request failed: {e}")))?;
        let response = Self::check_status(response).await?;

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedReply(format!("embedding response: {e}")))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| GatewayError::MalformedReply("empty embedding data".into()))
    }
}
