//! The top-level coordinator: accepts user turns, builds prompt context
//! from facts + ranked memories + the history window, invokes the reasoning
//! call, applies its memory instructions, and drives spoken replies.
//!
//! Turns run as spawned tasks. An interrupt (or a newer turn) bumps the
//! session generation; a stale turn still applies its side effects but its
//! reply is never dispatched.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::mpsc;

use crate::gateway::{
    BrainReply, ChatMessage, ReasoningRequest, Reasoner, SpeechGateway,
};
use crate::memory::MemoryEngine;
use crate::server::Outbound;
use crate::session::history::HistoryEntry;
use crate::session::{Mode, SessionHandle};
use crate::tools::ScreenCapture;

/// Case-sensitive substrings that trigger a screen capture on a user turn.
const VISION_KEYWORDS: &[&str] = &[
    "look at",
    "screenshot",
    "screen",
    "what do you see",
    "image",
    "photo",
];

/// Marker appended to the logged user turn when a capture was attached.
const ATTACHMENT_MARKER: &str = " [screenshot attached]";

#[derive(Clone)]
pub struct Orchestrator {
    session: SessionHandle,
    memory: Arc<MemoryEngine>,
    reasoner: Arc<dyn Reasoner>,
    speech: Arc<dyn SpeechGateway>,
    capture: Arc<dyn ScreenCapture>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Orchestrator {
    pub fn new(
        session: SessionHandle,
        memory: Arc<MemoryEngine>,
        reasoner: Arc<dyn Reasoner>,
        speech: Arc<dyn SpeechGateway>,
        capture: Arc<dyn ScreenCapture>,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        Self {
            session,
            memory,
            reasoner,
            speech,
            capture,
            outbound,
        }
    }

    /// The full user-turn pipeline: context build → reasoning → memory
    /// apply → history → spoken reply.
    pub async fn handle_user_turn(&self, text: String) {
        let generation = self.session.begin_user_turn();
        self.send_state(Mode::Thinking);

        let image = self.maybe_capture(&text).await;

        let preamble = self.build_preamble(Some(&text)).await;
        let mut turn_text = format!("[{}] {}", Local::now().format("%H:%M:%S"), text);
        if image.is_some() {
            turn_text.push_str("\n(attached: current screen capture)");
        }

        let mut messages = vec![preamble];
        messages.extend(self.session.history_messages());
        messages.push(ChatMessage::user(turn_text));

        let request = ReasoningRequest {
            messages,
            image_base64: image.clone(),
        };

        match self.reasoner.generate(request).await {
            Ok(brain) => {
                tracing::debug!(thought = %brain.thought, "reasoning complete");

                // Fact merge runs before the silence flag is evaluated; the
                // episode write is independent of both.
                self.memory.apply(&brain.memory_operation).await;
                self.session
                    .apply_silence(brain.memory_operation.is_silence_requested);

                let mut logged = text;
                if image.is_some() {
                    logged.push_str(ATTACHMENT_MARKER);
                }
                self.session.push_history(HistoryEntry::user(logged));

                if !brain.reply.is_empty() {
                    self.session
                        .push_history(HistoryEntry::assistant(brain.reply.clone()));
                    self.speak(generation, &brain.reply, &brain.emotion).await;
                }
            }
            Err(e) => {
                // Degrade to the fixed fallback: spoken, but nothing is
                // remembered and the history stays untouched.
                tracing::warn!(error = %e, "reasoning call failed, using fallback reply");
                let fallback = BrainReply::fallback(&e.to_string());
                self.speak(generation, &fallback.reply, &fallback.emotion)
                    .await;
            }
        }

        if self.session.finish_turn(generation) {
            self.send_state(Mode::Idle);
        }
    }

    /// Transcribe an audio frame, echo the transcript to the client, and
    /// run it as a normal user turn. Empty or failed transcriptions drop
    /// the frame.
    pub async fn handle_audio_turn(&self, audio_base64: String) {
        match self.speech.transcribe(&audio_base64).await {
            Ok(text) if !text.is_empty() => {
                self.send(Outbound::TextInput { text: text.clone() });
                self.handle_user_turn(text).await;
            }
            Ok(_) => tracing::debug!("empty transcription, frame dropped"),
            Err(e) => tracing::warn!(error = %e, "transcription failed, frame dropped"),
        }
    }

    /// One unsolicited turn, if the idle gate opens. Runs the same pipeline
    /// as a user turn but with a synthetic trigger instruction and a random
    /// resurfaced memory instead of query-ranked recall. Only the assistant
    /// side is persisted to history.
    pub async fn run_proactive_turn(&self) {
        let Some(claim) = self.session.claim_proactive() else {
            return;
        };
        tracing::info!(
            next_wait_secs = claim.next_threshold.as_secs(),
            "idle gate crossed, starting unsolicited turn"
        );
        self.send_state(Mode::Thinking);

        let preamble = self.build_preamble(None).await;
        let last_heard = self.session.last_user_input().format("%H:%M:%S");
        let trigger = format!(
            "(Automatic trigger: the user has been silent.\n\
             Their last message arrived at {last_heard}.\n\
             Compare that with the current system time. If the gap is short, \
             keep the current topic going, or nudge it somewhere livelier. If \
             the gap is long, bring up the resurfaced memory, tease the \
             silence, or open a fresh topic.\n\
             Respond with the usual JSON object.)"
        );

        let mut messages = vec![preamble];
        messages.extend(self.session.history_messages());
        messages.push(ChatMessage::user(trigger));

        let request = ReasoningRequest {
            messages,
            image_base64: None,
        };

        match self.reasoner.generate(request).await {
            Ok(brain) if !brain.reply.is_empty() => {
                self.memory.apply(&brain.memory_operation).await;
                self.session
                    .apply_silence(brain.memory_operation.is_silence_requested);
                // the synthetic trigger is not a real user turn — only the
                // assistant side enters the window
                self.session
                    .push_history(HistoryEntry::assistant(brain.reply.clone()));
                self.speak(claim.generation, &brain.reply, &brain.emotion)
                    .await;
            }
            Ok(_) => tracing::debug!("unsolicited turn produced no reply"),
            Err(e) => tracing::warn!(error = %e, "unsolicited turn failed"),
        }

        if self.session.finish_turn(claim.generation) {
            self.send_state(Mode::Idle);
        }
    }

    /// Best-effort screen capture when the turn text hits a vision keyword.
    async fn maybe_capture(&self, text: &str) -> Option<String> {
        if !VISION_KEYWORDS.iter().any(|k| text.contains(k)) {
            return None;
        }
        match self.capture.capture_jpeg_base64().await {
            Ok(image) => {
                tracing::info!("vision keyword hit, screen captured");
                Some(image)
            }
            Err(e) => {
                tracing::warn!(error = %e, "screen capture failed, continuing without attachment");
                None
            }
        }
    }

    /// The system preamble: persona, wall-clock time, the full fact table,
    /// and a memory section — ranked candidates for a query, one random
    /// resurfaced episode for ambient turns. The section is rendered even
    /// when empty.
    async fn build_preamble(&self, query: Option<&str>) -> ChatMessage {
        let now = Local::now().format("%Y-%m-%d %H:%M");
        let facts = self.memory.fact_snapshot();

        let memory_section = match query {
            Some(q) => {
                let ranked = self.memory.rank(q).await;
                if ranked.is_empty() {
                    "Related past moments: (none)".to_string()
                } else {
                    let mut section = String::from("Related past moments:\n");
                    for candidate in &ranked {
                        section.push_str(&format!(
                            "- ({}) {}\n",
                            candidate.date, candidate.content
                        ));
                    }
                    section
                }
            }
            None => match self.memory.surprise_recall().await {
                Some(c) => format!("A memory that just resurfaced:\n- ({}) {}", c.date, c.content),
                None => "A memory that just resurfaced: (none)".to_string(),
            },
        };

        ChatMessage::system(format!(
            "You are Animus, a playful, sharp-tongued desktop companion.\n\
             Current time: {now}.\n\n\
             Known facts about the user: {facts}\n\
             {memory_section}\n\n\
             Respond to every message with a single strict JSON object:\n\
             {{\n\
               \"thought\": \"inner monologue: read the intent, check it against the known facts\",\n\
               \"reply\": \"what you say out loud, conversational and in character\",\n\
               \"emotion\": \"happy/neutral/bored/angry\",\n\
               \"memory_operation\": {{\n\
                 \"new_facts\": {{\"key\": \"value\"}} or null,\n\
                 \"new_episode\": \"one-line summary of a moment worth keeping\" or null,\n\
                 \"is_silence_requested\": true/false\n\
               }}\n\
             }}\n\n\
             Rules:\n\
             1. Only write new_facts when the user plainly states something durable about themselves.\n\
             2. If the user claims something absurd, call it out in the reply and leave memory untouched."
        ))
    }

    /// Synthesize and dispatch one reply. Speech duration is estimated from
    /// the character count, and the session's activity clock moves that far
    /// into the future so the scheduler does not count speech as idle. A
    /// stale generation — before or after synthesis — suppresses dispatch.
    async fn speak(&self, generation: u64, text: &str, emotion: &str) {
        let estimate =
            Duration::from_secs_f64(text.chars().count() as f64 * 0.25 + 1.0);
        if !self.session.begin_speaking(generation, estimate) {
            tracing::debug!("turn superseded before dispatch, reply dropped");
            return;
        }
        self.send_state(Mode::Speaking);

        let audio = match self.speech.synthesize(text, emotion).await {
            Ok(audio) => Some(audio),
            Err(e) => {
                tracing::warn!(error = %e, "speech synthesis failed, sending text only");
                None
            }
        };

        if self.session.generation() != generation {
            tracing::debug!("turn superseded during synthesis, reply dropped");
            return;
        }

        self.send(Outbound::AudioChunk {
            text: text.to_string(),
            audio_base64: audio,
            expression: emotion.to_string(),
        });
    }

    fn send_state(&self, mode: Mode) {
        self.send(Outbound::StateUpdate { state: mode });
    }

    /// Sends fail silently once the socket is gone — side effects of an
    /// in-flight turn still complete, the frames just go nowhere.
    fn send(&self, message: Outbound) {
        let _ = self.outbound.send(message);
    }
}
