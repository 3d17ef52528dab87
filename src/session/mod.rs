//! Session state: the interaction mode machine, activity clocks, the
//! adaptive idle threshold, and the owned conversation history.
//!
//! Exactly one session exists per process. Two tasks touch it — the
//! connection's receive loop and the proactive scheduler — so all state
//! lives behind [`SessionHandle`], whose methods each take the lock for one
//! synchronous mutation and never hold it across an await. Mutual exclusion
//! of actual *work* still follows the cooperative rule: the scheduler only
//! claims a turn while the mode is idle, and starting any turn immediately
//! leaves idle.

pub mod history;
pub mod orchestrator;
pub mod scheduler;

use chrono::{DateTime, Local};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use crate::gateway::ChatMessage;
use history::{HistoryEntry, HistoryWindow};

/// Interaction mode. Transitions go only through [`SessionHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Idle,
    Thinking,
    Speaking,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Thinking => "thinking",
            Self::Speaking => "speaking",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A successful proactive claim: the turn's generation plus the threshold
/// that now guards the *next* unsolicited turn.
#[derive(Debug, Clone, Copy)]
pub struct ProactiveClaim {
    pub generation: u64,
    pub next_threshold: Duration,
}

struct SessionState {
    mode: Mode,
    /// When this session last did something — advanced into the future
    /// while speaking so speech does not count as idle time.
    last_own_activity: Instant,
    /// Wall-clock time of the user's last accepted message, for prompts.
    last_user_input: DateTime<Local>,
    /// Adaptive wait before the next unsolicited turn. Doubles (capped)
    /// after each one; resets to base on every user turn.
    idle_threshold: Duration,
    do_not_disturb: bool,
    /// Bumped by every interrupt and every new turn. A turn whose
    /// generation is stale must not dispatch its reply.
    generation: u64,
    history: HistoryWindow,
}

#[derive(Clone)]
pub struct SessionHandle {
    state: Arc<Mutex<SessionState>>,
    base_idle: Duration,
    max_idle: Duration,
}

impl SessionHandle {
    pub fn new(base_idle: Duration, max_idle: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState {
                mode: Mode::Idle,
                last_own_activity: Instant::now(),
                last_user_input: Local::now(),
                idle_threshold: base_idle,
                do_not_disturb: false,
                generation: 0,
                history: HistoryWindow::default(),
            })),
            base_idle,
            max_idle,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().expect("session lock poisoned")
    }

    pub fn mode(&self) -> Mode {
        self.lock().mode
    }

    pub fn do_not_disturb(&self) -> bool {
        self.lock().do_not_disturb
    }

    pub fn idle_threshold(&self) -> Duration {
        self.lock().idle_threshold
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn last_user_input(&self) -> DateTime<Local> {
        self.lock().last_user_input
    }

    /// Any inbound frame refreshes the activity clock.
    pub fn note_activity(&self) {
        self.lock().last_own_activity = Instant::now();
    }

    /// Drop to idle immediately. The in-flight turn (if any) keeps running
    /// but its generation is now stale, so its dispatch is suppressed.
    pub fn interrupt(&self) {
        let mut s = self.lock();
        s.generation += 1;
        s.mode = Mode::Idle;
    }

    /// Accept a user message: enter thinking, reset the idle threshold to
    /// base, stamp the input time. Returns the turn's generation; any prior
    /// in-flight turn is implicitly superseded.
    pub fn begin_user_turn(&self) -> u64 {
        let mut s = self.lock();
        s.generation += 1;
        s.mode = Mode::Thinking;
        s.idle_threshold = self.base_idle;
        s.last_user_input = Local::now();
        s.last_own_activity = Instant::now();
        s.generation
    }

    /// The scheduler's gate and claim, atomically: fires only when not in
    /// do-not-disturb, the mode is idle, and the idle gap exceeds the
    /// current threshold. On claim the threshold doubles (capped) and the
    /// session enters thinking.
    pub fn claim_proactive(&self) -> Option<ProactiveClaim> {
        let mut s = self.lock();
        if s.do_not_disturb || s.mode != Mode::Idle {
            return None;
        }
        if Instant::now().duration_since(s.last_own_activity) <= s.idle_threshold {
            return None;
        }
        s.idle_threshold = (s.idle_threshold * 2).min(self.max_idle);
        s.generation += 1;
        s.mode = Mode::Thinking;
        s.last_own_activity = Instant::now();
        Some(ProactiveClaim {
            generation: s.generation,
            next_threshold: s.idle_threshold,
        })
    }

    /// Enter speaking and push the activity clock into the future by the
    /// estimated speech duration. Refuses stale generations.
    pub fn begin_speaking(&self, generation: u64, estimate: Duration) -> bool {
        let mut s = self.lock();
        if s.generation != generation {
            return false;
        }
        s.mode = Mode::Speaking;
        s.last_own_activity = Instant::now() + estimate;
        true
    }

    /// Return to idle if this turn is still the current one. Returns
    /// whether the transition applied.
    pub fn finish_turn(&self, generation: u64) -> bool {
        let mut s = self.lock();
        if s.generation != generation {
            return false;
        }
        s.mode = Mode::Idle;
        true
    }

    /// Silence is sticky only while every turn re-requests it: the flag
    /// tracks the latest turn's request exactly.
    pub fn apply_silence(&self, requested: bool) {
        let mut s = self.lock();
        if requested != s.do_not_disturb {
            tracing::info!(
                do_not_disturb = requested,
                "do-not-disturb {}",
                if requested { "engaged" } else { "lifted" }
            );
        }
        s.do_not_disturb = requested;
    }

    pub fn push_history(&self, entry: HistoryEntry) {
        self.lock().history.push(entry);
    }

    pub fn history_messages(&self) -> Vec<ChatMessage> {
        self.lock().history.to_messages()
    }

    pub fn history_entries(&self) -> Vec<HistoryEntry> {
        self.lock().history.entries()
    }

    pub fn history_len(&self) -> usize {
        self.lock().history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    fn handle() -> SessionHandle {
        SessionHandle::new(Duration::from_secs(40), Duration::from_secs(3600))
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_session_is_idle_and_quiet() {
        let session = handle();
        assert_eq!(session.mode(), Mode::Idle);
        assert!(!session.do_not_disturb());
        assert_eq!(session.idle_threshold(), Duration::from_secs(40));
        assert!(session.claim_proactive().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn proactive_fires_after_threshold_and_backs_off() {
        let session = handle();

        advance(Duration::from_secs(41)).await;
        let claim = session.claim_proactive().expect("gate should open after 41s");
        assert_eq!(claim.next_threshold, Duration::from_secs(80));
        assert_eq!(session.mode(), Mode::Thinking);

        // mode is thinking now — no double claim
        assert!(session.claim_proactive().is_none());
        session.finish_turn(claim.generation);

        // same 41s gap again: gate now requires the doubled threshold
        advance(Duration::from_secs(41)).await;
        assert!(session.claim_proactive().is_none());

        advance(Duration::from_secs(40)).await;
        let claim = session.claim_proactive().expect("81s total exceeds 80s");
        assert_eq!(claim.next_threshold, Duration::from_secs(160));
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_caps_at_max() {
        let session = SessionHandle::new(Duration::from_secs(40), Duration::from_secs(100));
        advance(Duration::from_secs(41)).await;
        let claim = session.claim_proactive().unwrap();
        assert_eq!(claim.next_threshold, Duration::from_secs(80));
        session.finish_turn(claim.generation);

        advance(Duration::from_secs(81)).await;
        let claim = session.claim_proactive().unwrap();
        assert_eq!(claim.next_threshold, Duration::from_secs(100));
        session.finish_turn(claim.generation);

        advance(Duration::from_secs(101)).await;
        let claim = session.claim_proactive().unwrap();
        assert_eq!(claim.next_threshold, Duration::from_secs(100));
    }

    #[tokio::test(start_paused = true)]
    async fn user_turn_resets_threshold_to_base() {
        let session = handle();
        advance(Duration::from_secs(41)).await;
        let claim = session.claim_proactive().unwrap();
        assert_eq!(session.idle_threshold(), Duration::from_secs(80));
        session.finish_turn(claim.generation);

        let gen = session.begin_user_turn();
        assert_eq!(session.idle_threshold(), Duration::from_secs(40));
        assert_eq!(session.mode(), Mode::Thinking);
        session.finish_turn(gen);
    }

    #[tokio::test(start_paused = true)]
    async fn do_not_disturb_blocks_the_gate() {
        let session = handle();
        session.apply_silence(true);
        advance(Duration::from_secs(300)).await;
        assert!(session.claim_proactive().is_none());

        // the first turn that does not re-request silence lifts it
        session.apply_silence(false);
        assert!(session.claim_proactive().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn speaking_pushes_activity_into_the_future() {
        let session = handle();
        let gen = session.begin_user_turn();
        assert!(session.begin_speaking(gen, Duration::from_secs(30)));
        session.finish_turn(gen);

        // 60s elapsed but 30s were "spoken" — only 30s of real idle
        advance(Duration::from_secs(60)).await;
        assert!(session.claim_proactive().is_none());

        advance(Duration::from_secs(11)).await;
        assert!(session.claim_proactive().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_makes_inflight_turn_stale() {
        let session = handle();
        let gen = session.begin_user_turn();

        session.interrupt();
        assert_eq!(session.mode(), Mode::Idle);
        assert!(!session.begin_speaking(gen, Duration::from_secs(1)));
        assert!(!session.finish_turn(gen));
    }

    #[tokio::test(start_paused = true)]
    async fn newer_turn_supersedes_older_one() {
        let session = handle();
        let first = session.begin_user_turn();
        let second = session.begin_user_turn();

        assert!(!session.begin_speaking(first, Duration::from_secs(1)));
        assert!(session.begin_speaking(second, Duration::from_secs(1)));
        assert!(session.finish_turn(second));
        assert_eq!(session.mode(), Mode::Idle);
    }
}
