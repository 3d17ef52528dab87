//! The sliding conversation window: the last ten turns, oldest first.
//!
//! Entries are immutable once appended and are dropped — never persisted —
//! when they fall off the old end. Long-term continuity is the memory
//! engine's job, not this window's.

use chrono::{DateTime, Local};
use std::collections::VecDeque;

use crate::gateway::{ChatMessage, Role};

/// Hard cap on retained turns.
pub const HISTORY_CAP: usize = 10;

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub role: Role,
    pub timestamp: DateTime<Local>,
    pub text: String,
}

impl HistoryEntry {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            timestamp: Local::now(),
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            timestamp: Local::now(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Default)]
pub struct HistoryWindow {
    entries: VecDeque<HistoryEntry>,
}

impl HistoryWindow {
    /// Append one entry, evicting from the oldest end past the cap.
    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > HISTORY_CAP {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Render the window as prompt messages, each prefixed with its
    /// `[HH:MM:SS]` timestamp.
    pub fn to_messages(&self) -> Vec<ChatMessage> {
        self.entries
            .iter()
            .map(|e| ChatMessage {
                role: e.role,
                content: format!("[{}] {}", e.timestamp.format("%H:%M:%S"), e.text),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_exceeds_cap_and_evicts_oldest_first() {
        let mut window = HistoryWindow::default();
        for i in 0..25 {
            window.push(HistoryEntry::user(format!("turn {i}")));
            assert!(window.len() <= HISTORY_CAP);
        }
        assert_eq!(window.len(), HISTORY_CAP);

        let entries = window.entries();
        assert_eq!(entries[0].text, "turn 15");
        assert_eq!(entries[9].text, "turn 24");
    }

    #[test]
    fn preserves_append_order() {
        let mut window = HistoryWindow::default();
        window.push(HistoryEntry::user("hello"));
        window.push(HistoryEntry::assistant("hey there"));

        let entries = window.entries();
        assert_eq!(entries[0].role, Role::User);
        assert_eq!(entries[1].role, Role::Assistant);
    }

    #[test]
    fn messages_carry_timestamp_prefix() {
        let mut window = HistoryWindow::default();
        window.push(HistoryEntry::user("hello"));

        let messages = window.to_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
        // "[HH:MM:SS] hello"
        assert!(messages[0].content.starts_with('['));
        assert!(messages[0].content.ends_with("] hello"));
        assert_eq!(messages[0].content.len(), "[00:00:00] hello".len());
    }
}
