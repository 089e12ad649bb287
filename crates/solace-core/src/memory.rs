//! Per-session conversation memory: a bounded, ordered turn log.
//!
//! Advisory context only — process-lifetime, no persistence. The store is
//! explicitly constructed and injected so tests can instantiate isolated
//! instances; there is no process-wide singleton. DashMap's per-entry lock
//! serializes appends for a given session key, which is the only ordering
//! guarantee required.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Hard cap on turns per session; oldest turns are evicted first.
pub const MAX_TURNS: usize = 20;

/// How many trailing turns are read for prompt context.
pub const PROMPT_CONTEXT_TURNS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

/// One message exchange unit. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { speaker: Speaker::User, text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { speaker: Speaker::Assistant, text: text.into() }
    }
}

/// Keyed conversation store. Sessions are created lazily on first append and
/// live for the process lifetime; `reset` is the only eviction.
#[derive(Debug, Default)]
pub struct ConversationMemory {
    sessions: DashMap<String, VecDeque<Turn>>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self { sessions: DashMap::new() }
    }

    /// Appends one turn, evicting the oldest beyond [`MAX_TURNS`].
    pub fn append(&self, session_key: &str, turn: Turn) {
        let mut turns = self.sessions.entry(session_key.to_string()).or_default();
        turns.push_back(turn);
        while turns.len() > MAX_TURNS {
            turns.pop_front();
        }
    }

    /// Appends the user message and the assistant reply under a single entry
    /// guard, so concurrent requests for the same key cannot interleave
    /// between the two turns.
    pub fn append_exchange(&self, session_key: &str, user_text: &str, reply_text: &str) {
        let mut turns = self.sessions.entry(session_key.to_string()).or_default();
        turns.push_back(Turn::user(user_text));
        turns.push_back(Turn::assistant(reply_text));
        while turns.len() > MAX_TURNS {
            turns.pop_front();
        }
    }

    /// Last `n` turns in insertion order. Unknown keys yield an empty vec.
    pub fn recent(&self, session_key: &str, n: usize) -> Vec<Turn> {
        match self.sessions.get(session_key) {
            Some(turns) => {
                let skip = turns.len().saturating_sub(n);
                turns.iter().skip(skip).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// Clears the session's turns. Idempotent; unknown keys are not an error.
    pub fn reset(&self, session_key: &str) {
        if let Some(mut turns) = self.sessions.get_mut(session_key) {
            turns.clear();
        }
    }

    /// True when the key has been seen (even if since reset to empty).
    pub fn contains(&self, session_key: &str) -> bool {
        self.sessions.contains_key(session_key)
    }

    pub fn len(&self, session_key: &str) -> usize {
        self.sessions.get(session_key).map(|t| t.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_eviction_keeps_the_last_twenty_turns() {
        let memory = ConversationMemory::new();
        for i in 0..25 {
            memory.append("s1", Turn::user(format!("msg {i}")));
        }
        let turns = memory.recent("s1", MAX_TURNS);
        assert_eq!(turns.len(), MAX_TURNS);
        assert_eq!(turns.first().unwrap().text, "msg 5");
        assert_eq!(turns.last().unwrap().text, "msg 24");
    }

    #[test]
    fn recent_returns_min_of_n_and_len_in_insertion_order() {
        let memory = ConversationMemory::new();
        for i in 0..4 {
            memory.append("s1", Turn::user(format!("msg {i}")));
        }
        let turns = memory.recent("s1", PROMPT_CONTEXT_TURNS);
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[0].text, "msg 0");
        assert_eq!(turns[3].text, "msg 3");
    }

    #[test]
    fn recent_for_unknown_key_is_empty() {
        let memory = ConversationMemory::new();
        assert!(memory.recent("nobody", 6).is_empty());
    }

    #[test]
    fn append_exchange_stores_both_turns_in_order() {
        let memory = ConversationMemory::new();
        memory.append_exchange("s1", "hello", "hi there");
        let turns = memory.recent("s1", 6);
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0], Turn::user("hello"));
        assert_eq!(turns[1], Turn::assistant("hi there"));
    }

    #[test]
    fn reset_is_idempotent_and_tolerates_unknown_keys() {
        let memory = ConversationMemory::new();
        memory.append("s1", Turn::user("hello"));
        memory.reset("s1");
        memory.reset("s1");
        memory.reset("never-seen");
        assert_eq!(memory.len("s1"), 0);
        assert!(memory.recent("s1", 6).is_empty());
    }

    #[test]
    fn sessions_are_isolated() {
        let memory = ConversationMemory::new();
        memory.append("a", Turn::user("from a"));
        memory.append("b", Turn::user("from b"));
        assert_eq!(memory.recent("a", 6)[0].text, "from a");
        assert_eq!(memory.recent("b", 6)[0].text, "from b");
        memory.reset("a");
        assert_eq!(memory.len("b"), 1);
    }
}
