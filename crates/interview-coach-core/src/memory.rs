//! Per-session conversation memory.
//!
//! Each session holds an ordered log of [`ConversationTurn`]s capped at a
//! fixed number of messages. Sessions are created lazily and live for the
//! lifetime of the [`ConversationMemory`]; nothing is persisted.
//!
//! The session map sits behind an `RwLock` that is only held long enough
//! to look up or insert a session; each session's log has its own `Mutex`
//! so appends to one session never block another.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use crate::models::{ConversationTurn, Role};

/// Reference cap: 20 messages, i.e. 10 user/assistant exchanges.
pub const DEFAULT_MEMORY_CEILING: usize = 20;

type SessionLog = Arc<Mutex<VecDeque<ConversationTurn>>>;

pub struct ConversationMemory {
    ceiling: usize,
    sessions: RwLock<HashMap<String, SessionLog>>,
}

impl ConversationMemory {
    /// Creates an empty memory keeping at most `ceiling` messages per
    /// session. Odd ceilings are rounded up so exchanges stay paired.
    pub fn new(ceiling: usize) -> Self {
        let ceiling = ceiling.max(2);
        Self {
            ceiling: ceiling + ceiling % 2,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Returns the session's log, creating it if needed. The flag is
    /// `true` when this call created the session.
    fn session(&self, session: &str) -> (SessionLog, bool) {
        if let Some(log) = self
            .sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(session)
        {
            return (Arc::clone(log), false);
        }
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        let mut created = false;
        let log = sessions.entry(session.to_string()).or_insert_with(|| {
            created = true;
            Arc::new(Mutex::new(VecDeque::new()))
        });
        (Arc::clone(log), created)
    }

    /// Ensures the session exists. Returns `true` if it was just created.
    pub fn open(&self, session: &str) -> bool {
        self.session(session).1
    }

    /// Whether the session has been opened or written to.
    pub fn contains(&self, session: &str) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(session)
    }

    /// Records one exchange, then drops the oldest messages beyond the ceiling.
    pub fn append(&self, session: &str, user_text: &str, assistant_text: &str) {
        let (log, _) = self.session(session);
        let mut turns = log.lock().unwrap_or_else(|e| e.into_inner());
        turns.push_back(ConversationTurn::new(Role::User, user_text));
        turns.push_back(ConversationTurn::new(Role::Assistant, assistant_text));
        while turns.len() > self.ceiling {
            turns.pop_front();
        }
    }

    /// Up to `max_turns` most recent messages, oldest first.
    pub fn recent(&self, session: &str, max_turns: usize) -> Vec<ConversationTurn> {
        let (log, _) = self.session(session);
        let turns = log.lock().unwrap_or_else(|e| e.into_inner());
        let skip = turns.len().saturating_sub(max_turns);
        turns.iter().skip(skip).cloned().collect()
    }

    /// Number of stored messages; `0` for unknown sessions.
    pub fn len(&self, session: &str) -> usize {
        let log = self
            .sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(session)
            .cloned();
        log.map_or(0, |l| l.lock().unwrap_or_else(|e| e.into_inner()).len())
    }

    /// Forgets a session entirely. Returns `true` if it existed.
    pub fn reset(&self, session: &str) -> bool {
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(session)
            .is_some()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_CEILING)
    }
}
