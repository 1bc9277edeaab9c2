use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Where a chat is in the generate flow. The pending prompt lives inside
/// `AwaitingSize`, so the main menu can never carry one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    MainMenu,
    AwaitingPrompt,
    AwaitingSize { prompt: String },
}

/// Ephemeral per-chat conversation state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSession {
    pub chat_id: i64,
    pub state: SessionState,
}

impl ConversationSession {
    pub fn pending_prompt(&self) -> Option<&str> {
        match &self.state {
            SessionState::AwaitingSize { prompt } => Some(prompt.as_str()),
            _ => None,
        }
    }
}

/// Chat id → session. Created on first contact, reset explicitly.
///
/// Locks are held only for the map operation, never across a network call.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<i64, SessionState>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<i64, SessionState>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current session, creating a main-menu one on first contact.
    pub fn get(&self, chat_id: i64) -> ConversationSession {
        let state = self.lock().entry(chat_id).or_default().clone();
        ConversationSession { chat_id, state }
    }

    /// Back to the main menu, dropping any pending prompt.
    pub fn reset(&self, chat_id: i64) {
        self.lock().insert(chat_id, SessionState::MainMenu);
    }

    /// Main menu → awaiting prompt.
    pub fn begin_prompt(&self, chat_id: i64) {
        self.lock().insert(chat_id, SessionState::AwaitingPrompt);
    }

    /// Awaiting prompt → awaiting size. Returns false (and changes nothing)
    /// from any other state.
    pub fn store_prompt(&self, chat_id: i64, prompt: &str) -> bool {
        let mut sessions = self.lock();
        let state = sessions.entry(chat_id).or_default();
        if *state != SessionState::AwaitingPrompt {
            return false;
        }
        *state = SessionState::AwaitingSize {
            prompt: prompt.to_string(),
        };
        true
    }

    /// Awaiting size → main menu, handing back the prompt. `None` from any
    /// other state, which is left untouched.
    pub fn take_prompt(&self, chat_id: i64) -> Option<String> {
        let mut sessions = self.lock();
        let state = sessions.entry(chat_id).or_default();
        match std::mem::take(state) {
            SessionState::AwaitingSize { prompt } => Some(prompt),
            other => {
                *state = other;
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_contact_creates_main_menu_session() {
        let store = SessionStore::new();
        assert!(store.is_empty());
        let session = store.get(7);
        assert_eq!(session.state, SessionState::MainMenu);
        assert!(session.pending_prompt().is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn linear_walk_through_the_flow() {
        let store = SessionStore::new();
        store.begin_prompt(7);
        assert_eq!(store.get(7).state, SessionState::AwaitingPrompt);

        assert!(store.store_prompt(7, "a cat in space"));
        assert_eq!(store.get(7).pending_prompt(), Some("a cat in space"));

        assert_eq!(store.take_prompt(7).as_deref(), Some("a cat in space"));
        assert_eq!(store.get(7).state, SessionState::MainMenu);
    }

    #[test]
    fn prompt_is_only_stored_while_awaiting_one() {
        let store = SessionStore::new();
        assert!(!store.store_prompt(7, "early"));
        assert_eq!(store.get(7).state, SessionState::MainMenu);
    }

    #[test]
    fn take_prompt_outside_size_state_changes_nothing() {
        let store = SessionStore::new();
        store.begin_prompt(7);
        assert!(store.take_prompt(7).is_none());
        assert_eq!(store.get(7).state, SessionState::AwaitingPrompt);
    }

    #[test]
    fn reset_drops_pending_prompt() {
        let store = SessionStore::new();
        store.begin_prompt(7);
        store.store_prompt(7, "dog");
        store.reset(7);
        let session = store.get(7);
        assert_eq!(session.state, SessionState::MainMenu);
        assert!(session.pending_prompt().is_none());
    }

    #[test]
    fn sessions_are_independent_per_chat() {
        let store = SessionStore::new();
        store.begin_prompt(1);
        store.store_prompt(1, "one");
        store.begin_prompt(2);
        assert_eq!(store.get(1).pending_prompt(), Some("one"));
        assert_eq!(store.get(2).state, SessionState::AwaitingPrompt);
    }
}
