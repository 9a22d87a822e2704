// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Observable chat state.
//!
//! A single `watch` container holds everything a view renders. Writers go
//! through guarded transitions that re-check the current session inside
//! the update, so work finishing for a session the user has left cannot
//! overwrite the state of the one they moved to.

use std::collections::BTreeSet;

use recall_core::{ChatMessage, ChatSession};
use tokio::sync::watch;

/// Engine lifecycle as shown to the user.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineStatus {
    Idle,
    Loading(f32),
    Ready,
    Error(String),
}

/// Text streamed so far for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingResponse {
    pub session_id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatState {
    pub sessions: Vec<ChatSession>,
    pub current_session_id: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub is_loading: bool,
    pub engine: EngineStatus,
    pub pending_response: Option<PendingResponse>,
    pub typing_session_ids: BTreeSet<String>,
}

impl Default for ChatState {
    fn default() -> Self {
        Self {
            sessions: Vec::new(),
            current_session_id: None,
            messages: Vec::new(),
            is_loading: false,
            engine: EngineStatus::Idle,
            pending_response: None,
            typing_session_ids: BTreeSet::new(),
        }
    }
}

impl ChatState {
    pub fn is_current(&self, session_id: &str) -> bool {
        self.current_session_id.as_deref() == Some(session_id)
    }

    /// Pending text for the current session, if any.
    pub fn visible_pending(&self) -> Option<&str> {
        self.pending_response
            .as_ref()
            .filter(|p| self.is_current(&p.session_id))
            .map(|p| p.text.as_str())
    }
}

/// Write side of the state container.
#[derive(Clone)]
pub(crate) struct StateCell {
    tx: watch::Sender<ChatState>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        Self {
            tx: watch::Sender::new(ChatState::default()),
        }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.tx.subscribe()
    }

    pub(crate) fn snapshot(&self) -> ChatState {
        self.tx.borrow().clone()
    }

    pub(crate) fn set_engine(&self, status: EngineStatus) {
        self.tx.send_modify(|s| s.engine = status);
    }

    /// Move to `Loading(0)` unless the engine is ready or already loading.
    pub(crate) fn try_begin_loading(&self) -> bool {
        self.tx.send_if_modified(|s| {
            if matches!(s.engine, EngineStatus::Ready | EngineStatus::Loading(_)) {
                return false;
            }
            s.engine = EngineStatus::Loading(0.0);
            true
        })
    }

    pub(crate) fn set_sessions(&self, sessions: Vec<ChatSession>) {
        self.tx.send_modify(|s| s.sessions = sessions);
    }

    /// Make `session_id` current. Pending text of other sessions is hidden.
    pub(crate) fn select(&self, session_id: &str) {
        self.tx.send_modify(|s| {
            s.current_session_id = Some(session_id.to_string());
            s.messages.clear();
            s.is_loading = true;
            if s.pending_response.as_ref().is_some_and(|p| p.session_id != session_id) {
                s.pending_response = None;
            }
        });
    }

    /// Select `session_id` only if nothing is selected yet.
    pub(crate) fn claim_if_unselected(&self, session_id: &str) -> bool {
        self.tx.send_if_modified(|s| {
            if s.current_session_id.is_some() {
                return false;
            }
            s.current_session_id = Some(session_id.to_string());
            true
        })
    }

    /// Apply a message list if `session_id` is still current.
    pub(crate) fn set_messages_for(&self, session_id: &str, messages: Vec<ChatMessage>) -> bool {
        self.tx.send_if_modified(|s| {
            if !s.is_current(session_id) {
                return false;
            }
            s.messages = messages;
            s.is_loading = false;
            true
        })
    }

    pub(crate) fn begin_typing(&self, session_id: &str) {
        self.tx.send_modify(|s| {
            s.typing_session_ids.insert(session_id.to_string());
            if s.is_current(session_id) {
                s.pending_response = Some(PendingResponse {
                    session_id: session_id.to_string(),
                    text: String::new(),
                });
            }
        });
    }

    /// Publish streamed text if `session_id` is still current.
    pub(crate) fn set_pending_for(&self, session_id: &str, text: &str) -> bool {
        self.tx.send_if_modified(|s| {
            if !s.is_current(session_id) {
                return false;
            }
            s.pending_response = Some(PendingResponse {
                session_id: session_id.to_string(),
                text: text.to_string(),
            });
            true
        })
    }

    pub(crate) fn end_typing(&self, session_id: &str) {
        self.tx.send_modify(|s| {
            s.typing_session_ids.remove(session_id);
            if s.pending_response.as_ref().is_some_and(|p| p.session_id == session_id) {
                s.pending_response = None;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_session_cannot_write_messages_or_pending() {
        let cell = StateCell::new();
        cell.select("a");
        cell.begin_typing("a");
        assert!(cell.set_pending_for("a", "Hel"));

        cell.select("b");
        assert!(!cell.set_pending_for("a", "Hello"));
        assert!(!cell.set_messages_for("a", vec![ChatMessage::user("a", "hi")]));

        let state = cell.snapshot();
        assert_eq!(state.current_session_id.as_deref(), Some("b"));
        assert!(state.pending_response.is_none());
        assert!(state.messages.is_empty());
        assert!(state.typing_session_ids.contains("a"));
    }

    #[test]
    fn end_typing_clears_only_its_own_pending() {
        let cell = StateCell::new();
        cell.select("b");
        cell.begin_typing("b");
        cell.set_pending_for("b", "partial");
        cell.end_typing("a");
        assert_eq!(cell.snapshot().visible_pending(), Some("partial"));
        cell.end_typing("b");
        assert_eq!(cell.snapshot().visible_pending(), None);
    }

    #[test]
    fn loading_is_entered_once() {
        let cell = StateCell::new();
        assert!(cell.try_begin_loading());
        assert!(!cell.try_begin_loading());
        cell.set_engine(EngineStatus::Error("no model".into()));
        assert!(cell.try_begin_loading());
        cell.set_engine(EngineStatus::Ready);
        assert!(!cell.try_begin_loading());
    }

    #[test]
    fn claim_only_when_unselected() {
        let cell = StateCell::new();
        assert!(cell.claim_if_unselected("a"));
        assert!(!cell.claim_if_unselected("b"));
        assert_eq!(cell.snapshot().current_session_id.as_deref(), Some("a"));
    }
}
