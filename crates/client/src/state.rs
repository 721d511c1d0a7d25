//! Coordinator state snapshot
//!
//! A `CoordinatorState` is an immutable value: every transition produces a
//! new one, and observers only ever hold whole snapshots.

use cognicore_protocol::{Message, Session};

use crate::settings::Settings;

/// Identifies one send: the id minted at send start and the session it targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendTicket {
    pub send_id: String,
    pub session_id: String,
}

/// Panel visibility flags. Each is independent of the others.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiFlags {
    pub left_sidebar_open: bool,
    pub right_sidebar_open: bool,
    pub prompt_library_open: bool,
    pub prompt_builder_open: bool,
    pub vibe_coding_mode: bool,
}

impl Default for UiFlags {
    fn default() -> Self {
        Self {
            left_sidebar_open: true,
            right_sidebar_open: true,
            prompt_library_open: false,
            prompt_builder_open: false,
            vibe_coding_mode: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CoordinatorState {
    pub sessions: Vec<Session>,
    pub current_session_id: Option<String>,
    /// Committed history of the current session
    pub messages: Vec<Message>,
    /// Optimistic user message of the in-flight send
    pub pending_message: Option<Message>,
    pub streaming_buffer: String,
    pub is_processing: bool,
    pub active_send: Option<SendTicket>,
    /// Target of the most recent selection that has not finished yet
    pub pending_selection: Option<String>,
    pub settings: Settings,
    pub ui: UiFlags,
    pub search_query: String,
    pub session_to_delete: Option<String>,
    pub session_to_rename: Option<String>,
    pub revision: u64,
}

impl CoordinatorState {
    /// Committed history followed by the pending user message, if any.
    pub fn visible_messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().chain(self.pending_message.iter())
    }

    pub fn current_session(&self) -> Option<&Session> {
        let id = self.current_session_id.as_deref()?;
        self.sessions.iter().find(|s| s.id == id)
    }

    /// Visible messages containing the search query, case-insensitively.
    /// A blank query matches everything.
    pub fn search_results(&self) -> Vec<&Message> {
        let query = self.search_query.trim().to_lowercase();
        self.visible_messages()
            .filter(|m| query.is_empty() || m.content.to_lowercase().contains(&query))
            .collect()
    }

    pub fn is_streaming(&self) -> bool {
        self.active_send.is_some()
    }
}
