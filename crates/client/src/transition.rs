//! Pure state transition function
//!
//! All coordinator state changes go through a single synchronous function:
//! `transition(state, input) -> (state, effects)`. No async, no locking,
//! no collaborator calls. Effects describe the IO the coordinator performs
//! next, so every ordering rule is unit-testable here.

use cognicore_protocol::naming::DEFAULT_SESSION_TITLE;
use cognicore_protocol::{Message, Role, Session};
use tracing::warn;

use crate::event::CoordinatorEvent;
use crate::settings::{Settings, SettingsPatch};
use crate::state::{CoordinatorState, SendTicket};

// ---------------------------------------------------------------------------
// Input: one variant per thing that can happen to the coordinator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Input {
    // -- Registry results --
    SessionsLoaded(Vec<Session>),
    SessionRemoved {
        session_id: String,
    },

    // -- Busy bracket around initialize/create --
    ProcessingStarted,
    ProcessingFinished,
    /// Drop the local conversation ahead of switching to a fresh session
    ConversationReset,

    // -- Selection --
    SelectionStarted {
        session_id: String,
    },
    SelectionLoaded {
        session_id: String,
        messages: Vec<Message>,
        model: String,
    },
    SelectionFinished {
        session_id: String,
    },

    // -- Send pipeline --
    SendRequested {
        send_id: String,
        message: Message,
    },
    FragmentReceived {
        send_id: String,
        text: String,
    },
    SendFinished {
        send_id: String,
        /// Canonical history, or `None` when the refetch failed
        canonical: Option<Vec<Message>>,
    },

    // -- Settings --
    SettingsLoaded(Settings),
    SettingsPatched(SettingsPatch),

    // -- UI toggles and dialogs --
    ToggleLeftSidebar,
    ToggleRightSidebar,
    TogglePromptLibrary,
    TogglePromptBuilder,
    ToggleVibeCodingMode,
    SearchQueryChanged(String),
    DeleteDialogOpened {
        session_id: String,
    },
    DeleteDialogClosed,
    RenameDialogOpened {
        session_id: String,
    },
    RenameDialogClosed,
}

// ---------------------------------------------------------------------------
// Effects: describe IO to be executed by the caller
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Switch the channel and fetch the session's history
    LoadSession { session_id: String },
    /// Run the streaming call for an accepted send
    StartStream {
        ticket: SendTicket,
        content: String,
        model: String,
    },
    /// Background title assignment for a session's first message
    AssignTitle {
        session_id: String,
        first_message: String,
    },
    PersistSettings(Settings),
    UpdateModel(String),
    Emit(Box<CoordinatorEvent>),
}

// ---------------------------------------------------------------------------
// transition(): the pure core
// ---------------------------------------------------------------------------

/// Pure, synchronous state transition.
///
/// Returns the new state and the effects to execute. Inputs that no longer
/// apply (a superseded selection, a stale send, a send while busy) leave the
/// state untouched and produce no effects. `revision` is bumped exactly when
/// the state changed.
pub fn transition(mut state: CoordinatorState, input: Input) -> (CoordinatorState, Vec<Effect>) {
    let mut effects: Vec<Effect> = Vec::new();

    let changed = match input {
        // -- Registry results ------------------------------------------------
        Input::SessionsLoaded(sessions) => replace(&mut state.sessions, sessions),

        Input::SessionRemoved { session_id } => {
            let before = state.sessions.len();
            state.sessions.retain(|s| s.id != session_id);
            state.sessions.len() != before
        }

        // -- Busy bracket ----------------------------------------------------
        Input::ProcessingStarted => replace(&mut state.is_processing, true),

        Input::ProcessingFinished => {
            let busy = state.active_send.is_some() || state.pending_selection.is_some();
            replace(&mut state.is_processing, busy)
        }

        Input::ConversationReset => {
            state.messages.clear();
            state.pending_message = None;
            state.streaming_buffer.clear();
            state.search_query.clear();
            state.active_send = None;
            true
        }

        // -- Selection -------------------------------------------------------
        Input::SelectionStarted { session_id } => {
            let in_flight = state.pending_selection.as_deref() == Some(session_id.as_str());
            let settled = state.pending_selection.is_none()
                && state.current_session_id.as_deref() == Some(session_id.as_str());
            if in_flight || settled {
                false
            } else {
                // A send still streaming for the old session is abandoned.
                state.active_send = None;
                state.messages.clear();
                state.pending_message = None;
                state.streaming_buffer.clear();
                state.search_query.clear();
                state.is_processing = true;
                state.pending_selection = Some(session_id.clone());
                effects.push(Effect::LoadSession { session_id });
                true
            }
        }

        Input::SelectionLoaded {
            session_id,
            messages,
            model,
        } => {
            if state.pending_selection.as_deref() != Some(session_id.as_str()) {
                false
            } else {
                state.current_session_id = Some(session_id);
                state.messages = messages;
                if !model.trim().is_empty() {
                    state.settings.model = model;
                }
                true
            }
        }

        Input::SelectionFinished { session_id } => {
            if state.pending_selection.as_deref() != Some(session_id.as_str()) {
                false
            } else {
                state.pending_selection = None;
                state.is_processing = state.active_send.is_some();
                true
            }
        }

        // -- Send pipeline ---------------------------------------------------
        Input::SendRequested { send_id, message } => match state.current_session_id.clone() {
            Some(session_id) if !state.is_processing => {
                let untitled = state
                    .current_session()
                    .is_some_and(|s| s.title == DEFAULT_SESSION_TITLE);
                if untitled && state.messages.is_empty() {
                    effects.push(Effect::AssignTitle {
                        session_id: session_id.clone(),
                        first_message: message.content.clone(),
                    });
                }

                let ticket = SendTicket {
                    send_id,
                    session_id,
                };
                effects.push(Effect::StartStream {
                    ticket: ticket.clone(),
                    content: message.content.clone(),
                    model: state.settings.model.clone(),
                });

                state.pending_message = Some(message);
                state.is_processing = true;
                state.streaming_buffer.clear();
                state.active_send = Some(ticket);
                true
            }
            _ => false,
        },

        Input::FragmentReceived { send_id, text } => match &state.active_send {
            Some(ticket) if ticket.send_id == send_id && !text.is_empty() => {
                let session_id = ticket.session_id.clone();
                state.streaming_buffer.push_str(&text);
                effects.push(Effect::Emit(Box::new(CoordinatorEvent::Fragment {
                    session_id,
                    text,
                })));
                true
            }
            _ => false,
        },

        Input::SendFinished { send_id, canonical } => {
            let is_active = state
                .active_send
                .as_ref()
                .is_some_and(|t| t.send_id == send_id);
            if !is_active {
                false
            } else {
                let pending = state.pending_message.take();
                match canonical {
                    Some(messages) => {
                        if let Some(pending) = &pending {
                            let echoed = messages
                                .iter()
                                .any(|m| m.role == Role::User && m.content == pending.content);
                            if !echoed {
                                warn!(
                                    component = "transition",
                                    event = "send.history_diverged",
                                    send_id = %send_id,
                                    "Canonical history is missing the sent user message"
                                );
                            }
                        }
                        state.messages = messages;
                    }
                    // Optimistic messages are never rolled back.
                    None => state.messages.extend(pending),
                }
                state.active_send = None;
                state.is_processing = state.pending_selection.is_some();
                state.streaming_buffer.clear();
                true
            }
        }

        // -- Settings --------------------------------------------------------
        Input::SettingsLoaded(settings) => replace(&mut state.settings, settings),

        Input::SettingsPatched(patch) => {
            let merged = state.settings.merged(&patch);
            let model_changed = merged.model != state.settings.model;
            state.settings = merged.clone();
            if model_changed {
                effects.push(Effect::UpdateModel(merged.model.clone()));
            }
            effects.push(Effect::PersistSettings(merged));
            true
        }

        // -- UI toggles and dialogs ------------------------------------------
        Input::ToggleLeftSidebar => toggle(&mut state.ui.left_sidebar_open),
        Input::ToggleRightSidebar => toggle(&mut state.ui.right_sidebar_open),
        Input::TogglePromptLibrary => toggle(&mut state.ui.prompt_library_open),
        Input::TogglePromptBuilder => toggle(&mut state.ui.prompt_builder_open),
        Input::ToggleVibeCodingMode => toggle(&mut state.ui.vibe_coding_mode),

        Input::SearchQueryChanged(query) => replace(&mut state.search_query, query),

        Input::DeleteDialogOpened { session_id } => {
            replace(&mut state.session_to_delete, Some(session_id))
        }
        Input::DeleteDialogClosed => replace(&mut state.session_to_delete, None),
        Input::RenameDialogOpened { session_id } => {
            replace(&mut state.session_to_rename, Some(session_id))
        }
        Input::RenameDialogClosed => replace(&mut state.session_to_rename, None),
    };

    if changed {
        state.revision += 1;
    }
    (state, effects)
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

fn toggle(flag: &mut bool) -> bool {
    *flag = !*flag;
    true
}
