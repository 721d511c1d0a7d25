//! Session lifecycle and streaming-response state coordinator.
//!
//! Actions call collaborators, turn their results into `transition::Input`s
//! and feed them through `apply`, the single writer. `apply` runs the pure
//! transition under a mutex, publishes the new snapshot through `ArcSwap`
//! and broadcasts events. Readers never lock.

use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use cognicore_protocol::naming::DEFAULT_SESSION_TITLE;
use cognicore_protocol::{new_id, Message};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::channel::StreamingChannel;
use crate::error::ClientError;
use crate::event::{CoordinatorEvent, Notice};
use crate::registry::SessionRegistryClient;
use crate::settings::{load_settings, save_settings, SettingsPatch, SettingsStore};
use crate::state::{CoordinatorState, SendTicket};
use crate::title_task::spawn_title_task;
use crate::transition::{transition, Effect, Input};

const EVENT_CAPACITY: usize = 256;

/// Cheaply clonable handle; all clones share one state.
#[derive(Clone)]
pub struct StateCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Arc<dyn SessionRegistryClient>,
    channel: Arc<dyn StreamingChannel>,
    settings_store: Arc<dyn SettingsStore>,
    snapshot: ArcSwap<CoordinatorState>,
    writer: Mutex<()>,
    events: broadcast::Sender<CoordinatorEvent>,
}

impl StateCoordinator {
    pub fn new(
        registry: Arc<dyn SessionRegistryClient>,
        channel: Arc<dyn StreamingChannel>,
        settings_store: Arc<dyn SettingsStore>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                registry,
                channel,
                settings_store,
                snapshot: ArcSwap::from_pointee(CoordinatorState::default()),
                writer: Mutex::new(()),
                events,
            }),
        }
    }

    /// Lock-free snapshot read.
    pub fn snapshot(&self) -> Arc<CoordinatorState> {
        self.inner.snapshot.load_full()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.inner.events.subscribe()
    }

    pub(crate) fn registry(&self) -> &Arc<dyn SessionRegistryClient> {
        &self.inner.registry
    }

    // -- Single writer -------------------------------------------------------

    /// Run one transition and publish its result. `Emit` effects are
    /// broadcast here; the rest are returned for the caller to execute.
    fn apply(&self, input: Input) -> Vec<Effect> {
        let _writer = self
            .inner
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let current = self.inner.snapshot.load_full();
        let (next, effects) = transition(CoordinatorState::clone(&current), input);
        if next.revision != current.revision {
            let revision = next.revision;
            self.inner.snapshot.store(Arc::new(next));
            let _ = self
                .inner
                .events
                .send(CoordinatorEvent::StateChanged { revision });
        }

        let mut remaining = Vec::with_capacity(effects.len());
        for effect in effects {
            match effect {
                Effect::Emit(event) => {
                    let _ = self.inner.events.send(*event);
                }
                other => remaining.push(other),
            }
        }
        remaining
    }

    async fn run_effects(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::LoadSession { session_id } => self.load_session(session_id).await,
                Effect::StartStream {
                    ticket,
                    content,
                    model,
                } => self.stream(ticket, content, model).await,
                Effect::AssignTitle {
                    session_id,
                    first_message,
                } => {
                    spawn_title_task(self.clone(), session_id, first_message);
                }
                Effect::PersistSettings(settings) => {
                    if let Err(e) = save_settings(self.inner.settings_store.as_ref(), &settings).await
                    {
                        warn!(
                            component = "coordinator",
                            event = "settings.persist_failed",
                            error = %e,
                            "Failed to persist settings"
                        );
                    }
                }
                Effect::UpdateModel(model) => self.inner.channel.update_model(&model),
                Effect::Emit(event) => {
                    let _ = self.inner.events.send(*event);
                }
            }
        }
    }

    fn notice(&self, notice: Notice) {
        debug!(
            component = "coordinator",
            event = "notice",
            level = ?notice.level,
            text = %notice.text,
            "User notice"
        );
        let _ = self.inner.events.send(CoordinatorEvent::Notice(notice));
    }

    // -- Session lifecycle ---------------------------------------------------

    /// Load settings, then select the most recent session, creating one when
    /// the registry is empty or unreachable.
    pub async fn initialize(&self) {
        let settings = load_settings(self.inner.settings_store.as_ref()).await;
        self.apply(Input::SettingsLoaded(settings));

        self.apply(Input::ProcessingStarted);
        match self.inner.registry.list_sessions().await {
            Ok(sessions) => {
                let first = sessions.first().map(|s| s.id.clone());
                self.apply(Input::SessionsLoaded(sessions));
                match first {
                    Some(session_id) => self.select_session(&session_id).await,
                    None => {
                        self.create_and_select().await;
                    }
                }
            }
            Err(e) => {
                warn!(
                    component = "coordinator",
                    event = "sessions.list_failed",
                    error = %e,
                    "Failed to list sessions during initialization, starting a new one"
                );
                self.create_and_select().await;
            }
        }
        self.apply(Input::ProcessingFinished);

        info!(
            component = "coordinator",
            event = "coordinator.initialized",
            session_id = ?self.snapshot().current_session_id,
            "Coordinator initialized"
        );
    }

    /// Refresh the session list. Failures keep the previous list.
    pub async fn list_sessions(&self) {
        match self.inner.registry.list_sessions().await {
            Ok(sessions) => {
                self.apply(Input::SessionsLoaded(sessions));
            }
            Err(e) => {
                warn!(
                    component = "coordinator",
                    event = "sessions.list_failed",
                    error = %e,
                    "Failed to list sessions"
                );
            }
        }
    }

    pub async fn select_session(&self, session_id: &str) {
        let effects = self.apply(Input::SelectionStarted {
            session_id: session_id.to_string(),
        });
        self.run_effects(effects).await;
    }

    async fn load_session(&self, session_id: String) {
        self.inner.channel.switch_session(&session_id);
        match self.inner.channel.history(&session_id).await {
            Ok(payload) => {
                debug!(
                    component = "coordinator",
                    event = "session.loaded",
                    session_id = %session_id,
                    messages = payload.messages.len(),
                    "Session history loaded"
                );
                self.apply(Input::SelectionLoaded {
                    session_id: session_id.clone(),
                    messages: payload.messages,
                    model: payload.model,
                });
            }
            Err(e) => {
                warn!(
                    component = "coordinator",
                    event = "session.load_failed",
                    session_id = %session_id,
                    error = %e,
                    "Failed to load session"
                );
                if self.snapshot().pending_selection.as_deref() == Some(session_id.as_str()) {
                    self.notice(Notice::error("Failed to load session."));
                    self.rebind_channel();
                }
            }
        }
        self.apply(Input::SelectionFinished { session_id });
    }

    /// Point the channel back at the current session after a selection or
    /// creation that never became current.
    fn rebind_channel(&self) {
        if let Some(current) = self.snapshot().current_session_id.as_deref() {
            self.inner.channel.switch_session(current);
        }
    }

    /// Create a session titled "New Chat" and make it current.
    /// Returns `None` when the registry refused the creation.
    pub async fn create_session(&self) -> Option<String> {
        self.apply(Input::ProcessingStarted);
        let created = self.create_and_select().await;
        self.apply(Input::ProcessingFinished);
        created
    }

    async fn create_and_select(&self) -> Option<String> {
        self.inner.channel.new_session();
        let Some(session_id) = self.inner.channel.session_id() else {
            warn!(
                component = "coordinator",
                event = "session.create_failed",
                "Channel did not allocate a session id"
            );
            self.notice(Notice::error("Failed to create session."));
            return None;
        };

        if let Err(e) = self
            .inner
            .registry
            .create_session(DEFAULT_SESSION_TITLE, &session_id)
            .await
        {
            warn!(
                component = "coordinator",
                event = "session.create_failed",
                session_id = %session_id,
                error = %e,
                "Failed to create session"
            );
            self.notice(Notice::error("Failed to create session."));
            self.rebind_channel();
            return None;
        }

        info!(
            component = "coordinator",
            event = "session.created",
            session_id = %session_id,
            "Session created"
        );
        self.apply(Input::ConversationReset);
        self.list_sessions().await;
        self.select_session(&session_id).await;
        Some(session_id)
    }

    pub fn open_delete_dialog(&self, session_id: &str) {
        self.apply(Input::DeleteDialogOpened {
            session_id: session_id.to_string(),
        });
    }

    pub fn close_delete_dialog(&self) {
        self.apply(Input::DeleteDialogClosed);
    }

    /// Delete the session targeted by the delete dialog. When it was the
    /// current one, the first remaining session (or a new one) takes over.
    pub async fn delete_session(&self) {
        let Some(session_id) = self.snapshot().session_to_delete.clone() else {
            return;
        };

        match self.inner.registry.delete_session(&session_id).await {
            Ok(()) => {
                info!(
                    component = "coordinator",
                    event = "session.deleted",
                    session_id = %session_id,
                    "Session deleted"
                );
                self.notice(Notice::success("Session deleted."));
                self.list_sessions().await;
                self.apply(Input::SessionRemoved {
                    session_id: session_id.clone(),
                });

                let state = self.snapshot();
                if state.current_session_id.as_deref() == Some(session_id.as_str()) {
                    match state.sessions.first().map(|s| s.id.clone()) {
                        Some(next) => self.select_session(&next).await,
                        None => {
                            self.create_session().await;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(
                    component = "coordinator",
                    event = "session.delete_failed",
                    session_id = %session_id,
                    error = %e,
                    "Failed to delete session"
                );
                self.notice(Notice::error("Failed to delete session."));
            }
        }
        self.apply(Input::DeleteDialogClosed);
    }

    pub fn open_rename_dialog(&self, session_id: &str) {
        self.apply(Input::RenameDialogOpened {
            session_id: session_id.to_string(),
        });
    }

    pub fn close_rename_dialog(&self) {
        self.apply(Input::RenameDialogClosed);
    }

    /// Rename the session targeted by the rename dialog.
    ///
    /// A blank title or a missing target is rejected before any registry
    /// call and leaves the dialog open. Registry failures are reported
    /// through a notice and returned.
    pub async fn rename_session(&self, title: &str) -> Result<(), ClientError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ClientError::Validation("title cannot be empty".to_string()));
        }
        let Some(session_id) = self.snapshot().session_to_rename.clone() else {
            return Err(ClientError::Validation(
                "no session selected for rename".to_string(),
            ));
        };

        let result = self
            .inner
            .registry
            .update_session_title(&session_id, title)
            .await;
        match &result {
            Ok(()) => {
                info!(
                    component = "coordinator",
                    event = "session.renamed",
                    session_id = %session_id,
                    "Session renamed"
                );
                self.notice(Notice::success("Session renamed."));
                self.list_sessions().await;
            }
            Err(e) => {
                warn!(
                    component = "coordinator",
                    event = "session.rename_failed",
                    session_id = %session_id,
                    error = %e,
                    "Failed to rename session"
                );
                self.notice(Notice::error("Failed to rename session."));
            }
        }
        self.apply(Input::RenameDialogClosed);
        result
    }

    pub async fn session_count(&self) -> Result<u64, ClientError> {
        self.inner.registry.session_count().await
    }

    /// Remove every session from the registry and refresh the list.
    pub async fn clear_all_sessions(&self) -> Result<u64, ClientError> {
        let cleared = self.inner.registry.clear_all_sessions().await?;
        info!(
            component = "coordinator",
            event = "sessions.cleared",
            cleared,
            "All sessions cleared"
        );
        self.list_sessions().await;
        Ok(cleared)
    }

    // -- Send pipeline -------------------------------------------------------

    /// Send a user message to the current session and stream the reply.
    ///
    /// Returns `false` without doing anything when the content is blank, a
    /// send or selection is in flight, or no session is current.
    pub async fn send_message(&self, content: &str) -> bool {
        if content.trim().is_empty() {
            return false;
        }
        let message = Message::user(content);
        let effects = self.apply(Input::SendRequested {
            send_id: new_id(),
            message,
        });
        if effects.is_empty() {
            debug!(
                component = "coordinator",
                event = "send.rejected",
                "Send ignored while busy or without a current session"
            );
            return false;
        }
        self.run_effects(effects).await;
        true
    }

    async fn stream(&self, ticket: SendTicket, content: String, model: String) {
        info!(
            component = "coordinator",
            event = "send.started",
            session_id = %ticket.session_id,
            send_id = %ticket.send_id,
            model = %model,
            "Streaming assistant reply"
        );

        let mut on_fragment = |text: &str| {
            self.apply(Input::FragmentReceived {
                send_id: ticket.send_id.clone(),
                text: text.to_string(),
            });
        };
        if let Err(e) = self
            .inner
            .channel
            .stream_turn(&ticket.session_id, &content, &model, &mut on_fragment)
            .await
        {
            warn!(
                component = "coordinator",
                event = "send.stream_failed",
                session_id = %ticket.session_id,
                send_id = %ticket.send_id,
                error = %e,
                "Streaming failed"
            );
            if self.is_active_send(&ticket) {
                self.notice(Notice::error("Failed to get a response."));
            }
        }

        // A stale send applies nothing, so its history is not refetched.
        let canonical = if self.is_active_send(&ticket) {
            match self.inner.channel.history(&ticket.session_id).await {
                Ok(payload) => Some(payload.messages),
                Err(e) => {
                    warn!(
                        component = "coordinator",
                        event = "send.refresh_failed",
                        session_id = %ticket.session_id,
                        error = %e,
                        "Failed to refresh history, keeping optimistic message"
                    );
                    None
                }
            }
        } else {
            debug!(
                component = "coordinator",
                event = "send.stale",
                session_id = %ticket.session_id,
                send_id = %ticket.send_id,
                "Discarding send abandoned by a session switch"
            );
            None
        };

        self.apply(Input::SendFinished {
            send_id: ticket.send_id,
            canonical,
        });
    }

    fn is_active_send(&self, ticket: &SendTicket) -> bool {
        self.snapshot().active_send.as_ref() == Some(ticket)
    }

    // -- Settings ------------------------------------------------------------

    /// Merge a patch, persist the full result and push a model change to the
    /// channel.
    pub async fn set_settings(&self, patch: SettingsPatch) {
        let effects = self.apply(Input::SettingsPatched(patch));
        self.run_effects(effects).await;
    }

    // -- UI state ------------------------------------------------------------

    pub fn toggle_left_sidebar(&self) {
        self.apply(Input::ToggleLeftSidebar);
    }

    pub fn toggle_right_sidebar(&self) {
        self.apply(Input::ToggleRightSidebar);
    }

    pub fn toggle_prompt_library(&self) {
        self.apply(Input::TogglePromptLibrary);
    }

    pub fn toggle_prompt_builder(&self) {
        self.apply(Input::TogglePromptBuilder);
    }

    pub fn toggle_vibe_coding_mode(&self) {
        self.apply(Input::ToggleVibeCodingMode);
    }

    pub fn set_search_query(&self, query: &str) {
        self.apply(Input::SearchQueryChanged(query.to_string()));
    }

    pub fn clear_search(&self) {
        self.apply(Input::SearchQueryChanged(String::new()));
    }
}
