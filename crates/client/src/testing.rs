//! In-memory fakes of the coordinator's collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cognicore_protocol::{Message, MessagesPayload, Role, Session};
use tokio::sync::Notify;

use crate::channel::{FragmentSink, StreamingChannel};
use crate::coordinator::StateCoordinator;
use crate::error::ClientError;
use crate::registry::SessionRegistryClient;
use crate::settings::MemorySettingsStore;
use crate::state::CoordinatorState;

pub fn session(id: &str, title: &str) -> Session {
    Session {
        id: id.to_string(),
        title: title.to_string(),
        last_active: 0,
    }
}

pub fn message(id: &str, role: Role, content: &str) -> Message {
    Message {
        id: id.to_string(),
        role,
        content: content.to_string(),
        timestamp: 0,
        tool_calls: None,
    }
}

// ---------------------------------------------------------------------------
// FakeRegistry
// ---------------------------------------------------------------------------

/// Reliable in-memory registry, most recently created session first.
#[derive(Default)]
pub struct FakeRegistry {
    sessions: Mutex<Vec<Session>>,
    calls: Mutex<Vec<String>>,
    pub fail_list: AtomicBool,
    pub fail_create: AtomicBool,
    pub fail_delete: AtomicBool,
    pub fail_rename: AtomicBool,
}

impl FakeRegistry {
    pub fn with_sessions(sessions: Vec<Session>) -> Self {
        let registry = Self::default();
        *registry.sessions.lock().unwrap() = sessions;
        registry
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.lock().unwrap().iter().map(|s| s.id.clone()).collect()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn fail(flag: &AtomicBool, what: &str) -> Result<(), ClientError> {
        if flag.load(Ordering::SeqCst) {
            return Err(ClientError::Registry(format!("{what} unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionRegistryClient for FakeRegistry {
    async fn list_sessions(&self) -> Result<Vec<Session>, ClientError> {
        self.record("list".to_string());
        Self::fail(&self.fail_list, "list")?;
        Ok(self.sessions.lock().unwrap().clone())
    }

    async fn create_session(&self, title: &str, session_id: &str) -> Result<(), ClientError> {
        self.record(format!("create {session_id} {title}"));
        Self::fail(&self.fail_create, "create")?;
        self.sessions
            .lock()
            .unwrap()
            .insert(0, session(session_id, title));
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), ClientError> {
        self.record(format!("delete {session_id}"));
        Self::fail(&self.fail_delete, "delete")?;
        let mut sessions = self.sessions.lock().unwrap();
        let before = sessions.len();
        sessions.retain(|s| s.id != session_id);
        if sessions.len() == before {
            return Err(ClientError::Registry("Session not found".to_string()));
        }
        Ok(())
    }

    async fn update_session_title(
        &self,
        session_id: &str,
        title: &str,
    ) -> Result<(), ClientError> {
        self.record(format!("title {session_id} {title}"));
        Self::fail(&self.fail_rename, "rename")?;
        let mut sessions = self.sessions.lock().unwrap();
        match sessions.iter_mut().find(|s| s.id == session_id) {
            Some(s) => {
                s.title = title.to_string();
                Ok(())
            }
            None => Err(ClientError::Registry("Session not found".to_string())),
        }
    }

    async fn session_count(&self) -> Result<u64, ClientError> {
        Ok(self.sessions.lock().unwrap().len() as u64)
    }

    async fn clear_all_sessions(&self) -> Result<u64, ClientError> {
        let mut sessions = self.sessions.lock().unwrap();
        let cleared = sessions.len() as u64;
        sessions.clear();
        Ok(cleared)
    }
}

// ---------------------------------------------------------------------------
// FakeChannel
// ---------------------------------------------------------------------------

/// Scripted channel. Every send streams `fragments`, records the turn into
/// the addressed session's history and completes. With a gate installed, the
/// stream pauses after its first fragment until the gate is notified.
#[derive(Default)]
pub struct FakeChannel {
    bound: Mutex<Option<String>>,
    histories: Mutex<HashMap<String, Vec<Message>>>,
    models: Mutex<HashMap<String, String>>,
    fragments: Mutex<Vec<String>>,
    sent: Mutex<Vec<(String, String, String)>>,
    model_updates: Mutex<Vec<String>>,
    gate: Option<Arc<Notify>>,
    next_id: AtomicU64,
    pub fail_stream: AtomicBool,
    pub fail_history: AtomicBool,
}

impl FakeChannel {
    pub fn streaming(fragments: &[&str]) -> Self {
        let channel = Self::default();
        channel.set_fragments(fragments);
        channel
    }

    pub fn gated(fragments: &[&str], gate: Arc<Notify>) -> Self {
        let channel = Self {
            gate: Some(gate),
            ..Default::default()
        };
        channel.set_fragments(fragments);
        channel
    }

    pub fn set_fragments(&self, fragments: &[&str]) {
        *self.fragments.lock().unwrap() = fragments.iter().map(|f| f.to_string()).collect();
    }

    pub fn set_history(&self, session_id: &str, messages: Vec<Message>, model: &str) {
        self.histories
            .lock()
            .unwrap()
            .insert(session_id.to_string(), messages);
        self.models
            .lock()
            .unwrap()
            .insert(session_id.to_string(), model.to_string());
    }

    /// `(session_id, content, model)` of every send that reached the channel
    pub fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn model_updates(&self) -> Vec<String> {
        self.model_updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl StreamingChannel for FakeChannel {
    fn switch_session(&self, session_id: &str) {
        *self.bound.lock().unwrap() = Some(session_id.to_string());
    }

    fn new_session(&self) {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        *self.bound.lock().unwrap() = Some(format!("new-{n}"));
    }

    fn session_id(&self) -> Option<String> {
        self.bound.lock().unwrap().clone()
    }

    fn update_model(&self, model: &str) {
        self.model_updates.lock().unwrap().push(model.to_string());
    }

    async fn history(&self, session_id: &str) -> Result<MessagesPayload, ClientError> {
        if self.fail_history.load(Ordering::SeqCst) {
            return Err(ClientError::Channel("history unavailable".to_string()));
        }
        let messages = self
            .histories
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .unwrap_or_default();
        let model = self
            .models
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .unwrap_or_default();
        Ok(MessagesPayload { messages, model })
    }

    async fn stream_turn(
        &self,
        session_id: &str,
        content: &str,
        model: &str,
        on_fragment: FragmentSink<'_>,
    ) -> Result<(), ClientError> {
        let session_id = session_id.to_string();
        self.sent
            .lock()
            .unwrap()
            .push((session_id.clone(), content.to_string(), model.to_string()));
        if self.fail_stream.load(Ordering::SeqCst) {
            return Err(ClientError::Channel("stream dropped".to_string()));
        }

        let fragments = self.fragments.lock().unwrap().clone();
        for (i, fragment) in fragments.iter().enumerate() {
            on_fragment(fragment);
            if i == 0 {
                if let Some(gate) = &self.gate {
                    gate.notified().await;
                }
            }
        }

        let mut histories = self.histories.lock().unwrap();
        let history = histories.entry(session_id.clone()).or_default();
        let n = history.len();
        history.push(message(&format!("{session_id}-{n}"), Role::User, content));
        history.push(message(
            &format!("{session_id}-{}", n + 1),
            Role::Assistant,
            &fragments.concat(),
        ));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub coordinator: StateCoordinator,
    pub registry: Arc<FakeRegistry>,
    pub channel: Arc<FakeChannel>,
    pub store: Arc<MemorySettingsStore>,
}

impl Harness {
    pub fn new(registry: FakeRegistry, channel: FakeChannel) -> Self {
        Self::with_store(registry, channel, MemorySettingsStore::new())
    }

    pub fn with_store(
        registry: FakeRegistry,
        channel: FakeChannel,
        store: MemorySettingsStore,
    ) -> Self {
        let registry = Arc::new(registry);
        let channel = Arc::new(channel);
        let store = Arc::new(store);
        let coordinator = StateCoordinator::new(registry.clone(), channel.clone(), store.clone());
        Self {
            coordinator,
            registry,
            channel,
            store,
        }
    }

    pub fn state(&self) -> Arc<CoordinatorState> {
        self.coordinator.snapshot()
    }

    /// Poll the published snapshot until `pred` holds.
    pub async fn wait_for(&self, what: &str, pred: impl Fn(&CoordinatorState) -> bool) {
        let coordinator = self.coordinator.clone();
        eventually(what, move || pred(&coordinator.snapshot())).await;
    }
}

/// Poll `check` until it returns true, failing the test after two seconds.
pub async fn eventually(what: &str, check: impl Fn() -> bool) {
    let polled = tokio::time::timeout(Duration::from_secs(2), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    if polled.is_err() {
        panic!("timed out waiting for {what}");
    }
}
