//! Application state

use std::sync::Arc;

use crate::prompt_builder::PromptBuilder;
use crate::registry::SessionStore;

/// Shared application state, handed to every handler.
pub struct AppState {
    /// Session registry
    pub store: SessionStore,

    /// Prompt builder backed by the AI gateway
    pub prompts: PromptBuilder,

    /// Client used to forward chat traffic to the agents
    pub agent_client: reqwest::Client,

    /// Base URL of the chat agent service, without trailing slash
    pub agent_url: String,
}

impl AppState {
    pub fn new(store: SessionStore, prompts: PromptBuilder, agent_url: &str) -> Arc<Self> {
        Arc::new(Self {
            store,
            prompts,
            agent_client: reqwest::Client::new(),
            agent_url: agent_url.trim_end_matches('/').to_string(),
        })
    }

    /// Upstream URL for `rest` under one session's agent
    pub fn agent_endpoint(&self, session_id: &str, rest: &str) -> String {
        format!(
            "{}/agents/{}/{}",
            self.agent_url,
            session_id,
            rest.trim_start_matches('/')
        )
    }
}
