//! Session registry collaborator and its HTTP implementation.
//!
//! Results are eventually consistent: a session created a moment ago may
//! not appear in the very next listing.

use std::time::Duration;

use async_trait::async_trait;
use cognicore_protocol::{
    ApiResponse, ClearedPayload, CreateSessionRequest, CreatedSessionPayload, DeletedPayload,
    GeneratePromptRequest, Session, SessionStats, TitlePayload, UpdateTitleRequest,
};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ClientError;

/// Session CRUD against the remote store
#[async_trait]
pub trait SessionRegistryClient: Send + Sync {
    async fn list_sessions(&self) -> Result<Vec<Session>, ClientError>;
    async fn create_session(&self, title: &str, session_id: &str) -> Result<(), ClientError>;
    async fn delete_session(&self, session_id: &str) -> Result<(), ClientError>;
    async fn update_session_title(&self, session_id: &str, title: &str)
        -> Result<(), ClientError>;
    async fn session_count(&self) -> Result<u64, ClientError>;
    async fn clear_all_sessions(&self) -> Result<u64, ClientError>;
}

/// REST client for `/api/sessions` and `/api/generate-prompt`
#[derive(Clone)]
pub struct HttpRegistryClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRegistryClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Ask the prompt builder for starter prompts.
    /// A blank goal is rejected before any request is made.
    pub async fn generate_prompts(&self, goal: &str) -> Result<Vec<String>, ClientError> {
        let goal = goal.trim();
        if goal.is_empty() {
            return Err(ClientError::Validation("Goal is required".to_string()));
        }
        let body = GeneratePromptRequest {
            goal: Some(goal.to_string()),
        };
        let resp = self
            .client
            .post(self.url("/api/generate-prompt"))
            .json(&body)
            .send()
            .await?;
        decode(resp).await
    }
}

/// Unwrap an `ApiResponse` envelope, mapping `success: false` to a registry
/// error carrying the server's message.
async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
    let status = resp.status();
    let envelope: ApiResponse<T> = resp.json().await.map_err(|e| {
        ClientError::Registry(format!("unreadable response (HTTP {status}): {e}"))
    })?;
    envelope.into_result().map_err(|message| {
        debug!(
            component = "registry",
            event = "registry.request_failed",
            status = %status,
            error = %message,
            "Registry request failed"
        );
        ClientError::Registry(message)
    })
}

#[async_trait]
impl SessionRegistryClient for HttpRegistryClient {
    async fn list_sessions(&self) -> Result<Vec<Session>, ClientError> {
        let resp = self.client.get(self.url("/api/sessions")).send().await?;
        decode(resp).await
    }

    async fn create_session(&self, title: &str, session_id: &str) -> Result<(), ClientError> {
        let body = CreateSessionRequest {
            title: Some(title.to_string()),
            session_id: Some(session_id.to_string()),
            first_message: None,
        };
        let resp = self
            .client
            .post(self.url("/api/sessions"))
            .json(&body)
            .send()
            .await?;
        let _: CreatedSessionPayload = decode(resp).await?;
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), ClientError> {
        let resp = self
            .client
            .delete(self.url(&format!("/api/sessions/{session_id}")))
            .send()
            .await?;
        let _: DeletedPayload = decode(resp).await?;
        Ok(())
    }

    async fn update_session_title(
        &self,
        session_id: &str,
        title: &str,
    ) -> Result<(), ClientError> {
        let body = UpdateTitleRequest {
            title: Some(title.to_string()),
            first_message: None,
        };
        let resp = self
            .client
            .put(self.url(&format!("/api/sessions/{session_id}/title")))
            .json(&body)
            .send()
            .await?;
        let _: TitlePayload = decode(resp).await?;
        Ok(())
    }

    async fn session_count(&self) -> Result<u64, ClientError> {
        let resp = self
            .client
            .get(self.url("/api/sessions/stats"))
            .send()
            .await?;
        let stats: SessionStats = decode(resp).await?;
        Ok(stats.total_sessions)
    }

    async fn clear_all_sessions(&self) -> Result<u64, ClientError> {
        let resp = self.client.delete(self.url("/api/sessions")).send().await?;
        let cleared: ClearedPayload = decode(resp).await?;
        Ok(cleared.deleted_count)
    }
}
