//! Client → Server request bodies

use serde::{Deserialize, Serialize};

/// Body of `POST /api/sessions`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_message: Option<String>,
}

/// Body of `PUT /api/sessions/:id/title`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTitleRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_message: Option<String>,
}

/// Body of `POST /api/generate-prompt`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneratePromptRequest {
    #[serde(default)]
    pub goal: Option<String>,
}

/// Body of `POST /api/chat/:id/chat`, forwarded to the session's agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendChatRequest {
    pub message: String,
    pub model: String,
    pub stream: bool,
}
