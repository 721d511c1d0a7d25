//! Core types shared across the protocol

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Registry entry for a conversation thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub title: String,
    /// Epoch millis of the last create or chat turn
    pub last_active: i64,
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// A tool invocation recorded on an assistant message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    /// Epoch millis
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl Message {
    /// A user message stamped with a fresh id and the current time.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: crate::new_id(),
            role: Role::User,
            content: content.into(),
            timestamp: crate::now_millis(),
            tool_calls: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_uses_camel_case_tool_calls() {
        let msg = Message {
            id: "m-1".to_string(),
            role: Role::Assistant,
            content: "done".to_string(),
            timestamp: 42,
            tool_calls: Some(vec![ToolCall {
                name: "get_weather".to_string(),
                arguments: serde_json::json!({ "city": "Oslo" }),
            }]),
        };

        let json = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["toolCalls"][0]["name"], "get_weather");
        assert_eq!(json["toolCalls"][0]["arguments"]["city"], "Oslo");
    }

    #[test]
    fn message_without_tool_calls_omits_field() {
        let msg = Message::user("hi");
        let json = serde_json::to_value(&msg).expect("serialize");
        assert!(json.get("toolCalls").is_none());
        assert_eq!(json["role"], "user");
    }

    #[test]
    fn session_parses_last_active() {
        let session: Session =
            serde_json::from_str(r#"{"id":"s-1","title":"New Chat","lastActive":1700000000000}"#)
                .expect("deserialize");
        assert_eq!(session.title, "New Chat");
        assert_eq!(session.last_active, 1_700_000_000_000);
    }
}
