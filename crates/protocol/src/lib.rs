//! CogniCore Protocol
//!
//! Shared types for communication between the session registry server
//! and chat clients. These types are serialized as camelCase JSON over HTTP.

use uuid::Uuid;

// Re-exports
pub mod client;
pub mod naming;
pub mod server;
pub mod types;

pub use client::{CreateSessionRequest, GeneratePromptRequest, SendChatRequest, UpdateTitleRequest};
pub use server::{
    ApiResponse, ClearedPayload, CreatedSessionPayload, DeletedPayload, MessagesPayload,
    SessionStats, TitlePayload,
};
pub use types::*;

/// Generate a new unique ID
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Milliseconds since the Unix epoch, the timestamp unit used on the wire.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
