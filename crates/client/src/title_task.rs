//! Background title assignment for a session's first message.
//!
//! Fire-and-forget: runs beside the send pipeline and never touches its
//! state. Failures are logged and the session keeps its placeholder title.

use chrono::Local;
use cognicore_protocol::naming::first_message_title;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::coordinator::StateCoordinator;

/// Spawn a task that titles `session_id` after `first_message`, then
/// refreshes the session list.
pub fn spawn_title_task(
    coordinator: StateCoordinator,
    session_id: String,
    first_message: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let Some(title) = first_message_title(&first_message, &Local::now()) else {
            return;
        };

        match coordinator
            .registry()
            .update_session_title(&session_id, &title)
            .await
        {
            Ok(()) => {
                info!(
                    component = "title_task",
                    event = "session.titled",
                    session_id = %session_id,
                    title = %title,
                    "Session titled from first message"
                );
                coordinator.list_sessions().await;
            }
            Err(e) => {
                warn!(
                    component = "title_task",
                    event = "session.title_failed",
                    session_id = %session_id,
                    error = %e,
                    "Failed to title session"
                );
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::testing::{session, FakeChannel, FakeRegistry, Harness};

    #[tokio::test]
    async fn titles_session_and_refreshes_list() {
        let h = Harness::new(
            FakeRegistry::with_sessions(vec![session("s-1", "New Chat")]),
            FakeChannel::default(),
        );

        spawn_title_task(h.coordinator.clone(), "s-1".to_string(), "  What   is Rust? ".to_string())
            .await
            .expect("join");

        let state = h.state();
        assert!(state.sessions[0].title.starts_with("What is Rust? • "));
    }

    #[tokio::test]
    async fn failure_leaves_session_list_untouched() {
        let registry = FakeRegistry::with_sessions(vec![session("s-1", "New Chat")]);
        registry.fail_rename.store(true, Ordering::SeqCst);
        let h = Harness::new(registry, FakeChannel::default());

        spawn_title_task(h.coordinator.clone(), "s-1".to_string(), "hello".to_string())
            .await
            .expect("join");

        let calls = h.registry.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("title s-1 hello • "));
        assert!(h.state().sessions.is_empty());
    }
}
