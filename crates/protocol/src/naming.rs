//! Session title formatting shared by the registry server and the client.

use std::fmt;

use chrono::{DateTime, TimeZone};

/// Placeholder title given to freshly created sessions.
pub const DEFAULT_SESSION_TITLE: &str = "New Chat";

const MAX_TITLE_CHARS: usize = 40;
const TRUNCATED_CHARS: usize = 37;

/// Title derived from the first message of a session:
/// `"<message, truncated> • MM/DD HH:MM"`.
///
/// Returns `None` for blank messages.
pub fn first_message_title<Tz>(message: &str, now: &DateTime<Tz>) -> Option<String>
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let normalized = message.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        return None;
    }

    let truncated = if normalized.chars().count() > MAX_TITLE_CHARS {
        let mut out: String = normalized.chars().take(TRUNCATED_CHARS).collect();
        out.push_str("...");
        out
    } else {
        normalized
    };
    Some(format!("{} • {}", truncated, session_timestamp(now)))
}

/// Title for a session created without a title or a first message.
pub fn untitled_session_title<Tz>(now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    format!("Chat {}", session_timestamp(now))
}

fn session_timestamp<Tz>(now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    now.format("%m/%d %H:%M").to_string()
}
