//! CogniCore chat client
//!
//! `StateCoordinator` owns the conversation state of one chat window: the
//! session list, the current session's history and the in-flight streaming
//! reply. It talks to three collaborators, each behind a trait so tests can
//! substitute fakes:
//!
//! - [`SessionRegistryClient`]: session CRUD on the registry server
//! - [`StreamingChannel`]: history fetch and streamed assistant turns
//! - [`SettingsStore`]: durable generation settings

pub mod channel;
pub mod coordinator;
pub mod error;
pub mod event;
pub mod registry;
pub mod settings;
pub mod state;
pub mod title_task;
pub mod transition;

#[cfg(test)]
mod testing;

pub use channel::{FragmentSink, HttpStreamingChannel, StreamingChannel};
pub use coordinator::StateCoordinator;
pub use error::ClientError;
pub use event::{CoordinatorEvent, Notice, NoticeLevel};
pub use registry::{HttpRegistryClient, SessionRegistryClient};
pub use settings::{FileSettingsStore, MemorySettingsStore, Settings, SettingsPatch, SettingsStore};
pub use state::{CoordinatorState, SendTicket, UiFlags};
