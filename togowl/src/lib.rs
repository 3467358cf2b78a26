//! Togowl - timer overlay relay
//!
//! Watches a web timer page through a content script, adds action controls
//! next to its timer and relays what happens to the timer:
//!
//! - **Bridge**: classifies toggle mutations into RUNNING/STOPPED transitions
//! - **Dispatcher**: delivers notifications to a chat webhook in strict order
//! - **Task picker**: starts timer entries from today's tasks
//!
//! # Architecture
//!
//! The content script forwards DOM mutations and clicks over native
//! messaging. The host loop feeds them to the attachment watcher and the
//! timer bridge. The handlers installed by the relay talk to the dispatcher
//! and the remote services, and answer with commands applied to the page.

pub mod bridge;
pub mod clients;
pub mod config;
pub mod dispatcher;
pub mod format;
pub mod host;
pub mod native;
pub mod relay;
pub mod storage;
pub mod surface;
pub mod types;
pub mod watcher;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use bridge::TimerBridge;
pub use clients::{Messenger, TaskService, TimerService};
pub use config::Config;
pub use dispatcher::{DispatchStats, Dispatcher, EntryLabels, MessageParts};
pub use host::{Host, HostStatus};
pub use native::{HostMessage, SurfaceCommand};
pub use relay::Relay;
pub use storage::{JsonFileStore, MemoryStore, SettingKey, Settings, SettingsStore};
pub use surface::{NativeSurface, Surface};
pub use types::{
    ControlKind, CurrentTaskLink, MutationKind, MutationRecord, MutationTarget, ObservedStatus,
    RelayError, Result, SurfaceSnapshot, Task,
};
pub use watcher::AttachmentWatcher;
