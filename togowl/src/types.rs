//! Core types used throughout the relay.
//!
//! This module defines the observed timer status, the raw mutation records
//! forwarded by the content script, the task-list view of a task, and the
//! crate-wide error type.

use serde::{Deserialize, Serialize};

/// Label the timer toggle carries while the timer is stopped
pub const START_TIME_ENTRY: &str = "Start time entry";

/// Label the timer toggle carries while the timer is counting
pub const STOP_TIME_ENTRY: &str = "Stop time entry";

/// Coarse status of the observed timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservedStatus {
    Running,
    Stopped,
}

impl ObservedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObservedStatus::Running => "running",
            ObservedStatus::Stopped => "stopped",
        }
    }

    /// Status implied by the previous label of the timer toggle.
    ///
    /// The previous label names the action that was just taken, so a toggle
    /// that used to read "Start time entry" has just started counting.
    pub fn from_previous_label(label: Option<&str>) -> Option<Self> {
        match label? {
            START_TIME_ENTRY => Some(ObservedStatus::Running),
            STOP_TIME_ENTRY => Some(ObservedStatus::Stopped),
            _ => None,
        }
    }
}

/// Action controls the overlay adds next to the timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    Start,
    Pause,
    Interrupt,
    Done,
    Delete,
    TaskPicker,
}

impl ControlKind {
    /// Every overlay control, in layout order
    pub const ALL: [ControlKind; 6] = [
        ControlKind::Start,
        ControlKind::Pause,
        ControlKind::Interrupt,
        ControlKind::Done,
        ControlKind::Delete,
        ControlKind::TaskPicker,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ControlKind::Start => "start",
            ControlKind::Pause => "pause",
            ControlKind::Interrupt => "interrupt",
            ControlKind::Done => "done",
            ControlKind::Delete => "delete",
            ControlKind::TaskPicker => "task_picker",
        }
    }

    /// Whether the control is shown while the timer has the given status
    pub fn visible_when(&self, status: ObservedStatus) -> bool {
        let shown_while_stopped = matches!(self, ControlKind::Start | ControlKind::TaskPicker);
        match status {
            ObservedStatus::Running => !shown_while_stopped,
            ObservedStatus::Stopped => shown_while_stopped,
        }
    }
}

/// Element a mutation record was observed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationTarget {
    /// The broad page container (structural changes only)
    Container,
    /// The native start/stop button of the timer
    TimerToggle,
    /// The entry title input
    TitleInput,
}

/// Kind of a raw mutation record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Attributes,
    ChildList,
}

/// A raw mutation record as delivered by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationRecord {
    pub kind: MutationKind,
    #[serde(default)]
    pub attribute_name: Option<String>,
    #[serde(default)]
    pub old_value: Option<String>,
}

impl MutationRecord {
    pub fn attribute(name: &str, old_value: Option<&str>) -> Self {
        Self {
            kind: MutationKind::Attributes,
            attribute_name: Some(name.to_string()),
            old_value: old_value.map(str::to_string),
        }
    }

    pub fn child_list() -> Self {
        Self {
            kind: MutationKind::ChildList,
            attribute_name: None,
            old_value: None,
        }
    }
}

/// State of the observed page as last reported by the content script
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceSnapshot {
    /// Whether the timer container exists in the page
    #[serde(default)]
    pub container_ready: bool,
    /// Whether the current entry is counting
    #[serde(default)]
    pub counting: bool,
    /// Text of the entry title
    #[serde(default)]
    pub title: String,
    /// Whether the title input carries a `value` attribute
    #[serde(default)]
    pub title_value_present: bool,
    #[serde(default)]
    pub client: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    /// Seconds elapsed in the current entry
    #[serde(default)]
    pub entry_seconds: u64,
}

/// A task as seen through the task-list service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub project_id: Option<i64>,
    pub project_name: Option<String>,
    pub checked: bool,
}

/// Association between the running timer entry and a remote task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentTaskLink {
    pub task_id: i64,
    pub task_title: String,
}

/// Errors raised by collaborators of the relay
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Missing configuration: {0}")]
    MissingConfig(&'static str),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned {status}: {body}")]
    Service {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RelayError {
    /// Whether repeating the same call could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            RelayError::MissingConfig(_) | RelayError::Json(_) => false,
            RelayError::Service { status, .. } => *status >= 500 || *status == 429,
            RelayError::Http(e) => !e.is_builder(),
            _ => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
