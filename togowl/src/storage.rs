//! Persistent key/value settings.
//!
//! Tokens, identifiers and the current task link live here rather than in
//! `config.toml`, because the relay writes some of them at runtime.

use crate::types::{CurrentTaskLink, RelayError, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Keys understood by the settings store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    SlackWebhookUrl,
    TodoistApiToken,
    TodoistIgnoreProjectIds,
    TogglApiToken,
    TogglWorkspaceId,
    CurrentTodoistTask,
    JiraBrowserUrl,
}

impl SettingKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::SlackWebhookUrl => "slack_incoming_webhook_url",
            SettingKey::TodoistApiToken => "todoist_api_token",
            SettingKey::TodoistIgnoreProjectIds => "todoist_ignore_project_ids",
            SettingKey::TogglApiToken => "toggl_api_token",
            SettingKey::TogglWorkspaceId => "toggl_workspace_id",
            SettingKey::CurrentTodoistTask => "current_todoist_task",
            SettingKey::JiraBrowserUrl => "jira_browser_url",
        }
    }

    /// Human-readable name used in missing-configuration errors
    pub fn description(&self) -> &'static str {
        match self {
            SettingKey::SlackWebhookUrl => "slack incoming webhook url",
            SettingKey::TodoistApiToken => "todoist api token",
            SettingKey::TodoistIgnoreProjectIds => "todoist ignored project ids",
            SettingKey::TogglApiToken => "toggl api token",
            SettingKey::TogglWorkspaceId => "toggl workspace id",
            SettingKey::CurrentTodoistTask => "current todoist task",
            SettingKey::JiraBrowserUrl => "jira browser url",
        }
    }
}

/// Backend holding raw setting values
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, key: SettingKey) -> Result<Option<Value>>;

    /// Store `value`, or remove the key when `value` is `None`
    async fn set(&self, key: SettingKey, value: Option<Value>) -> Result<()>;
}

/// Settings kept in process memory
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<SettingKey, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: SettingKey, value: impl Into<Value>) -> Self {
        if let Ok(values) = self.values.get_mut() {
            values.insert(key, value.into());
        }
        self
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn get(&self, key: SettingKey) -> Result<Option<Value>> {
        let values = self
            .values
            .lock()
            .map_err(|e| RelayError::Storage(e.to_string()))?;
        Ok(values.get(&key).cloned())
    }

    async fn set(&self, key: SettingKey, value: Option<Value>) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|e| RelayError::Storage(e.to_string()))?;
        match value {
            Some(value) => values.insert(key, value),
            None => values.remove(&key),
        };
        Ok(())
    }
}

/// Settings kept in a JSON object file
pub struct JsonFileStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles on the file
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Map<String, Value>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(Map::new()),
            Ok(contents) => match serde_json::from_str::<Value>(&contents)? {
                Value::Object(map) => Ok(map),
                _ => Err(RelayError::Storage(format!(
                    "{:?} does not hold a JSON object",
                    self.path
                ))),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(&self, map: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write then rename so readers never see a partial file
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(map)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for JsonFileStore {
    async fn get(&self, key: SettingKey) -> Result<Option<Value>> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_all().await?;
        Ok(map.remove(key.as_str()))
    }

    async fn set(&self, key: SettingKey, value: Option<Value>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_all().await?;
        match value {
            Some(value) => map.insert(key.as_str().to_string(), value),
            None => map.remove(key.as_str()),
        };
        self.write_all(&map).await?;
        debug!("Stored setting {}", key.as_str());
        Ok(())
    }
}

/// Typed access to the settings the relay uses
#[derive(Clone)]
pub struct Settings {
    store: Arc<dyn SettingsStore>,
}

impl Settings {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }

    async fn string(&self, key: SettingKey) -> Result<Option<String>> {
        Ok(match self.store.get(key).await? {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
    }

    async fn require_string(&self, key: SettingKey) -> Result<String> {
        self.string(key)
            .await?
            .ok_or(RelayError::MissingConfig(key.description()))
    }

    pub async fn slack_webhook_url(&self) -> Result<String> {
        self.require_string(SettingKey::SlackWebhookUrl).await
    }

    pub async fn todoist_api_token(&self) -> Result<String> {
        self.require_string(SettingKey::TodoistApiToken).await
    }

    pub async fn toggl_api_token(&self) -> Result<String> {
        self.require_string(SettingKey::TogglApiToken).await
    }

    pub async fn toggl_workspace_id(&self) -> Result<i64> {
        let raw = self.require_string(SettingKey::TogglWorkspaceId).await?;
        raw.trim()
            .parse()
            .map_err(|_| RelayError::MissingConfig(SettingKey::TogglWorkspaceId.description()))
    }

    /// Project ids whose tasks never show up in the task picker.
    ///
    /// Accepts either a JSON array of numbers or a comma separated string.
    pub async fn todoist_ignore_project_ids(&self) -> Result<Vec<i64>> {
        Ok(match self.store.get(SettingKey::TodoistIgnoreProjectIds).await? {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| match v {
                    Value::Number(n) => n.as_i64(),
                    Value::String(s) => s.trim().parse().ok(),
                    _ => None,
                })
                .collect(),
            Some(Value::String(s)) => s
                .split(',')
                .filter_map(|part| part.trim().parse().ok())
                .collect(),
            _ => Vec::new(),
        })
    }

    pub async fn jira_browser_url(&self) -> Result<Option<String>> {
        self.string(SettingKey::JiraBrowserUrl).await
    }

    pub async fn current_task(&self) -> Result<Option<CurrentTaskLink>> {
        match self.store.get(SettingKey::CurrentTodoistTask).await? {
            Some(value) if !value.is_null() => Ok(Some(serde_json::from_value(value)?)),
            _ => Ok(None),
        }
    }

    pub async fn set_current_task(&self, link: &CurrentTaskLink) -> Result<()> {
        self.store
            .set(SettingKey::CurrentTodoistTask, Some(serde_json::to_value(link)?))
            .await
    }

    pub async fn clear_current_task(&self) -> Result<()> {
        self.store.set(SettingKey::CurrentTodoistTask, None).await
    }
}
