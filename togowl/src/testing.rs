//! In-memory collaborators shared by the unit tests.

use crate::clients::{Messenger, TaskService, TimerService};
use crate::native::SurfaceCommand;
use crate::storage::{MemoryStore, SettingKey, SettingsStore};
use crate::surface::NativeSurface;
use crate::types::{RelayError, Result, SurfaceSnapshot, Task};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const WEBHOOK_URL: &str = "https://hooks.slack.test/T000/B000";

/// Messenger that records deliveries and flags overlapping sends
#[derive(Default)]
pub struct RecordingMessenger {
    pub sent: Mutex<Vec<String>>,
    pub attempts: Mutex<HashMap<String, u32>>,
    in_flight: AtomicUsize,
    pub overlapped: AtomicBool,
    delay: Duration,
    fail_containing: Option<String>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail every send whose text contains `needle`
    pub fn failing_on(mut self, needle: &str) -> Self {
        self.fail_containing = Some(needle.to_string());
        self
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts_for(&self, text: &str) -> u32 {
        self.attempts.lock().unwrap().get(text).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send(&self, webhook_url: &str, text: &str) -> Result<()> {
        assert_eq!(webhook_url, WEBHOOK_URL);
        if self.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        *self
            .attempts
            .lock()
            .unwrap()
            .entry(text.to_string())
            .or_default() += 1;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let result = match &self.fail_containing {
            Some(needle) if text.contains(needle.as_str()) => Err(RelayError::Service {
                service: "slack",
                status: 500,
                body: "internal_error".to_string(),
            }),
            _ => {
                self.sent.lock().unwrap().push(text.to_string());
                Ok(())
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Settings store whose issue-tracker lookups take `delay`
pub struct SlowStore {
    inner: MemoryStore,
    delay: Duration,
}

impl SlowStore {
    pub fn new(inner: MemoryStore, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl SettingsStore for SlowStore {
    async fn get(&self, key: SettingKey) -> Result<Option<Value>> {
        if key == SettingKey::JiraBrowserUrl && !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: SettingKey, value: Option<Value>) -> Result<()> {
        self.inner.set(key, value).await
    }
}

/// Task service returning a fixed list and recording closed ids
#[derive(Default)]
pub struct FakeTasks {
    pub tasks: Vec<Task>,
    pub closed: Mutex<Vec<i64>>,
    pub fail_fetch: bool,
}

#[async_trait]
impl TaskService for FakeTasks {
    async fn fetch_daily_tasks(&self, _token: &str) -> Result<Vec<Task>> {
        if self.fail_fetch {
            return Err(RelayError::Service {
                service: "todoist",
                status: 503,
                body: String::new(),
            });
        }
        Ok(self.tasks.clone())
    }

    async fn close_task(&self, _token: &str, task_id: i64) -> Result<()> {
        self.closed.lock().unwrap().push(task_id);
        Ok(())
    }
}

/// Timer service with a fixed project table, recording started entries
#[derive(Default)]
pub struct FakeTimers {
    pub projects: HashMap<String, i64>,
    pub started: Mutex<Vec<(String, Option<i64>)>>,
}

#[async_trait]
impl TimerService for FakeTimers {
    async fn find_project_id(
        &self,
        _token: &str,
        _workspace_id: i64,
        project_name: &str,
    ) -> Result<Option<i64>> {
        Ok(self.projects.get(project_name).copied())
    }

    async fn start_timer(&self, _token: &str, title: &str, project_id: Option<i64>) -> Result<()> {
        self.started
            .lock()
            .unwrap()
            .push((title.to_string(), project_id));
        Ok(())
    }
}

/// A ready surface showing a counting entry
pub fn running_surface() -> (Arc<NativeSurface>, mpsc::UnboundedReceiver<SurfaceCommand>) {
    let (surface, rx) = NativeSurface::new();
    surface.update(SurfaceSnapshot {
        container_ready: true,
        counting: true,
        title: "PROJ-12 Write report".to_string(),
        title_value_present: true,
        client: Some("Acme".to_string()),
        project: Some("Website".to_string()),
        entry_seconds: 5,
    });
    (Arc::new(surface), rx)
}

pub fn drain_commands(rx: &mut mpsc::UnboundedReceiver<SurfaceCommand>) -> Vec<SurfaceCommand> {
    let mut commands = Vec::new();
    while let Ok(command) = rx.try_recv() {
        commands.push(command);
    }
    commands
}
