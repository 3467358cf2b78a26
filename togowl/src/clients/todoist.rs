//! Todoist client.
//!
//! Tasks are read through the Sync API (one request returns items and
//! projects together) and closed through the REST API.

use super::{check_status, http_client, TaskService};
use crate::config::ServicesConfig;
use crate::types::{Result, Task};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct SyncRoot {
    #[serde(default)]
    items: Vec<SyncItem>,
    #[serde(default)]
    projects: Vec<SyncProject>,
}

#[derive(Debug, Deserialize)]
struct SyncProject {
    id: i64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct SyncItem {
    id: i64,
    content: String,
    #[serde(default)]
    day_order: i64,
    #[serde(default)]
    project_id: Option<i64>,
    #[serde(default)]
    due: Option<SyncDue>,
    #[serde(default)]
    checked: i64,
}

#[derive(Debug, Deserialize)]
struct SyncDue {
    date: String,
}

/// Todoist API client
pub struct TodoistClient {
    client: reqwest::Client,
    sync_url: String,
    rest_url: String,
}

impl TodoistClient {
    pub fn new(services: &ServicesConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(services.request_timeout())?,
            sync_url: services.todoist_sync_url.trim_end_matches('/').to_string(),
            rest_url: services.todoist_rest_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl TaskService for TodoistClient {
    async fn fetch_daily_tasks(&self, token: &str) -> Result<Vec<Task>> {
        let response = self
            .client
            .get(format!("{}/sync", self.sync_url))
            .query(&[
                ("sync_token", "*"),
                ("resource_types", r#"["items","projects"]"#),
            ])
            .bearer_auth(token)
            .send()
            .await?;
        let root: SyncRoot = check_status("todoist", response).await?.json().await?;

        let today = chrono::Local::now().date_naive();
        let tasks = daily_tasks(root, today);
        debug!("Fetched {} task(s) due {}", tasks.len(), today);
        Ok(tasks)
    }

    async fn close_task(&self, token: &str, task_id: i64) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/tasks/{}/close", self.rest_url, task_id))
            .bearer_auth(token)
            .send()
            .await?;
        check_status("todoist", response).await?;
        debug!("Closed todoist task {}", task_id);
        Ok(())
    }
}

/// Tasks due on `today`, in day order, without checked ones
fn daily_tasks(root: SyncRoot, today: NaiveDate) -> Vec<Task> {
    let project_names: HashMap<i64, String> = root
        .projects
        .into_iter()
        .map(|p| (p.id, p.name))
        .collect();
    let today = today.format("%Y-%m-%d").to_string();

    let mut items: Vec<SyncItem> = root
        .items
        .into_iter()
        .filter(|item| item.due.as_ref().map_or(false, |due| due.date == today))
        .collect();
    items.sort_by_key(|item| item.day_order);

    items
        .into_iter()
        .map(|item| Task {
            id: item.id,
            title: item.content,
            project_id: item.project_id,
            project_name: item
                .project_id
                .and_then(|id| project_names.get(&id).cloned()),
            checked: item.checked == 1,
        })
        .filter(|task| !task.checked)
        .collect()
}
