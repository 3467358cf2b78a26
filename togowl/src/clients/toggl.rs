//! Toggl client (API v8, basic auth with the API token).

use super::{check_status, http_client, TimerService};
use crate::config::ServicesConfig;
use crate::types::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

const CREATED_WITH: &str = "togowl";

#[derive(Debug, Deserialize)]
struct Project {
    id: i64,
    name: String,
}

#[derive(Debug, Serialize)]
struct StartRequest<'a> {
    time_entry: StartEntry<'a>,
}

#[derive(Debug, Serialize)]
struct StartEntry<'a> {
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pid: Option<i64>,
    created_with: &'static str,
}

/// Toggl API client
pub struct TogglClient {
    client: reqwest::Client,
    api_url: String,
}

impl TogglClient {
    pub fn new(services: &ServicesConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(services.request_timeout())?,
            api_url: services.toggl_api_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl TimerService for TogglClient {
    async fn find_project_id(
        &self,
        token: &str,
        workspace_id: i64,
        project_name: &str,
    ) -> Result<Option<i64>> {
        let response = self
            .client
            .get(format!("{}/workspaces/{}/projects", self.api_url, workspace_id))
            .basic_auth(token, Some("api_token"))
            .send()
            .await?;
        // Toggl answers `null` for a workspace without projects
        let projects: Option<Vec<Project>> = check_status("toggl", response).await?.json().await?;

        Ok(match_project(projects.unwrap_or_default(), project_name))
    }

    async fn start_timer(&self, token: &str, title: &str, project_id: Option<i64>) -> Result<()> {
        let request = StartRequest {
            time_entry: StartEntry {
                description: title,
                pid: project_id,
                created_with: CREATED_WITH,
            },
        };
        let response = self
            .client
            .post(format!("{}/time_entries/start", self.api_url))
            .basic_auth(token, Some("api_token"))
            .json(&request)
            .send()
            .await?;
        check_status("toggl", response).await?;
        debug!("Started toggl entry '{}' (project {:?})", title, project_id);
        Ok(())
    }
}

fn match_project(projects: Vec<Project>, name: &str) -> Option<i64> {
    projects.into_iter().find(|p| p.name == name).map(|p| p.id)
}
