//! Clients for the remote services the relay talks to.
//!
//! - Slack: incoming webhook receiving the notifications
//! - Todoist: task list offered in the task picker
//! - Toggl: timer service the overlay starts entries on

pub mod slack;
pub mod todoist;
pub mod toggl;

use crate::types::{RelayError, Result, Task};
use async_trait::async_trait;
use std::time::Duration;

pub use slack::SlackWebhook;
pub use todoist::TodoistClient;
pub use toggl::TogglClient;

/// Endpoint that receives notification text
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, webhook_url: &str, text: &str) -> Result<()>;
}

/// Remote task list
#[async_trait]
pub trait TaskService: Send + Sync {
    /// Today's unchecked tasks, in the service's day order
    async fn fetch_daily_tasks(&self, token: &str) -> Result<Vec<Task>>;

    async fn close_task(&self, token: &str, task_id: i64) -> Result<()>;
}

/// Remote timer service
#[async_trait]
pub trait TimerService: Send + Sync {
    async fn find_project_id(
        &self,
        token: &str,
        workspace_id: i64,
        project_name: &str,
    ) -> Result<Option<i64>>;

    async fn start_timer(&self, token: &str, title: &str, project_id: Option<i64>) -> Result<()>;
}

/// Build the HTTP client shared by a service client
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("togowl/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Turn a non-2xx response into a service error
pub(crate) async fn check_status(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(RelayError::Service {
        service,
        status: status.as_u16(),
        body,
    })
}
