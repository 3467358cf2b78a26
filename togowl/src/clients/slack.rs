//! Slack incoming webhook client.

use super::{check_status, http_client, Messenger};
use crate::types::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::trace;

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
}

/// Posts notification text to a Slack incoming webhook
pub struct SlackWebhook {
    client: reqwest::Client,
}

impl SlackWebhook {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
        })
    }
}

#[async_trait]
impl Messenger for SlackWebhook {
    async fn send(&self, webhook_url: &str, text: &str) -> Result<()> {
        let response = self
            .client
            .post(webhook_url)
            .json(&WebhookPayload { text })
            .send()
            .await?;
        check_status("slack", response).await?;
        trace!("Posted {} chars to slack", text.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        let json = serde_json::to_string(&WebhookPayload { text: "hi `there`" }).unwrap();
        assert_eq!(json, r#"{"text":"hi `there`"}"#);
    }
}
