//! Slack webhook delivery.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::notify::{Alert, NotifyError, Notifier};

/// Posts alerts as Block Kit messages to an incoming webhook.
pub struct SlackNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl SlackNotifier {
    pub fn new(webhook_url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Request(e.to_string()))?;

        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
        })
    }
}

/// Block Kit payload for `alert`.
pub fn slack_payload(alert: &Alert) -> Value {
    let fields: Vec<Value> = alert
        .fields
        .iter()
        .map(|f| json!({ "type": "mrkdwn", "text": format!("*{}*\n{}", f.label, f.value) }))
        .collect();

    json!({
        "text": format!("{}: {}", alert.header, alert.context),
        "blocks": [
            { "type": "header", "text": { "type": "plain_text", "text": alert.header } },
            { "type": "section", "text": { "type": "mrkdwn", "text": alert.context } },
            { "type": "section", "fields": fields },
        ]
    })
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&slack_payload(alert))
            .send()
            .await
            .map_err(|e| NotifyError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }
        Ok(())
    }
}
