//! Slack incoming-webhook notifications.

use async_trait::async_trait;
use gantry_core::Job;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::check_response;
use crate::{Notifier, NotifyError, Outcome};

pub struct SlackNotifier {
    client: reqwest::Client,
    webhook_url: String,
    channel: Option<String>,
}

impl SlackNotifier {
    pub fn new(client: reqwest::Client, webhook_url: String, channel: Option<String>) -> Self {
        Self {
            client,
            webhook_url,
            channel,
        }
    }
}

pub(crate) fn slack_payload(channel: Option<&str>, outcome: &Outcome) -> Value {
    let color = if outcome.passed { "good" } else { "danger" };
    let mut payload = json!({
        "attachments": [{
            "fallback": outcome.message,
            "color": color,
            "text": outcome.message,
        }]
    });
    if let Some(channel) = channel {
        payload["channel"] = json!(channel);
    }
    payload
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn name(&self) -> String {
        match &self.channel {
            Some(channel) => format!("slack:{}", channel),
            None => "slack".to_string(),
        }
    }

    async fn notify(&self, job: &Job, outcome: &Outcome) -> Result<(), NotifyError> {
        debug!(job_id = %job.id, "Posting Slack message");

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&slack_payload(self.channel.as_deref(), outcome))
            .send()
            .await?;
        check_response(response).await
    }
}
