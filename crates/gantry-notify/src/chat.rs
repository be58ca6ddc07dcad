//! Chat room notifications (HipChat-style message API).

use async_trait::async_trait;
use gantry_config::ChatConfig;
use gantry_core::Job;
use tracing::debug;

use crate::error::check_response;
use crate::{Notifier, NotifyError, Outcome};

/// Posts a colored message to a chat room.
pub struct ChatNotifier {
    client: reqwest::Client,
    config: ChatConfig,
    room: String,
}

impl ChatNotifier {
    pub fn new(client: reqwest::Client, config: ChatConfig, room: impl Into<String>) -> Self {
        Self {
            client,
            config,
            room: room.into(),
        }
    }

    fn endpoint(&self) -> String {
        let separator = if self.config.endpoint.contains('?') {
            '&'
        } else {
            '?'
        };
        format!(
            "{}{}auth_token={}",
            self.config.endpoint,
            separator,
            urlencoding::encode(&self.config.api_key)
        )
    }
}

/// Form fields for a chat message.
pub(crate) fn chat_form(room: &str, from: &str, outcome: &Outcome) -> Vec<(&'static str, String)> {
    let color = if outcome.passed { "green" } else { "red" };
    vec![
        ("room_id", room.to_string()),
        ("from", from.to_string()),
        ("message", outcome.message.clone()),
        ("message_format", "text".to_string()),
        ("notify", "1".to_string()),
        ("color", color.to_string()),
    ]
}

#[async_trait]
impl Notifier for ChatNotifier {
    fn name(&self) -> String {
        format!("chat:{}", self.room)
    }

    async fn notify(&self, job: &Job, outcome: &Outcome) -> Result<(), NotifyError> {
        debug!(job_id = %job.id, room = %self.room, "Posting chat message");

        let response = self
            .client
            .post(self.endpoint())
            .form(&chat_form(&self.room, &self.config.from, outcome))
            .send()
            .await?;
        check_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::tests::finished_job;

    fn field<'a>(form: &'a [(&'static str, String)], name: &str) -> &'a str {
        form.iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
            .unwrap()
    }

    #[test]
    fn test_form_colors() {
        let ok = Outcome::for_job(&finished_job(true), "http://ci");
        let form = chat_form("builds", "Gantry", &ok);
        assert_eq!(field(&form, "room_id"), "builds");
        assert_eq!(field(&form, "from"), "Gantry");
        assert_eq!(field(&form, "color"), "green");
        assert_eq!(field(&form, "message_format"), "text");
        assert_eq!(field(&form, "message"), ok.message);

        let bad = Outcome::for_job(&finished_job(false), "http://ci");
        assert_eq!(field(&chat_form("builds", "Gantry", &bad), "color"), "red");
    }

    #[test]
    fn test_endpoint_carries_encoded_token() {
        let notifier = ChatNotifier::new(
            reqwest::Client::new(),
            ChatConfig {
                endpoint: "https://chat.example.com/v1/rooms/message".to_string(),
                api_key: "a b&c".to_string(),
                from: "Gantry".to_string(),
            },
            "builds",
        );
        assert_eq!(
            notifier.endpoint(),
            "https://chat.example.com/v1/rooms/message?auth_token=a%20b%26c"
        );
        assert_eq!(notifier.name(), "chat:builds");
    }
}
