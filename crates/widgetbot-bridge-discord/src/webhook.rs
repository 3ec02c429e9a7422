//! Outbound messages through the Discord webhook execute API.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use widgetbot_bridge_core::utils::{truncate_str, unique_timestamp};

const WEBHOOK_TIMEOUT_SECS: u64 = 10;

/// A message to post through a webhook
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WebhookMessage {
    /// Message text
    pub content: String,
    /// Override of the webhook's username
    #[serde(default)]
    pub username: Option<String>,
    /// Override of the webhook's avatar
    #[serde(default)]
    pub avatar_url: Option<String>,
    /// Thread to post into
    #[serde(default)]
    pub thread_id: Option<String>,
    /// A single embed object
    #[serde(default)]
    pub embed: Option<Value>,
}

impl WebhookMessage {
    /// Plain text message.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    fn body(&self) -> Value {
        let mut body = Map::new();
        body.insert("content".into(), Value::String(self.content.clone()));
        if let Some(username) = self.username.as_ref().filter(|u| !u.is_empty()) {
            body.insert("username".into(), Value::String(username.clone()));
        }
        if let Some(avatar) = self.avatar_url.as_ref().filter(|a| !a.is_empty()) {
            body.insert("avatar_url".into(), Value::String(avatar.clone()));
        }
        if let Some(embed) = &self.embed {
            body.insert("embeds".into(), Value::Array(vec![embed.clone()]));
        }
        Value::Object(body)
    }
}

/// Outcome of a webhook execution. Never an error: failures are described.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookResult {
    /// Whether Discord accepted the message
    pub success: bool,
    /// HTTP status, `0` when no request was made or it failed in transit
    pub status_code: u16,
    /// Id of the created message
    pub message_id: Option<String>,
    /// Failure description
    pub error: Option<String>,
    /// Completion time
    #[serde(rename = "_ts")]
    pub ts: f64,
}

impl WebhookResult {
    fn failure(status_code: u16, error: impl Into<String>) -> Self {
        Self {
            success: false,
            status_code,
            message_id: None,
            error: Some(error.into()),
            ts: unique_timestamp(),
        }
    }
}

#[derive(Deserialize)]
struct ExecutedMessage {
    id: Option<String>,
}

/// Execute `webhook_url` with `message`, waiting for the created message.
pub async fn send_webhook_message(
    client: &Client,
    webhook_url: Option<&str>,
    message: &WebhookMessage,
) -> WebhookResult {
    let Some(url) = webhook_url.filter(|u| !u.is_empty()) else {
        return WebhookResult::failure(0, "No webhook URL provided");
    };

    let mut query = vec![("wait", "true")];
    if let Some(thread_id) = message.thread_id.as_deref().filter(|t| !t.is_empty()) {
        query.push(("thread_id", thread_id));
    }

    let response = match client
        .post(url)
        .query(&query)
        .json(&message.body())
        .timeout(Duration::from_secs(WEBHOOK_TIMEOUT_SECS))
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            // The URL embeds the webhook token
            let error = e.without_url().to_string();
            warn!(error = %error, "Webhook request failed");
            return WebhookResult::failure(0, error);
        }
    };

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return WebhookResult::failure(status.as_u16(), truncate_str(body, 500));
    }

    let message_id = response
        .json::<ExecutedMessage>()
        .await
        .ok()
        .and_then(|m| m.id);
    debug!(status = status.as_u16(), message_id = ?message_id, "Webhook message sent");
    WebhookResult {
        success: true,
        status_code: status.as_u16(),
        message_id,
        error: None,
        ts: unique_timestamp(),
    }
}
