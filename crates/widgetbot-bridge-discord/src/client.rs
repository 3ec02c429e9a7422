//! Discord REST client used by the relay.
//!
//! Deletes are retried with backoff. Posts are retried only when the
//! connection could not be opened. Progress edits and `@original` patches
//! are cosmetic: one attempt, short timeout.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use widgetbot_bridge_core::config::{
    BridgeSettings, DISCORD_API_BASE, DISCORD_API_TIMEOUT_SECS, DISCORD_MESSAGE_LIMIT,
    DISCORD_PROGRESS_TIMEOUT_SECS,
};
use widgetbot_bridge_core::platform::{ChatPlatform, PlatformError};
use widgetbot_bridge_core::utils::{
    retry_transport_operation, retry_transport_operation_if, truncate_str,
};

#[derive(Deserialize)]
struct CreatedMessage {
    id: String,
}

/// Discord REST v10 client authenticated with a bot token.
#[derive(Clone)]
pub struct DiscordClient {
    http: Client,
    bot_token: Option<String>,
    application_id: Option<String>,
    base_url: String,
}

impl DiscordClient {
    /// Client configured from `settings`.
    #[must_use]
    pub fn new(settings: &BridgeSettings) -> Self {
        Self {
            http: Client::new(),
            bot_token: settings.discord_bot_token.clone().filter(|t| !t.is_empty()),
            application_id: settings
                .discord_application_id
                .clone()
                .filter(|id| !id.is_empty()),
            base_url: DISCORD_API_BASE.to_string(),
        }
    }

    /// Point the client at another API root (tests, proxies).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn bot_request(&self, method: Method, path: &str) -> Result<RequestBuilder, PlatformError> {
        let token = self
            .bot_token
            .as_deref()
            .ok_or_else(|| PlatformError::NotConfigured("DISCORD_BOT_TOKEN".to_string()))?;
        Ok(self
            .http
            .request(method, format!("{}{path}", self.base_url))
            .header("Authorization", format!("Bot {token}")))
    }

    fn original_url(&self, interaction_token: &str) -> Result<String, PlatformError> {
        let app_id = self
            .application_id
            .as_deref()
            .ok_or_else(|| PlatformError::NotConfigured("DISCORD_APPLICATION_ID".to_string()))?;
        Ok(format!(
            "{}/webhooks/{app_id}/{interaction_token}/messages/@original",
            self.base_url
        ))
    }
}

async fn send(request: RequestBuilder, timeout_secs: u64) -> Result<reqwest::Response, PlatformError> {
    let response = request
        .timeout(Duration::from_secs(timeout_secs))
        .send()
        .await
        .map_err(|e| {
            if e.is_connect() {
                PlatformError::Unreachable(e.without_url().to_string())
            } else {
                PlatformError::Network(e.without_url().to_string())
            }
        })?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::NOT_FOUND {
        return Err(PlatformError::NotFound(truncate_str(&body, 200)));
    }
    Err(PlatformError::Api {
        status: status.as_u16(),
        body: truncate_str(&body, 200),
    })
}

fn into_platform_error(e: anyhow::Error) -> PlatformError {
    e.downcast::<PlatformError>()
        .unwrap_or_else(|e| PlatformError::Network(e.to_string()))
}

async fn with_retry<F, Fut, T>(operation: F) -> Result<T, PlatformError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    retry_transport_operation(operation)
        .await
        .map_err(into_platform_error)
}

async fn with_connect_retry<F, Fut, T>(operation: F) -> Result<T, PlatformError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    retry_transport_operation_if(operation, |e: &anyhow::Error| {
        matches!(
            e.downcast_ref::<PlatformError>(),
            Some(PlatformError::Unreachable(_))
        )
    })
    .await
    .map_err(into_platform_error)
}

fn message_body(content: &str) -> serde_json::Value {
    json!({ "content": truncate_str(content, DISCORD_MESSAGE_LIMIT) })
}

#[async_trait]
impl ChatPlatform for DiscordClient {
    async fn post_message(&self, channel_id: &str, content: &str) -> Result<String, PlatformError> {
        let path = format!("/channels/{channel_id}/messages");
        let body = message_body(content);
        with_connect_retry(|| async {
            let request = self.bot_request(Method::POST, &path)?.json(&body);
            let created: CreatedMessage = send(request, DISCORD_API_TIMEOUT_SECS)
                .await?
                .json()
                .await
                .map_err(|e| PlatformError::Network(e.without_url().to_string()))?;
            debug!(channel_id, message_id = %created.id, "Message posted");
            Ok(created.id)
        })
        .await
    }

    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<(), PlatformError> {
        let request = self
            .bot_request(
                Method::PATCH,
                &format!("/channels/{channel_id}/messages/{message_id}"),
            )?
            .json(&message_body(content));
        send(request, DISCORD_PROGRESS_TIMEOUT_SECS).await.map(|_| ())
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), PlatformError> {
        let path = format!("/channels/{channel_id}/messages/{message_id}");
        with_retry(|| async {
            let request = self.bot_request(Method::DELETE, &path)?;
            match send(request, DISCORD_API_TIMEOUT_SECS).await {
                // Already gone counts as deleted
                Ok(_) | Err(PlatformError::NotFound(_)) => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn patch_original(
        &self,
        interaction_token: &str,
        content: &str,
    ) -> Result<(), PlatformError> {
        let request = self
            .http
            .patch(self.original_url(interaction_token)?)
            .json(&message_body(content));
        send(request, DISCORD_PROGRESS_TIMEOUT_SECS).await.map(|_| ())
    }
}
