//! Chat platform collaborator.
//!
//! The relay only needs four operations from the chat platform: post, edit
//! and delete a channel message by id, and patch the deferred `@original`
//! response of an interaction by token.

use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by a chat platform implementation
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Credentials or ids required for the call are missing
    #[error("Platform not configured: {0}")]
    NotConfigured(String),
    /// The target message or interaction no longer exists
    #[error("Not found: {0}")]
    NotFound(String),
    /// The platform rejected the request
    #[error("API error {status}: {body}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Truncated response body
        body: String,
    },
    /// Transport-level failure
    #[error("Network error: {0}")]
    Network(String),
    /// The connection was never established, so the request was not sent
    #[error("Platform unreachable: {0}")]
    Unreachable(String),
}

/// Operations the relay performs against the chat platform
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Post a message to a channel, returning the new message id.
    async fn post_message(&self, channel_id: &str, content: &str) -> Result<String, PlatformError>;

    /// Replace the content of an existing channel message.
    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<(), PlatformError>;

    /// Delete a channel message.
    async fn delete_message(&self, channel_id: &str, message_id: &str)
        -> Result<(), PlatformError>;

    /// Patch the deferred `@original` response of an interaction.
    async fn patch_original(
        &self,
        interaction_token: &str,
        content: &str,
    ) -> Result<(), PlatformError>;
}
