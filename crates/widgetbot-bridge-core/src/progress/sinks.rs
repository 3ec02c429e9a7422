use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use super::event::{Phase, ProgressEvent};
use crate::bridge::{StoreBridge, WidgetCommand};
use crate::config::TOAST_TIMEOUT_MS;
use crate::platform::ChatPlatform;
use crate::transport::{Namespace, TransportRegistry, EVENT_GEN_PROGRESS};

/// A consumer that turns a progress update into one external side effect.
///
/// Implementations swallow their own failures and report them as `false`.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Apply the event; `true` if the side effect happened.
    async fn deliver(&self, event: &ProgressEvent) -> bool;
}

/// Edits a placeholder channel message with a text progress bar.
pub struct ChannelMessageSink {
    platform: Arc<dyn ChatPlatform>,
    channel_id: String,
    message_id: String,
}

impl ChannelMessageSink {
    /// Sink editing `message_id` in `channel_id`.
    #[must_use]
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        channel_id: impl Into<String>,
        message_id: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            channel_id: channel_id.into(),
            message_id: message_id.into(),
        }
    }
}

#[async_trait]
impl ProgressSink for ChannelMessageSink {
    fn name(&self) -> &'static str {
        "channel_message"
    }

    async fn deliver(&self, event: &ProgressEvent) -> bool {
        match self
            .platform
            .edit_message(&self.channel_id, &self.message_id, &event.render_bar())
            .await
        {
            Ok(()) => true,
            Err(e) => {
                debug!(channel_id = %self.channel_id, message_id = %self.message_id, error = %e, "Progress edit failed");
                false
            }
        }
    }
}

/// Patches the deferred ephemeral `@original` response.
pub struct EphemeralSink {
    platform: Arc<dyn ChatPlatform>,
    interaction_token: String,
}

impl EphemeralSink {
    /// Sink patching the response identified by `interaction_token`.
    #[must_use]
    pub fn new(platform: Arc<dyn ChatPlatform>, interaction_token: impl Into<String>) -> Self {
        Self {
            platform,
            interaction_token: interaction_token.into(),
        }
    }
}

#[async_trait]
impl ProgressSink for EphemeralSink {
    fn name(&self) -> &'static str {
        "ephemeral"
    }

    async fn deliver(&self, event: &ProgressEvent) -> bool {
        match self
            .platform
            .patch_original(&self.interaction_token, &event.render_bar())
            .await
        {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "Progress patch of @original failed");
                false
            }
        }
    }
}

/// Emits `gen_progress` records on the gen push namespace.
pub struct PushSink {
    registry: Arc<TransportRegistry>,
}

impl PushSink {
    /// Sink emitting through `registry`; a no-op while no channel is installed.
    #[must_use]
    pub const fn new(registry: Arc<TransportRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ProgressSink for PushSink {
    fn name(&self) -> &'static str {
        "push"
    }

    async fn deliver(&self, event: &ProgressEvent) -> bool {
        self.registry
            .emit(Namespace::Gen, EVENT_GEN_PROGRESS, event.to_record())
    }
}

/// Shows a short notification bubble on the widget button at each phase change.
pub struct ToastSink {
    bridge: Arc<StoreBridge>,
    last_phase: Mutex<Option<Phase>>,
}

impl ToastSink {
    /// Sink sending `notify` commands through `bridge`.
    #[must_use]
    pub const fn new(bridge: Arc<StoreBridge>) -> Self {
        Self {
            bridge,
            last_phase: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ProgressSink for ToastSink {
    fn name(&self) -> &'static str {
        "toast"
    }

    async fn deliver(&self, event: &ProgressEvent) -> bool {
        {
            let mut last = self
                .last_phase
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if *last == Some(event.phase()) {
                return false;
            }
            *last = Some(event.phase());
        }

        let text = format!("{}% {}", event.percent(), event.phase().label());
        self.bridge
            .send_command(WidgetCommand::notify_with_timeout(text, TOAST_TIMEOUT_MS));
        true
    }
}
