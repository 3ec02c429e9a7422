//! Entry points for commands arriving from Discord or the embedded chat.
//!
//! Interaction path: acknowledge with a deferred ephemeral response, run the
//! handler in the background with ephemeral, push and toast sinks, then patch
//! `@original` with the reply or the error.
//!
//! Chat path: toast an acknowledgment right away, then in the background post
//! a placeholder, run the handler with channel, push and toast sinks, remove
//! the placeholder and post the reply.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use futures_util::FutureExt;
use tracing::{debug, info, instrument, warn};
use widgetbot_bridge_core::bridge::{StoreBridge, WidgetCommand};
use widgetbot_bridge_core::config::{
    BridgeSettings, EPHEMERAL_SINK_INTERVAL, TOAST_SINK_INTERVAL, TOAST_TIMEOUT_MS,
};
use widgetbot_bridge_core::platform::ChatPlatform;
use widgetbot_bridge_core::progress::{
    ChannelMessageSink, EphemeralSink, Phase, ProgressTracker, PushSink, ToastSink,
};
use widgetbot_bridge_core::transport::TransportRegistry;
use widgetbot_bridge_runtime::{panic_message, with_placeholder, TaskDispatcher, TaskTicket};

use crate::commands::{parse_chat_command, CommandInvocation, CommandParseError};
use crate::handlers::CommandRegistry;
use crate::interactions::{
    Interaction, InteractionResponse, INTERACTION_APPLICATION_COMMAND, INTERACTION_PING,
};

/// Throttle windows for the sinks a relay run registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkIntervals {
    /// Placeholder message edits
    pub channel: Duration,
    /// `@original` patches
    pub ephemeral: Duration,
    /// Push emits
    pub push: Duration,
    /// Widget toasts
    pub toast: Duration,
}

impl SinkIntervals {
    /// Intervals with the overrides from `settings` applied.
    #[must_use]
    pub fn from_settings(settings: &BridgeSettings) -> Self {
        Self {
            channel: settings.channel_sink_interval(),
            ephemeral: EPHEMERAL_SINK_INTERVAL,
            push: settings.push_sink_interval(),
            toast: TOAST_SINK_INTERVAL,
        }
    }
}

impl Default for SinkIntervals {
    fn default() -> Self {
        Self::from_settings(&BridgeSettings::default())
    }
}

/// What happened to a chat message offered to the relay.
#[derive(Debug)]
pub enum ChatOutcome {
    /// Not a relay command; deliver it as a normal message
    PassThrough,
    /// A relay command that could not be parsed; the reason was toasted
    Rejected(String),
    /// Handler running in the background
    Dispatched(TaskTicket),
}

/// Routes invocations from both entry paths to their handlers.
#[derive(Clone)]
pub struct Relay {
    platform: Arc<dyn ChatPlatform>,
    handlers: Arc<CommandRegistry>,
    bridge: Arc<StoreBridge>,
    registry: Arc<TransportRegistry>,
    dispatcher: TaskDispatcher,
    intervals: SinkIntervals,
}

impl Relay {
    /// Relay with default sink intervals.
    #[must_use]
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        handlers: CommandRegistry,
        bridge: Arc<StoreBridge>,
        registry: Arc<TransportRegistry>,
        dispatcher: TaskDispatcher,
    ) -> Self {
        Self {
            platform,
            handlers: Arc::new(handlers),
            bridge,
            registry,
            dispatcher,
            intervals: SinkIntervals::default(),
        }
    }

    /// Override the sink throttle windows.
    #[must_use]
    pub const fn with_intervals(mut self, intervals: SinkIntervals) -> Self {
        self.intervals = intervals;
        self
    }

    /// Dispatcher running the background work.
    #[must_use]
    pub const fn dispatcher(&self) -> &TaskDispatcher {
        &self.dispatcher
    }

    /// Answer an interaction immediately; commands continue in the background.
    pub fn handle_interaction(
        &self,
        interaction: Interaction,
    ) -> (InteractionResponse, Option<TaskTicket>) {
        match interaction.kind {
            INTERACTION_PING => (InteractionResponse::Pong, None),
            INTERACTION_APPLICATION_COMMAND => {
                let parsed = CommandInvocation::from_interaction(&interaction);
                let label = parsed
                    .as_ref()
                    .map_or_else(|_| "interaction".to_string(), |i| format!("interaction {}", i.command));
                let relay = self.clone();
                let token = interaction.token;
                let ticket = self
                    .dispatcher
                    .submit(label, async move { relay.run_interaction(parsed, token).await });
                (InteractionResponse::Deferred { ephemeral: true }, Some(ticket))
            }
            other => {
                debug!(kind = other, "Unhandled interaction type");
                (InteractionResponse::Pong, None)
            }
        }
    }

    /// Offer chat text typed into the embedded widget.
    pub fn handle_chat(&self, channel_id: &str, author: &str, text: &str) -> ChatOutcome {
        match parse_chat_command(text, author) {
            Ok(None) => ChatOutcome::PassThrough,
            Err(e) => {
                let reason = e.to_string();
                self.toast(&reason);
                ChatOutcome::Rejected(reason)
            }
            Ok(Some(invocation)) => {
                self.toast(&format!("Running {}...", invocation.command));
                let relay = self.clone();
                let channel_id = channel_id.to_string();
                let ticket = self.dispatcher.submit(
                    format!("chat {}", invocation.command),
                    async move { relay.run_chat(invocation, channel_id).await },
                );
                ChatOutcome::Dispatched(ticket)
            }
        }
    }

    fn toast(&self, text: &str) {
        self.bridge
            .send_command(WidgetCommand::notify_with_timeout(text, TOAST_TIMEOUT_MS));
    }

    fn tracker(&self) -> ProgressTracker {
        ProgressTracker::new()
            .with_sink(Arc::new(PushSink::new(self.registry.clone())), self.intervals.push)
            .with_sink(Arc::new(ToastSink::new(self.bridge.clone())), self.intervals.toast)
    }

    #[instrument(skip_all)]
    async fn run_interaction(
        self,
        parsed: Result<CommandInvocation, CommandParseError>,
        token: String,
    ) {
        let content = match parsed {
            Err(e) => e.to_string(),
            Ok(invocation) => {
                let mut tracker = self.tracker();
                tracker.register(
                    Arc::new(EphemeralSink::new(self.platform.clone(), token.clone())),
                    self.intervals.ephemeral,
                );
                match self.execute(&invocation, Arc::new(tracker)).await {
                    Ok(reply) => reply,
                    Err(e) => format!("Error: {e}"),
                }
            }
        };

        if let Err(e) = self.platform.patch_original(&token, &content).await {
            warn!(error = %e, "Failed to patch interaction response");
        }
    }

    #[instrument(skip_all, fields(channel_id = %channel_id, command = %invocation.command))]
    async fn run_chat(self, invocation: CommandInvocation, channel_id: String) {
        let placeholder = format!("⏳ Working on {}...", invocation.command);
        let relay = &self;
        let invocation = &invocation;
        let channel = channel_id.as_str();

        let result = with_placeholder(
            self.platform.as_ref(),
            channel,
            &placeholder,
            move |message_id| async move {
                let mut tracker = relay.tracker();
                if let Some(message_id) = message_id {
                    tracker.register(
                        Arc::new(ChannelMessageSink::new(
                            relay.platform.clone(),
                            channel,
                            message_id,
                        )),
                        relay.intervals.channel,
                    );
                }
                relay.execute(invocation, Arc::new(tracker)).await
            },
        )
        .await;

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => format!("Error: {e}"),
        };
        if let Err(e) = self.platform.post_message(channel, &reply).await {
            warn!(error = %e, "Failed to post command reply");
        }
    }

    async fn execute(
        &self,
        invocation: &CommandInvocation,
        tracker: Arc<ProgressTracker>,
    ) -> anyhow::Result<String> {
        let handler = self.handlers.get(invocation.command).ok_or_else(|| {
            anyhow!(CommandParseError::UnknownCommand(
                invocation.command.name().to_string()
            ))
        })?;
        info!(command = %invocation.command, author = %invocation.author, task_id = tracker.task_id(), "Running command");

        let outcome = AssertUnwindSafe(handler.handle(invocation, tracker.clone()))
            .catch_unwind()
            .await;
        let result = match outcome {
            Ok(result) => result,
            Err(payload) => Err(anyhow!("Handler panicked: {}", panic_message(payload.as_ref()))),
        };

        if let Err(e) = &result {
            warn!(command = %invocation.command, error = %e, "Command failed");
            tracker
                .update(Phase::Error, None, Some(format!("Error: {e}")))
                .await;
        }
        tracker.close();
        result
    }
}
