//! Command handlers shared by the interaction and chat paths.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};
use widgetbot_bridge_core::actions::Action;
use widgetbot_bridge_core::bridge::StoreBridge;
use widgetbot_bridge_core::gen::{GenEntry, GenStore};
use widgetbot_bridge_core::llm::responder::{
    generate_gen_response, generate_text_response, TextReply,
};
use widgetbot_bridge_core::llm::{GenerationProvider, StreamObserver};
use widgetbot_bridge_core::progress::{Phase, ProgressTracker};
use widgetbot_bridge_core::transport::{TransportMode, TransportRegistry};

use crate::commands::{CommandInvocation, SlashCommand};

/// Runs one or more slash commands.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Commands routed to this handler.
    fn commands(&self) -> &'static [SlashCommand];

    /// Produce the reply text, reporting progress through `tracker`.
    async fn handle(
        &self,
        invocation: &CommandInvocation,
        tracker: Arc<ProgressTracker>,
    ) -> Result<String>;
}

/// Collaborators the built-in handlers need.
#[derive(Clone)]
pub struct HandlerDeps {
    /// Generation backend
    pub provider: Arc<dyn GenerationProvider>,
    /// Command bridge of the default widget instance
    pub bridge: Arc<StoreBridge>,
    /// Gen feed
    pub gen_store: Arc<GenStore>,
    /// Push registry, reported by `/status`
    pub registry: Arc<TransportRegistry>,
    /// Embedded widget server id
    pub server: String,
    /// Embedded widget channel id
    pub channel: String,
}

fn dispatch_actions(bridge: &StoreBridge, actions: &[Action]) {
    for action in actions {
        bridge.send_command(action.to_command());
    }
}

/// `/ai` and `/ask`: plain AI reply whose action tags become widget commands.
pub struct AskHandler {
    provider: Arc<dyn GenerationProvider>,
    bridge: Arc<StoreBridge>,
}

impl AskHandler {
    /// Handler using `deps`.
    #[must_use]
    pub fn new(deps: &HandlerDeps) -> Self {
        Self {
            provider: deps.provider.clone(),
            bridge: deps.bridge.clone(),
        }
    }
}

#[async_trait]
impl CommandHandler for AskHandler {
    fn commands(&self) -> &'static [SlashCommand] {
        &[SlashCommand::Ai, SlashCommand::Ask]
    }

    async fn handle(
        &self,
        invocation: &CommandInvocation,
        tracker: Arc<ProgressTracker>,
    ) -> Result<String> {
        tracker.update(Phase::Analyzing, None, None).await;
        let observer: Arc<dyn StreamObserver> = tracker.clone();
        let reply =
            generate_text_response(self.provider.as_ref(), invocation.option_text(), Some(observer))
                .await?;

        tracker.update(Phase::Parsing, None, None).await;
        dispatch_actions(&self.bridge, &reply.actions);

        tracker.update(Phase::Posting, None, None).await;
        tracker.update(Phase::Complete, None, None).await;

        if reply.text.is_empty() {
            return Ok("(no response)".to_string());
        }
        Ok(reply.text)
    }
}

/// `/gen`: structured card, optional image, appended to the gen feed.
pub struct GenHandler {
    provider: Arc<dyn GenerationProvider>,
    gen_store: Arc<GenStore>,
}

impl GenHandler {
    /// Handler using `deps`.
    #[must_use]
    pub fn new(deps: &HandlerDeps) -> Self {
        Self {
            provider: deps.provider.clone(),
            gen_store: deps.gen_store.clone(),
        }
    }
}

#[async_trait]
impl CommandHandler for GenHandler {
    fn commands(&self) -> &'static [SlashCommand] {
        &[SlashCommand::Gen]
    }

    async fn handle(
        &self,
        invocation: &CommandInvocation,
        tracker: Arc<ProgressTracker>,
    ) -> Result<String> {
        let prompt = invocation.option_text();
        tracker.update(Phase::Analyzing, None, None).await;

        let observer: Arc<dyn StreamObserver> = tracker.clone();
        let response = match generate_gen_response(self.provider.as_ref(), prompt, Some(observer))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.gen_store.add(GenEntry::failed(
                    prompt,
                    format!("Error: {e}"),
                    &invocation.author,
                ));
                return Err(e.into());
            }
        };
        tracker.update(Phase::Parsing, None, None).await;

        let mut entry = GenEntry::new(prompt, response.clone(), &invocation.author);
        if let Some(image_prompt) = response.image_prompt() {
            tracker.update(Phase::CreatingImage, None, None).await;
            match self.provider.generate_image(image_prompt).await {
                Ok(image) => entry = entry.with_image(image),
                Err(e) => warn!(error = %e, "Image generation failed, storing card without image"),
            }
        }

        tracker.update(Phase::Posting, None, None).await;
        let stored = self.gen_store.add(entry);
        info!(id = %stored.id, format = response.content.format(), "Gen entry stored");
        tracker.update(Phase::Complete, None, None).await;

        Ok(response.chat_summary())
    }
}

/// `/navigate`: ask the host page to route to a path.
pub struct NavigateHandler {
    bridge: Arc<StoreBridge>,
}

impl NavigateHandler {
    /// Handler using `deps`.
    #[must_use]
    pub fn new(deps: &HandlerDeps) -> Self {
        Self {
            bridge: deps.bridge.clone(),
        }
    }
}

#[async_trait]
impl CommandHandler for NavigateHandler {
    fn commands(&self) -> &'static [SlashCommand] {
        &[SlashCommand::Navigate]
    }

    async fn handle(
        &self,
        invocation: &CommandInvocation,
        _tracker: Arc<ProgressTracker>,
    ) -> Result<String> {
        let path = invocation.option.as_deref().unwrap_or("/");
        let reply = TextReply::from_raw(format!("Navigating to {path} [ACTION:navigate:{path}]"));
        dispatch_actions(&self.bridge, &reply.actions);
        Ok(reply.text)
    }
}

/// `/status`: what the bridge is connected to.
pub struct StatusHandler {
    registry: Arc<TransportRegistry>,
    gen_store: Arc<GenStore>,
    server: String,
    channel: String,
}

impl StatusHandler {
    /// Handler using `deps`.
    #[must_use]
    pub fn new(deps: &HandlerDeps) -> Self {
        Self {
            registry: deps.registry.clone(),
            gen_store: deps.gen_store.clone(),
            server: deps.server.clone(),
            channel: deps.channel.clone(),
        }
    }
}

#[async_trait]
impl CommandHandler for StatusHandler {
    fn commands(&self) -> &'static [SlashCommand] {
        &[SlashCommand::Status]
    }

    async fn handle(
        &self,
        _invocation: &CommandInvocation,
        _tracker: Arc<ProgressTracker>,
    ) -> Result<String> {
        let transport = match self.registry.mode() {
            TransportMode::Push => "push + store",
            TransportMode::Store => "store only",
        };
        Ok(format!(
            "**widgetbot-bridge** v{}\nServer: `{}`\nChannel: `{}`\nTransport: {transport}\nGen entries: {}",
            env!("CARGO_PKG_VERSION"),
            self.server,
            self.channel,
            self.gen_store.count(),
        ))
    }
}

/// Handler lookup by command.
#[derive(Default, Clone)]
pub struct CommandRegistry {
    handlers: HashMap<SlashCommand, Arc<dyn CommandHandler>>,
}

impl CommandRegistry {
    /// Registry without handlers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in handler.
    #[must_use]
    pub fn with_defaults(deps: &HandlerDeps) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(AskHandler::new(deps)));
        registry.register(Arc::new(GenHandler::new(deps)));
        registry.register(Arc::new(NavigateHandler::new(deps)));
        registry.register(Arc::new(StatusHandler::new(deps)));
        registry
    }

    /// Route every command `handler` declares to it, replacing earlier ones.
    pub fn register(&mut self, handler: Arc<dyn CommandHandler>) {
        for command in handler.commands() {
            self.handlers.insert(*command, handler.clone());
        }
    }

    /// Handler for `command`.
    #[must_use]
    pub fn get(&self, command: SlashCommand) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(&command).cloned()
    }
}
