use crate::client::DiscordClient;
use crate::handlers::{CommandRegistry, HandlerDeps};
use crate::http::{router, AppState};
use crate::interactions::InteractionVerifier;
use crate::relay::{Relay, SinkIntervals};
use std::sync::Arc;
use tracing::{info, warn};
use widgetbot_bridge_core::bridge::BridgeHub;
use widgetbot_bridge_core::config::{BridgeSettings, PUSH_CHANNEL_CAPACITY};
use widgetbot_bridge_core::gen::GenStore;
use widgetbot_bridge_core::llm::GeminiProvider;
use widgetbot_bridge_core::transport::{BroadcastPush, TransportRegistry};
use widgetbot_bridge_runtime::TaskDispatcher;

/// Run the HTTP bridge until Ctrl-C, then drain in-flight tasks.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn run_server(settings: Arc<BridgeSettings>) -> anyhow::Result<()> {
    let dispatcher = TaskDispatcher::new();
    let state = build_state(&settings, dispatcher.clone());
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    info!(addr = %settings.bind_addr, "Bridge is listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(in_flight = dispatcher.in_flight(), "Draining background tasks");
    dispatcher.shutdown().await;
    info!("Bridge stopped");
    Ok(())
}

/// Wire every collaborator from `settings`.
#[must_use]
pub fn build_state(settings: &BridgeSettings, dispatcher: TaskDispatcher) -> AppState {
    let registry = Arc::new(TransportRegistry::new(settings.push_enabled));
    let push = init_push(&registry);
    info!(mode = ?registry.mode(), "Transport registry initialized");

    let hub = Arc::new(BridgeHub::new(registry.clone()));
    let gen_store = Arc::new(GenStore::new(registry.clone()));
    let provider = Arc::new(GeminiProvider::new(settings));
    info!(model = %settings.gemini_model, "Generation provider initialized");

    let deps = HandlerDeps {
        provider,
        bridge: hub.bridge(""),
        gen_store: gen_store.clone(),
        registry: registry.clone(),
        server: settings.widgetbot_server.clone(),
        channel: settings.widgetbot_channel.clone(),
    };
    let relay = Relay::new(
        Arc::new(DiscordClient::new(settings)),
        CommandRegistry::with_defaults(&deps),
        deps.bridge.clone(),
        registry,
        dispatcher,
    )
    .with_intervals(SinkIntervals::from_settings(settings));

    AppState {
        relay,
        hub,
        gen_store,
        push,
        verifier: init_verifier(settings),
        http: reqwest::Client::new(),
        webhook_url: settings.discord_webhook_url.clone(),
    }
}

fn init_push(registry: &TransportRegistry) -> Option<Arc<BroadcastPush>> {
    let push = Arc::new(BroadcastPush::new(PUSH_CHANNEL_CAPACITY));
    match registry.install(push.clone()) {
        Ok(()) => Some(push),
        Err(e) => {
            info!("Push channel not installed: {e}");
            None
        }
    }
}

fn init_verifier(settings: &BridgeSettings) -> Option<Arc<InteractionVerifier>> {
    if !settings.interactions_enabled() {
        info!("Discord interactions disabled, credentials incomplete");
        return None;
    }
    let key = settings.discord_public_key.as_deref().unwrap_or_default();
    match InteractionVerifier::from_hex(key) {
        Ok(verifier) => Some(Arc::new(verifier)),
        Err(e) => {
            warn!("Discord interactions disabled: {e}");
            None
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
