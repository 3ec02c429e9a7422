use std::sync::Arc;

use anyhow::Result;
use axum::body::Body;
use axum::http::{self, StatusCode};
use axum::Router;
use ed25519_dalek::{Signer, SigningKey};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use widgetbot_bridge_core::bridge::{BridgeHub, StoreKind};
use widgetbot_bridge_core::gen::{GenEntry, GenResponse, GenStore};
use widgetbot_bridge_core::testing::{PlatformCall, RecordingPlatform, ScriptedProvider};
use widgetbot_bridge_core::transport::TransportRegistry;
use widgetbot_bridge_discord::handlers::{CommandRegistry, HandlerDeps};
use widgetbot_bridge_discord::http::{router, AppState};
use widgetbot_bridge_discord::interactions::InteractionVerifier;
use widgetbot_bridge_discord::relay::Relay;
use widgetbot_bridge_runtime::TaskDispatcher;

fn signing_key() -> SigningKey {
    SigningKey::from_bytes(&[7u8; 32])
}

fn state(verifier: Option<InteractionVerifier>) -> AppState {
    state_on(Arc::new(RecordingPlatform::default()), verifier)
}

fn state_on(platform: Arc<RecordingPlatform>, verifier: Option<InteractionVerifier>) -> AppState {
    let registry = Arc::new(TransportRegistry::new(false));
    let hub = Arc::new(BridgeHub::new(registry.clone()));
    let gen_store = Arc::new(GenStore::new(registry.clone()));
    let deps = HandlerDeps {
        provider: Arc::new(ScriptedProvider::new(Vec::<String>::new())),
        bridge: hub.bridge(""),
        gen_store: gen_store.clone(),
        registry: registry.clone(),
        server: "299881420891881473".to_string(),
        channel: "355719584830980096".to_string(),
    };
    let relay = Relay::new(
        platform,
        CommandRegistry::with_defaults(&deps),
        deps.bridge.clone(),
        registry,
        TaskDispatcher::new(),
    );
    AppState {
        relay,
        hub,
        gen_store,
        push: None,
        verifier: verifier.map(Arc::new),
        http: reqwest::Client::new(),
        webhook_url: None,
    }
}

fn verifier() -> InteractionVerifier {
    let public = hex::encode(signing_key().verifying_key().to_bytes());
    match InteractionVerifier::from_hex(&public) {
        Ok(verifier) => verifier,
        Err(e) => panic!("test key rejected: {e}"),
    }
}

async fn send(app: Router, request: http::Request<Body>) -> Result<(StatusCode, Value)> {
    let response = app.oneshot(request).await?;
    let status = response.status();
    let bytes = response.into_body().collect().await?.to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, body))
}

fn post_json(uri: &str, body: &Value) -> Result<http::Request<Body>> {
    Ok(http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))?)
}

fn get(uri: &str) -> Result<http::Request<Body>> {
    Ok(http::Request::builder().uri(uri).body(Body::empty())?)
}

fn signed_interaction(body: &str, timestamp: &str) -> Result<http::Request<Body>> {
    let mut message = timestamp.as_bytes().to_vec();
    message.extend_from_slice(body.as_bytes());
    let signature = hex::encode(signing_key().sign(&message).to_bytes());
    Ok(http::Request::builder()
        .method("POST")
        .uri("/api/discord/interactions")
        .header("content-type", "application/json")
        .header("X-Signature-Ed25519", signature)
        .header("X-Signature-Timestamp", timestamp)
        .body(Body::from(body.to_string()))?)
}

#[tokio::test]
async fn interactions_route_is_off_without_credentials() -> Result<()> {
    let app = router(state(None));
    let (status, _) = send(app, signed_interaction(r#"{"type":1}"#, "1700000000")?).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn signed_ping_gets_pong() -> Result<()> {
    let app = router(state(Some(verifier())));
    let (status, body) = send(app, signed_interaction(r#"{"type":1}"#, "1700000000")?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "type": 1 }));
    Ok(())
}

#[tokio::test]
async fn interaction_commands_finish_before_shutdown() -> Result<()> {
    let platform = Arc::new(RecordingPlatform::default());
    let state = state_on(platform.clone(), Some(verifier()));
    let relay = state.relay.clone();
    let app = router(state);

    let body = r#"{"type":2,"token":"tok-9","data":{"name":"gen"}}"#;
    let (status, _) = send(app, signed_interaction(body, "1700000000")?).await?;
    assert_eq!(status, StatusCode::OK);

    relay.dispatcher().shutdown().await;
    assert_eq!(
        platform.calls(),
        vec![PlatformCall::Patch {
            token: "tok-9".to_string(),
            content: "/gen needs a prompt".to_string(),
        }]
    );
    Ok(())
}

#[tokio::test]
async fn tampered_interaction_is_unauthorized() -> Result<()> {
    let app = router(state(Some(verifier())));
    let mut request = signed_interaction(r#"{"type":1}"#, "1700000000")?;
    *request.body_mut() = Body::from(r#"{"type":2}"#);

    let (status, body) = send(app, request).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid signature");
    Ok(())
}

#[tokio::test]
async fn widget_event_lands_in_its_store() -> Result<()> {
    let app = router(state(None));
    let (status, body) = send(
        app.clone(),
        post_json(
            "/api/widget/events",
            &json!({ "prefix": "help", "event": { "type": "ready" } }),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["store"], "status");

    let (status, body) = send(app, get("/api/widget/stores/status?prefix=help")?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revision"], 1);
    assert_eq!(body["data"]["initialized"], true);
    Ok(())
}

#[tokio::test]
async fn inline_widget_uses_its_own_stores() -> Result<()> {
    let app = router(state(None));
    let (status, body) = send(
        app.clone(),
        post_json(
            "/api/widget/events",
            &json!({ "widget": "main", "event": { "type": "ready" } }),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["store"], "event");
    assert_eq!(body["store_id"], "_widgetbot-widget-main-event");

    let (status, body) = send(app.clone(), get("/api/widget/stores/event?widget=main")?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revision"], 1);
    assert_eq!(body["data"]["type"], "ready");

    let (status, _) = send(app.clone(), get("/api/widget/stores/status?widget=main")?).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(app, get("/api/widget/stores/event")?).await?;
    assert_eq!(body["revision"], 0);
    Ok(())
}

#[tokio::test]
async fn unknown_widget_event_is_rejected() -> Result<()> {
    let app = router(state(None));
    let (status, _) = send(
        app,
        post_json("/api/widget/events", &json!({ "event": { "type": "explode" } }))?,
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn store_poll_before_any_write() -> Result<()> {
    let app = router(state(None));
    let (status, body) = send(app.clone(), get("/api/widget/stores/command")?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revision"], 0);
    assert_eq!(body["data"], Value::Null);

    let (status, _) = send(app, get("/api/widget/stores/bogus")?).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn host_commands_route_by_prefix() -> Result<()> {
    let state = state(None);
    let hub = state.hub.clone();
    let app = router(state);

    let (status, body) = send(
        app,
        post_json(
            "/api/widget/commands",
            &json!({ "action": "toggle", "value": true, "_prefix": "support" }),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["action"], "toggle");

    let (revision, stored) = hub.bridge("support").read(StoreKind::Command).unwrap_or_default();
    assert_eq!(revision, 1);
    assert_eq!(stored["_prefix"], "support");
    assert_eq!(hub.bridge("").read(StoreKind::Command), None);
    Ok(())
}

#[tokio::test]
async fn chat_routes_report_what_happened() -> Result<()> {
    let app = router(state(None));

    let (status, body) = send(
        app.clone(),
        post_json(
            "/api/widget/chat",
            &json!({ "channel_id": "c1", "author": "ada", "content": "hello" }),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pass_through");

    let (status, body) = send(
        app,
        post_json(
            "/api/widget/chat",
            &json!({ "channel_id": "c1", "author": "ada", "content": "/ask" }),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "rejected");
    assert_eq!(body["reason"], "/ask needs a question");
    Ok(())
}

#[tokio::test]
async fn gen_feed_pages_with_cursor() -> Result<()> {
    let state = state(None);
    let raw = r#"{"format":"callout","title":"Heads up","callout":{"variant":"info","title":"Note","body":"Hi"}}"#;
    let response: GenResponse = serde_json::from_str(raw)?;
    state.gen_store.add(GenEntry::new("first", response.clone(), "ada"));
    state.gen_store.add(GenEntry::new("second", response, "ada"));
    let app = router(state);

    let (status, body) = send(app.clone(), get("/api/gen/entries?since=1")?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["next"], 2);
    assert_eq!(body["entries"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["entries"][0]["prompt"], "second");

    let (_, body) = send(app, get("/api/gen/entries")?).await?;
    assert_eq!(body["entries"].as_array().map(Vec::len), Some(2));
    Ok(())
}

#[tokio::test]
async fn missing_image_and_disabled_push_are_not_found() -> Result<()> {
    let app = router(state(None));

    let uri = format!("/api/gen/image/{}", Uuid::new_v4());
    let (status, _) = send(app.clone(), get(&uri)?).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(app.clone(), get("/api/gen/image/not-a-uuid")?).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(app, get("/api/push/widgetbot")?).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "push transport disabled");
    Ok(())
}

#[tokio::test]
async fn webhook_without_url_reports_failure() -> Result<()> {
    let app = router(state(None));
    let (status, body) = send(app, post_json("/api/webhook", &json!({ "content": "hi" }))?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "No webhook URL provided");
    Ok(())
}
