//! HTTP surface: Discord interactions, widget ingest, polling, binary fetch
//! and the optional server-push stream.
//!
//! | Route | Purpose |
//! |---|---|
//! | `POST /api/discord/interactions` | signed Discord interactions |
//! | `POST /api/widget/events` | raw widget events into typed stores |
//! | `POST /api/widget/chat` | chat text offered for command interception |
//! | `POST /api/widget/commands` | host-issued widget commands |
//! | `GET /api/widget/stores/{kind}` | store poll |
//! | `GET /api/gen/entries?since=N` | gen feed poll |
//! | `GET /api/gen/image/{id}` | generated image bytes |
//! | `GET /api/push/{namespace}` | server-sent events, when push is installed |
//! | `POST /api/webhook` | post through the configured webhook |

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::stream::{self, Stream};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};
use uuid::Uuid;
use widgetbot_bridge_core::bridge::{
    BridgeError, BridgeHub, CommandRecord, StoreBridge, StoreKind,
};
use widgetbot_bridge_core::config::POLL_INTERVAL_MS;
use widgetbot_bridge_core::gen::{GenEntryPayload, GenStore};
use widgetbot_bridge_core::transport::{BroadcastPush, Namespace, TransportError};

use crate::interactions::{Interaction, InteractionVerifier};
use crate::relay::{ChatOutcome, Relay};
use crate::webhook::{send_webhook_message, WebhookMessage};

/// JSON error body with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    fn bad_request(message: impl ToString) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// Shared state of every route.
#[derive(Clone)]
pub struct AppState {
    /// Command relay
    pub relay: Relay,
    /// Store bridges by widget prefix
    pub hub: Arc<BridgeHub>,
    /// Gen feed
    pub gen_store: Arc<GenStore>,
    /// Installed push channel, if any
    pub push: Option<Arc<BroadcastPush>>,
    /// Interaction signature verifier; `None` disables the interactions route
    pub verifier: Option<Arc<InteractionVerifier>>,
    /// Client for outbound webhook calls
    pub http: reqwest::Client,
    /// Default webhook URL
    pub webhook_url: Option<String>,
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/discord/interactions", post(interactions))
        .route("/api/widget/events", post(widget_event))
        .route("/api/widget/chat", post(widget_chat))
        .route("/api/widget/commands", post(widget_command))
        .route("/api/widget/stores/{kind}", get(read_store))
        .route("/api/gen/entries", get(gen_entries))
        .route("/api/gen/image/{id}", get(gen_image))
        .route("/api/push/{namespace}", get(push_stream))
        .route("/api/webhook", post(send_webhook))
        .with_state(state)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

async fn interactions(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let Some(verifier) = &state.verifier else {
        return Err(ApiError::not_found("interactions disabled"));
    };
    if !verifier.verify(
        header_str(&headers, "X-Signature-Ed25519"),
        header_str(&headers, "X-Signature-Timestamp"),
        &body,
    ) {
        debug!("Rejected interaction with invalid signature");
        return Err(ApiError::new(StatusCode::UNAUTHORIZED, "Invalid signature"));
    }

    let interaction: Interaction = serde_json::from_slice(&body).map_err(ApiError::bad_request)?;
    let (response, ticket) = state.relay.handle_interaction(interaction);
    if let Some(ticket) = ticket {
        state.relay.dispatcher().detach(ticket);
    }
    Ok(Json(response.to_json()))
}

#[derive(Deserialize)]
struct WidgetEventRequest {
    #[serde(default)]
    prefix: String,
    #[serde(default)]
    widget: Option<String>,
    event: Value,
}

fn store_bridge(hub: &BridgeHub, prefix: &str, widget: Option<&str>) -> Arc<StoreBridge> {
    match widget {
        Some(container_id) => hub.widget(container_id),
        None => hub.bridge(prefix),
    }
}

async fn widget_event(
    State(state): State<AppState>,
    Json(request): Json<WidgetEventRequest>,
) -> Result<Json<Value>, ApiError> {
    let bridge = store_bridge(&state.hub, &request.prefix, request.widget.as_deref());
    let kind = bridge
        .ingest_event(request.event)
        .map_err(ApiError::bad_request)?;
    Ok(Json(json!({
        "store": kind,
        "store_id": bridge.ids().get(kind),
    })))
}

#[derive(Deserialize)]
struct ChatRequest {
    channel_id: String,
    #[serde(default)]
    author: String,
    content: String,
}

async fn widget_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Response {
    match state
        .relay
        .handle_chat(&request.channel_id, &request.author, &request.content)
    {
        ChatOutcome::PassThrough => Json(json!({ "status": "pass_through" })).into_response(),
        ChatOutcome::Rejected(reason) => {
            Json(json!({ "status": "rejected", "reason": reason })).into_response()
        }
        ChatOutcome::Dispatched(ticket) => {
            let task_id = ticket.id();
            state.relay.dispatcher().detach(ticket);
            (
                StatusCode::ACCEPTED,
                Json(json!({ "status": "dispatched", "task_id": task_id })),
            )
                .into_response()
        }
    }
}

async fn widget_command(
    State(state): State<AppState>,
    Json(raw): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let record = CommandRecord::from_wire(&raw).map_err(ApiError::bad_request)?;
    Ok(Json(state.hub.bridge(&record.prefix).send_record(&record)))
}

#[derive(Deserialize)]
struct StoreQuery {
    #[serde(default)]
    prefix: String,
    widget: Option<String>,
}

async fn read_store(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(query): Query<StoreQuery>,
) -> Result<Json<Value>, ApiError> {
    let kind: StoreKind = kind
        .parse()
        .map_err(|e: BridgeError| ApiError::not_found(e.to_string()))?;
    let bridge = store_bridge(&state.hub, &query.prefix, query.widget.as_deref());
    let store_id = bridge
        .ids()
        .get(kind)
        .ok_or_else(|| ApiError::not_found(format!("no {kind} store on this widget")))?;
    let (revision, data) = bridge.read(kind).unwrap_or((0, Value::Null));
    Ok(Json(json!({
        "store_id": store_id,
        "revision": revision,
        "data": data,
    })))
}

#[derive(Deserialize)]
struct EntriesQuery {
    #[serde(default)]
    since: usize,
}

async fn gen_entries(
    State(state): State<AppState>,
    Query(query): Query<EntriesQuery>,
) -> Json<Value> {
    let entries: Vec<GenEntryPayload> = state
        .gen_store
        .list_since(query.since)
        .iter()
        .map(|entry| entry.payload())
        .collect();
    let next = query.since + entries.len();
    Json(json!({
        "entries": entries,
        "next": next,
        "poll_interval_ms": POLL_INTERVAL_MS,
    }))
}

async fn gen_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = Uuid::parse_str(&id).map_err(|_| ApiError::not_found("no such entry"))?;
    let image = state
        .gen_store
        .get(id)
        .and_then(|entry| entry.image.clone())
        .ok_or_else(|| ApiError::not_found("no image for entry"))?;
    Ok((
        [
            (header::CONTENT_TYPE, image.mime),
            (header::CACHE_CONTROL, "public, max-age=31536000, immutable".to_string()),
        ],
        image.bytes,
    )
        .into_response())
}

async fn push_stream(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let namespace: Namespace = namespace
        .parse()
        .map_err(|e: TransportError| ApiError::not_found(e.to_string()))?;
    let push = state
        .push
        .as_ref()
        .ok_or_else(|| ApiError::not_found("push transport disabled"))?;
    let rx = push.subscribe();
    debug!(%namespace, subscribers = push.subscriber_count(), "Push client connected");

    let stream = stream::unfold(rx, move |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(frame) if frame.namespace == namespace => {
                    let event = Event::default()
                        .event(frame.event)
                        .data(frame.payload.to_string());
                    return Some((Ok(event), rx));
                }
                Ok(_) => {}
                Err(RecvError::Closed) => return None,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Push client lagged");
                    return Some((Ok(Event::default().comment("lagged")), rx));
                }
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn send_webhook(
    State(state): State<AppState>,
    Json(message): Json<WebhookMessage>,
) -> Json<Value> {
    let result = send_webhook_message(&state.http, state.webhook_url.as_deref(), &message).await;
    Json(json!(result))
}
