//! Optional server-push channel.
//!
//! The store bridge and the gen feed always work through polling; when a
//! push channel is installed the same payloads are additionally emitted to
//! connected clients. The registry is built once at startup and shared by
//! `Arc`, and the handle can be installed exactly once.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Event name for mirrored widget commands.
pub const EVENT_WIDGET_COMMAND: &str = "widget_command";
/// Event name for mirrored widget events.
pub const EVENT_WIDGET_EVENT: &str = "widget_event";
/// Event name for progress updates.
pub const EVENT_GEN_PROGRESS: &str = "gen_progress";
/// Event name for newly stored gen entries.
pub const EVENT_GEN_ENTRY: &str = "gen_entry";

/// Errors raised by the transport registry
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// A push channel was already installed
    #[error("push channel already installed")]
    AlreadyInstalled,
    /// Push delivery is disabled by configuration
    #[error("push transport disabled by configuration")]
    Disabled,
    /// Unknown namespace path
    #[error("unknown push namespace: {0}")]
    UnknownNamespace(String),
}

/// Push namespaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Namespace {
    /// Widget command and event mirroring
    #[serde(rename = "/widgetbot")]
    Widget,
    /// Generated-content notifications
    #[serde(rename = "/gen")]
    Gen,
}

impl Namespace {
    /// Path form (`/widgetbot`, `/gen`).
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Widget => "/widgetbot",
            Self::Gen => "/gen",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl FromStr for Namespace {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches('/') {
            "widgetbot" => Ok(Self::Widget),
            "gen" => Ok(Self::Gen),
            other => Err(TransportError::UnknownNamespace(other.to_string())),
        }
    }
}

/// Which delivery mode clients should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Poll the stores
    Store,
    /// Subscribe to server push
    Push,
}

/// A server-push channel.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait PushChannel: Send + Sync {
    /// Emit `payload` as `event` on `namespace`. `true` if it was handed off.
    fn emit(&self, namespace: Namespace, event: &str, payload: Value) -> bool;
}

/// One pushed message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushFrame {
    /// Target namespace
    pub namespace: Namespace,
    /// Event name
    pub event: String,
    /// Payload, identical to what the store holds
    pub payload: Value,
}

/// Push channel backed by a `tokio::sync::broadcast` buffer.
pub struct BroadcastPush {
    tx: broadcast::Sender<PushFrame>,
}

impl BroadcastPush {
    /// Channel buffering up to `capacity` frames per slow subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// New subscriber receiving every frame emitted from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PushFrame> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl PushChannel for BroadcastPush {
    fn emit(&self, namespace: Namespace, event: &str, payload: Value) -> bool {
        let frame = PushFrame {
            namespace,
            event: event.to_string(),
            payload,
        };
        // No subscribers is not a failure: the stores remain authoritative.
        match self.tx.send(frame) {
            Ok(receivers) => {
                debug!(%namespace, event, receivers, "Push frame sent");
                true
            }
            Err(_) => {
                debug!(%namespace, event, "Push frame dropped, no subscribers");
                true
            }
        }
    }
}

/// Holds the optional push channel for the lifetime of the process.
pub struct TransportRegistry {
    handle: OnceLock<Arc<dyn PushChannel>>,
    push_enabled: bool,
}

impl TransportRegistry {
    /// Registry whose push flag was computed from configuration.
    #[must_use]
    pub const fn new(push_enabled: bool) -> Self {
        Self {
            handle: OnceLock::new(),
            push_enabled,
        }
    }

    /// Install the push channel.
    ///
    /// # Errors
    ///
    /// Returns `Disabled` when push is off and `AlreadyInstalled` on a second call.
    pub fn install(&self, channel: Arc<dyn PushChannel>) -> Result<(), TransportError> {
        if !self.push_enabled {
            return Err(TransportError::Disabled);
        }
        self.handle
            .set(channel)
            .map_err(|_| TransportError::AlreadyInstalled)?;
        info!("Push channel installed");
        Ok(())
    }

    /// Emit through the installed channel; `false` when none is installed.
    pub fn emit(&self, namespace: Namespace, event: &str, payload: Value) -> bool {
        self.handle
            .get()
            .is_some_and(|channel| channel.emit(namespace, event, payload))
    }

    /// Whether a channel is installed.
    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.handle.get().is_some()
    }

    /// Delivery mode clients should use.
    #[must_use]
    pub fn mode(&self) -> TransportMode {
        if self.is_installed() {
            TransportMode::Push
        } else {
            TransportMode::Store
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn emit_without_handle_is_noop() {
        let registry = TransportRegistry::new(true);
        assert!(!registry.emit(Namespace::Widget, EVENT_WIDGET_COMMAND, json!({})));
        assert_eq!(registry.mode(), TransportMode::Store);
    }

    #[test]
    fn install_once() {
        let registry = TransportRegistry::new(true);
        assert!(registry.install(Arc::new(BroadcastPush::new(4))).is_ok());
        assert_eq!(
            registry.install(Arc::new(BroadcastPush::new(4))),
            Err(TransportError::AlreadyInstalled)
        );
        assert_eq!(registry.mode(), TransportMode::Push);
    }

    #[test]
    fn disabled_registry_refuses_install() {
        let registry = TransportRegistry::new(false);
        assert_eq!(
            registry.install(Arc::new(BroadcastPush::new(4))),
            Err(TransportError::Disabled)
        );
        assert!(!registry.is_installed());
    }

    #[test]
    fn emit_reaches_installed_channel() {
        let mut mock = MockPushChannel::new();
        mock.expect_emit()
            .withf(|ns, event, payload| {
                *ns == Namespace::Gen && event == EVENT_GEN_ENTRY && payload["id"] == "x"
            })
            .times(1)
            .return_const(true);

        let registry = TransportRegistry::new(true);
        assert!(registry.install(Arc::new(mock)).is_ok());
        assert!(registry.emit(Namespace::Gen, EVENT_GEN_ENTRY, json!({"id": "x"})));
    }

    #[tokio::test]
    async fn broadcast_delivers_frames_in_order() {
        let push = BroadcastPush::new(8);
        let mut rx = push.subscribe();
        assert!(push.emit(Namespace::Widget, "a", json!(1)));
        assert!(push.emit(Namespace::Widget, "b", json!(2)));

        let first = rx.recv().await.ok().map(|f| f.event);
        let second = rx.recv().await.ok().map(|f| f.event);
        assert_eq!(first.as_deref(), Some("a"));
        assert_eq!(second.as_deref(), Some("b"));
    }

    #[test]
    fn namespace_parsing() {
        assert_eq!("gen".parse::<Namespace>(), Ok(Namespace::Gen));
        assert_eq!("/widgetbot".parse::<Namespace>(), Ok(Namespace::Widget));
        assert!("chat".parse::<Namespace>().is_err());
    }
}
