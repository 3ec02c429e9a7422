use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::command::{CommandRecord, WidgetCommand};
use super::event::WidgetEvent;
use super::BridgeError;
use crate::transport::{Namespace, TransportRegistry, EVENT_WIDGET_COMMAND, EVENT_WIDGET_EVENT};

/// Kinds of store kept per widget instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Widget configuration
    Config,
    /// Last command sent to the widget
    Command,
    /// Last generic widget event
    Event,
    /// Last chat message
    Message,
    /// Signed-in user
    User,
    /// Widget readiness
    Status,
}

impl StoreKind {
    /// All kinds, in store-id order.
    pub const ALL: [Self; 6] = [
        Self::Config,
        Self::Command,
        Self::Event,
        Self::Message,
        Self::User,
        Self::Status,
    ];

    /// Kinds a standalone widget embed exposes.
    pub const WIDGET: [Self; 4] = [Self::Config, Self::Command, Self::Event, Self::Message];

    /// Key used in store ids and URLs.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Command => "command",
            Self::Event => "event",
            Self::Message => "message",
            Self::User => "user",
            Self::Status => "status",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for StoreKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.key() == s)
            .ok_or_else(|| BridgeError::UnknownStore(s.to_string()))
    }
}

/// Namespaced store ids for one widget instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreIds {
    base: String,
    kinds: &'static [StoreKind],
}

impl StoreIds {
    /// Ids for the floating widget, e.g. `support-_widgetbot-crate-command`.
    #[must_use]
    pub fn for_crate(prefix: &str) -> Self {
        let base = if prefix.is_empty() {
            "_widgetbot-crate".to_string()
        } else {
            format!("{prefix}-_widgetbot-crate")
        };
        Self {
            base,
            kinds: &StoreKind::ALL,
        }
    }

    /// Ids for an inline widget embed, e.g. `_widgetbot-widget-main-event`.
    #[must_use]
    pub fn for_widget(container_id: &str) -> Self {
        let tag = if container_id.is_empty() {
            "default"
        } else {
            container_id
        };
        Self {
            base: format!("_widgetbot-widget-{tag}"),
            kinds: &StoreKind::WIDGET,
        }
    }

    /// Id of the `kind` store, if this instance has one.
    #[must_use]
    pub fn get(&self, kind: StoreKind) -> Option<String> {
        self.kinds
            .contains(&kind)
            .then(|| format!("{}-{}", self.base, kind.key()))
    }

    /// All `(kind, id)` pairs.
    #[must_use]
    pub fn all(&self) -> Vec<(StoreKind, String)> {
        self.kinds
            .iter()
            .map(|kind| (*kind, format!("{}-{}", self.base, kind.key())))
            .collect()
    }
}

#[derive(Debug, Clone)]
struct StoreSlot {
    revision: u64,
    payload: Value,
}

/// Authoritative stores for one widget instance.
pub struct StoreBridge {
    prefix: String,
    ids: StoreIds,
    stores: Mutex<HashMap<StoreKind, StoreSlot>>,
    registry: Arc<TransportRegistry>,
}

impl StoreBridge {
    /// Bridge for the instance `prefix` mirroring through `registry`.
    #[must_use]
    pub fn new(prefix: impl Into<String>, registry: Arc<TransportRegistry>) -> Self {
        let prefix = prefix.into();
        Self::with_ids(StoreIds::for_crate(&prefix), prefix, registry)
    }

    /// Bridge for the inline widget embedded in `container_id`.
    ///
    /// Only the widget store kinds exist; events of other categories land in
    /// the event store.
    #[must_use]
    pub fn for_widget(container_id: impl Into<String>, registry: Arc<TransportRegistry>) -> Self {
        let container_id = container_id.into();
        Self::with_ids(StoreIds::for_widget(&container_id), container_id, registry)
    }

    fn with_ids(ids: StoreIds, prefix: String, registry: Arc<TransportRegistry>) -> Self {
        Self {
            ids,
            prefix,
            stores: Mutex::new(HashMap::new()),
            registry,
        }
    }

    /// Instance prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Store ids of this instance.
    #[must_use]
    pub const fn ids(&self) -> &StoreIds {
        &self.ids
    }

    /// Replace the payload of `kind`, returning the new revision.
    pub fn write(&self, kind: StoreKind, payload: Value) -> u64 {
        let mut stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = stores.entry(kind).or_insert(StoreSlot {
            revision: 0,
            payload: Value::Null,
        });
        slot.revision += 1;
        slot.payload = payload;
        slot.revision
    }

    /// Current `(revision, payload)` of `kind`; `None` if never written.
    #[must_use]
    pub fn read(&self, kind: StoreKind) -> Option<(u64, Value)> {
        self.stores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map(|slot| (slot.revision, slot.payload.clone()))
    }

    /// Stamp and store `command`, then mirror it on the widget namespace.
    ///
    /// Returns the wire record written.
    pub fn send_command(&self, command: WidgetCommand) -> Value {
        self.send_record(&CommandRecord::new(command, self.prefix.clone()))
    }

    /// Store an already-stamped record, then mirror it.
    pub fn send_record(&self, record: &CommandRecord) -> Value {
        let payload = record.to_wire();
        let revision = self.write(StoreKind::Command, payload.clone());
        let pushed = self
            .registry
            .emit(Namespace::Widget, EVENT_WIDGET_COMMAND, payload.clone());
        debug!(
            prefix = %self.prefix,
            action = record.command.action(),
            revision,
            pushed,
            "Widget command stored"
        );
        payload
    }

    /// Normalize a raw widget event into its typed store and mirror it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEvent` when the payload is not a known widget event.
    pub fn ingest_event(&self, raw: Value) -> Result<StoreKind, BridgeError> {
        let event: WidgetEvent =
            serde_json::from_value(raw).map_err(|e| BridgeError::InvalidEvent(e.to_string()))?;
        let kind = Some(event.category())
            .filter(|kind| self.ids.get(*kind).is_some())
            .unwrap_or(StoreKind::Event);
        let payload = event.normalize(chrono::Utc::now().timestamp_millis());
        let revision = self.write(kind, payload.clone());
        let pushed = self
            .registry
            .emit(Namespace::Widget, EVENT_WIDGET_EVENT, payload);
        debug!(prefix = %self.prefix, store = %kind, revision, pushed, "Widget event stored");
        Ok(kind)
    }
}

/// Store bridges of every widget instance, created on first use.
pub struct BridgeHub {
    registry: Arc<TransportRegistry>,
    bridges: Mutex<HashMap<String, Arc<StoreBridge>>>,
    widgets: Mutex<HashMap<String, Arc<StoreBridge>>>,
}

impl BridgeHub {
    /// Empty hub mirroring through `registry`.
    #[must_use]
    pub fn new(registry: Arc<TransportRegistry>) -> Self {
        Self {
            registry,
            bridges: Mutex::new(HashMap::new()),
            widgets: Mutex::new(HashMap::new()),
        }
    }

    /// Bridge for `prefix`, creating it if needed.
    #[must_use]
    pub fn bridge(&self, prefix: &str) -> Arc<StoreBridge> {
        let mut bridges = self.bridges.lock().unwrap_or_else(PoisonError::into_inner);
        bridges
            .entry(prefix.to_string())
            .or_insert_with(|| Arc::new(StoreBridge::new(prefix, self.registry.clone())))
            .clone()
    }

    /// Bridge for the inline widget in `container_id`, creating it if needed.
    #[must_use]
    pub fn widget(&self, container_id: &str) -> Arc<StoreBridge> {
        let mut widgets = self.widgets.lock().unwrap_or_else(PoisonError::into_inner);
        widgets
            .entry(container_id.to_string())
            .or_insert_with(|| {
                Arc::new(StoreBridge::for_widget(container_id, self.registry.clone()))
            })
            .clone()
    }

    /// Shared transport registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<TransportRegistry> {
        &self.registry
    }
}
