//! Store bridge between the backend and the embedded chat widget.
//!
//! Commands flow backend -> widget through a per-prefix command store;
//! widget events flow back into typed stores. The stores are authoritative
//! and always written. When a push channel is installed, every write is
//! also mirrored on the widget namespace with an identical payload.

mod command;
mod event;
mod store;

use thiserror::Error;

pub use command::{CommandRecord, NotifyData, WidgetCommand};
pub use event::{Author, ChannelRef, MessageBody, UserProfile, WidgetEvent};
pub use store::{BridgeHub, StoreBridge, StoreIds, StoreKind};

/// Errors raised while parsing bridge records
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BridgeError {
    /// Record has no `action` field
    #[error("command record has no action")]
    MissingAction,
    /// `action` names no known command
    #[error("unknown command action: {0}")]
    UnknownAction(String),
    /// A field required by the action is missing or has the wrong shape
    #[error("invalid `{field}` for action `{action}`")]
    InvalidField {
        /// Command action
        action: String,
        /// Offending field
        field: &'static str,
    },
    /// Widget event could not be normalized
    #[error("invalid widget event: {0}")]
    InvalidEvent(String),
    /// Unknown store key
    #[error("unknown store: {0}")]
    UnknownStore(String),
}
