//! Discord interactions: request signature verification and payload model.

use ed25519_dalek::{Signature, VerifyingKey};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Interaction type sent by Discord when verifying the endpoint.
pub const INTERACTION_PING: u8 = 1;
/// Interaction type of a slash command invocation.
pub const INTERACTION_APPLICATION_COMMAND: u8 = 2;

/// Response type acknowledging a ping.
pub const RESPONSE_PONG: u8 = 1;
/// Response type deferring the reply; the `@original` message is patched later.
pub const RESPONSE_DEFERRED: u8 = 5;
/// Message flag hiding the reply from everyone but the invoking user.
pub const FLAG_EPHEMERAL: u64 = 1 << 6;

/// Errors building an interaction verifier
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InteractionError {
    /// Public key is not 32 hex-encoded bytes
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),
}

/// Verifies `X-Signature-Ed25519` over `timestamp || body`.
#[derive(Debug, Clone)]
pub struct InteractionVerifier {
    key: VerifyingKey,
}

impl InteractionVerifier {
    /// Verifier for the application's hex-encoded public key.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPublicKey` when the key cannot be decoded.
    pub fn from_hex(public_key: &str) -> Result<Self, InteractionError> {
        let bytes = hex::decode(public_key.trim())
            .map_err(|e| InteractionError::InvalidPublicKey(e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| InteractionError::InvalidPublicKey("expected 32 bytes".to_string()))?;
        let key = VerifyingKey::from_bytes(&bytes)
            .map_err(|e| InteractionError::InvalidPublicKey(e.to_string()))?;
        Ok(Self { key })
    }

    /// `true` if `signature` (hex) signs `timestamp` followed by `body`.
    #[must_use]
    pub fn verify(&self, signature: &str, timestamp: &str, body: &[u8]) -> bool {
        let Ok(signature) = hex::decode(signature) else {
            return false;
        };
        let Ok(signature) = Signature::try_from(signature.as_slice()) else {
            return false;
        };
        let mut message = Vec::with_capacity(timestamp.len() + body.len());
        message.extend_from_slice(timestamp.as_bytes());
        message.extend_from_slice(body);
        self.key.verify_strict(&message, &signature).is_ok()
    }
}

/// Discord user as embedded in interactions
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct User {
    /// Snowflake id
    pub id: String,
    /// Account name
    pub username: String,
    /// Display name, if set
    #[serde(default)]
    pub global_name: Option<String>,
}

/// Guild member wrapper
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Member {
    /// The member's user
    pub user: Option<User>,
}

/// One option of an invoked command
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CommandOption {
    /// Option name
    pub name: String,
    /// Option value as sent by Discord
    #[serde(default)]
    pub value: Value,
}

/// `data` of an application command interaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CommandData {
    /// Command name without the slash
    pub name: String,
    /// Supplied options
    #[serde(default)]
    pub options: Vec<CommandOption>,
}

/// Incoming interaction payload (the subset the relay reads)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Interaction {
    /// Interaction type
    #[serde(rename = "type")]
    pub kind: u8,
    /// Continuation token for follow-ups
    #[serde(default)]
    pub token: String,
    /// Command data
    #[serde(default)]
    pub data: Option<CommandData>,
    /// Invoking member (guild context)
    #[serde(default)]
    pub member: Option<Member>,
    /// Invoking user (DM context)
    #[serde(default)]
    pub user: Option<User>,
    /// Channel the command was used in
    #[serde(default)]
    pub channel_id: Option<String>,
}

impl Interaction {
    /// String value of option `name`, if present and non-empty.
    #[must_use]
    pub fn option(&self, name: &str) -> Option<String> {
        self.data
            .as_ref()?
            .options
            .iter()
            .find(|o| o.name == name)
            .and_then(|o| match &o.value {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .filter(|s| !s.is_empty())
    }

    /// Display name of whoever invoked the interaction.
    #[must_use]
    pub fn author_name(&self) -> String {
        self.member
            .as_ref()
            .and_then(|m| m.user.as_ref())
            .or(self.user.as_ref())
            .map_or_else(
                || "unknown".to_string(),
                |u| u.global_name.clone().unwrap_or_else(|| u.username.clone()),
            )
    }
}

/// Immediate HTTP reply to an interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionResponse {
    /// Endpoint verification reply
    Pong,
    /// Acknowledge now, patch `@original` later
    Deferred {
        /// Hide the eventual reply from other users
        ephemeral: bool,
    },
}

impl InteractionResponse {
    /// JSON body Discord expects.
    #[must_use]
    pub fn to_json(self) -> Value {
        match self {
            Self::Pong => json!({ "type": RESPONSE_PONG }),
            Self::Deferred { ephemeral: false } => json!({ "type": RESPONSE_DEFERRED }),
            Self::Deferred { ephemeral: true } => json!({
                "type": RESPONSE_DEFERRED,
                "data": { "flags": FLAG_EPHEMERAL },
            }),
        }
    }
}
