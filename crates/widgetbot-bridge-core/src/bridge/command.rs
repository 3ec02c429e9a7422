use serde_json::{json, Map, Value};

use super::BridgeError;
use crate::utils::unique_timestamp;

/// Payload of a `notify` command.
#[derive(Debug, Clone, PartialEq)]
pub enum NotifyData {
    /// Plain text bubble with the widget's default timeout
    Text(String),
    /// Bubble with explicit timeout and/or avatar
    Detailed {
        /// Text shown
        content: String,
        /// Display time in milliseconds
        timeout: Option<u64>,
        /// Avatar URL
        avatar: Option<String>,
    },
}

impl NotifyData {
    fn to_value(&self) -> Value {
        match self {
            Self::Text(text) => Value::String(text.clone()),
            Self::Detailed {
                content,
                timeout,
                avatar,
            } => {
                let mut data = Map::new();
                data.insert("content".into(), Value::String(content.clone()));
                if let Some(timeout) = timeout {
                    data.insert("timeout".into(), json!(timeout));
                }
                if let Some(avatar) = avatar {
                    data.insert("avatar".into(), Value::String(avatar.clone()));
                }
                Value::Object(data)
            }
        }
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(text) => Some(Self::Text(text.clone())),
            Value::Object(map) => Some(Self::Detailed {
                content: map.get("content")?.as_str()?.to_string(),
                timeout: map.get("timeout").and_then(Value::as_u64),
                avatar: map.get("avatar").and_then(Value::as_str).map(str::to_string),
            }),
            _ => None,
        }
    }
}

/// A command for the embedded widget.
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetCommand {
    /// Open (`Some(true)`), close (`Some(false)`) or flip (`None`)
    Toggle {
        /// Target state
        value: Option<bool>,
    },
    /// Notification bubble on the widget button
    Notify {
        /// Bubble content
        data: NotifyData,
    },
    /// Switch the widget to a channel
    Navigate {
        /// Channel id
        channel: String,
        /// Guild id, when switching servers
        guild: Option<String>,
    },
    /// Hide the widget entirely
    Hide,
    /// Restore a hidden widget
    Show,
    /// Merge options into the widget configuration
    UpdateOptions {
        /// Options to merge
        options: Map<String, Value>,
    },
    /// Send a chat message through the widget
    SendMessage {
        /// Message text
        message: String,
        /// Target channel, defaults to the current one
        channel: Option<String>,
    },
    /// Ask the user to log in
    Login,
    /// Log the user out
    Logout,
    /// Set a theme color variable
    SetColor {
        /// `background`, `accent` or `primary`
        variable: String,
        /// CSS color
        value: String,
    },
    /// Raw widget API event
    Emit {
        /// Event name
        event: String,
        /// Event data
        data: Value,
    },
}

impl WidgetCommand {
    /// Plain notification.
    #[must_use]
    pub fn notify(text: impl Into<String>) -> Self {
        Self::Notify {
            data: NotifyData::Text(text.into()),
        }
    }

    /// Notification with an explicit display time.
    #[must_use]
    pub fn notify_with_timeout(text: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Notify {
            data: NotifyData::Detailed {
                content: text.into(),
                timeout: Some(timeout_ms),
                avatar: None,
            },
        }
    }

    /// Navigate within the current guild.
    #[must_use]
    pub fn navigate(channel: impl Into<String>) -> Self {
        Self::Navigate {
            channel: channel.into(),
            guild: None,
        }
    }

    /// Wire name of the action.
    #[must_use]
    pub const fn action(&self) -> &'static str {
        match self {
            Self::Toggle { .. } => "toggle",
            Self::Notify { .. } => "notify",
            Self::Navigate { .. } => "navigate",
            Self::Hide => "hide",
            Self::Show => "show",
            Self::UpdateOptions { .. } => "update_options",
            Self::SendMessage { .. } => "send_message",
            Self::Login => "login",
            Self::Logout => "logout",
            Self::SetColor { .. } => "color",
            Self::Emit { .. } => "emit",
        }
    }

    fn write_fields(&self, record: &mut Map<String, Value>) {
        match self {
            Self::Toggle { value } => {
                if let Some(value) = value {
                    record.insert("value".into(), Value::Bool(*value));
                }
            }
            Self::Notify { data } => {
                record.insert("data".into(), data.to_value());
            }
            Self::Navigate { channel, guild } => {
                let data = match guild {
                    Some(guild) => json!({ "guild": guild, "channel": channel }),
                    None => Value::String(channel.clone()),
                };
                record.insert("data".into(), data);
            }
            Self::UpdateOptions { options } => {
                record.insert("data".into(), Value::Object(options.clone()));
            }
            Self::SendMessage { message, channel } => {
                let data = match channel {
                    Some(channel) => json!({ "channel": channel, "message": message }),
                    None => Value::String(message.clone()),
                };
                record.insert("data".into(), data);
            }
            Self::SetColor { variable, value } => {
                record.insert("data".into(), json!([variable, value]));
            }
            Self::Emit { event, data } => {
                record.insert("event".into(), Value::String(event.clone()));
                record.insert("data".into(), data.clone());
            }
            Self::Hide | Self::Show | Self::Login | Self::Logout => {}
        }
    }

    fn from_record(action: &str, record: &Map<String, Value>) -> Result<Self, BridgeError> {
        let invalid = |field: &'static str| BridgeError::InvalidField {
            action: action.to_string(),
            field,
        };
        let data = record.get("data").unwrap_or(&Value::Null);

        let command = match action {
            "toggle" => Self::Toggle {
                value: record.get("value").and_then(Value::as_bool),
            },
            "notify" => Self::Notify {
                data: NotifyData::from_value(data).ok_or_else(|| invalid("data"))?,
            },
            "navigate" => match data {
                Value::String(channel) => Self::navigate(channel.clone()),
                Value::Object(map) => Self::Navigate {
                    channel: map
                        .get("channel")
                        .and_then(Value::as_str)
                        .ok_or_else(|| invalid("data"))?
                        .to_string(),
                    guild: map.get("guild").and_then(Value::as_str).map(str::to_string),
                },
                _ => return Err(invalid("data")),
            },
            "hide" => Self::Hide,
            "show" => Self::Show,
            "update_options" => Self::UpdateOptions {
                options: match data {
                    Value::Object(map) => map.clone(),
                    Value::Null => Map::new(),
                    _ => return Err(invalid("data")),
                },
            },
            "send_message" => match data {
                Value::String(message) => Self::SendMessage {
                    message: message.clone(),
                    channel: None,
                },
                Value::Object(map) => Self::SendMessage {
                    message: map
                        .get("message")
                        .and_then(Value::as_str)
                        .ok_or_else(|| invalid("data"))?
                        .to_string(),
                    channel: map.get("channel").and_then(Value::as_str).map(str::to_string),
                },
                _ => return Err(invalid("data")),
            },
            "login" => Self::Login,
            "logout" => Self::Logout,
            "color" => match data.as_array().map(Vec::as_slice) {
                Some([Value::String(variable), Value::String(value)]) => Self::SetColor {
                    variable: variable.clone(),
                    value: value.clone(),
                },
                _ => return Err(invalid("data")),
            },
            "emit" => Self::Emit {
                event: record
                    .get("event")
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid("event"))?
                    .to_string(),
                data: data.clone(),
            },
            other => return Err(BridgeError::UnknownAction(other.to_string())),
        };
        Ok(command)
    }
}

/// A command stamped for delivery to one widget instance.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRecord {
    /// The command
    pub command: WidgetCommand,
    /// Strictly increasing send time in seconds
    pub ts: f64,
    /// Widget instance prefix (empty for the default instance)
    pub prefix: String,
}

impl CommandRecord {
    /// Stamp `command` for the instance `prefix`.
    #[must_use]
    pub fn new(command: WidgetCommand, prefix: impl Into<String>) -> Self {
        Self {
            command,
            ts: unique_timestamp(),
            prefix: prefix.into(),
        }
    }

    /// Wire record `{action, value|data|event, _ts, _prefix}`.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        let mut record = Map::new();
        record.insert(
            "action".into(),
            Value::String(self.command.action().to_string()),
        );
        self.command.write_fields(&mut record);
        record.insert("_ts".into(), json!(self.ts));
        record.insert("_prefix".into(), Value::String(self.prefix.clone()));
        Value::Object(record)
    }

    /// Parse a wire record received at the HTTP edge.
    ///
    /// A missing `_ts` is stamped now.
    ///
    /// # Errors
    ///
    /// Returns a `BridgeError` when the action is missing, unknown, or its
    /// fields have the wrong shape.
    pub fn from_wire(value: &Value) -> Result<Self, BridgeError> {
        let record = value.as_object().ok_or(BridgeError::MissingAction)?;
        let action = record
            .get("action")
            .and_then(Value::as_str)
            .ok_or(BridgeError::MissingAction)?;
        let command = WidgetCommand::from_record(action, record)?;
        Ok(Self {
            command,
            ts: record
                .get("_ts")
                .and_then(Value::as_f64)
                .unwrap_or_else(unique_timestamp),
            prefix: record
                .get("_prefix")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }
}
