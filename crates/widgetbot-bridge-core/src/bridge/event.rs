use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::store::StoreKind;

/// Message author as reported by the widget.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// Display name
    #[serde(default)]
    pub username: String,
    /// User id
    #[serde(default)]
    pub id: String,
    /// Avatar hash or URL
    #[serde(default)]
    pub avatar: String,
}

/// Body of a chat message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBody {
    /// Message text
    #[serde(default)]
    pub content: String,
    /// Author, when known
    #[serde(default)]
    pub author: Option<Author>,
}

/// Channel reference attached to events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    /// Channel id
    #[serde(default)]
    pub id: String,
    /// Channel name
    #[serde(default)]
    pub name: String,
}

/// Signed-in user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Display name
    #[serde(default)]
    pub username: String,
    /// User id
    #[serde(default)]
    pub id: String,
    /// Avatar URL
    #[serde(default, rename = "avatarUrl")]
    pub avatar_url: String,
    /// Login provider
    #[serde(default)]
    pub provider: String,
}

/// An event raised by the embedded widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WidgetEvent {
    /// Widget finished loading
    Ready,
    /// A chat message was received
    Message {
        /// Message body
        #[serde(default)]
        message: MessageBody,
        /// Channel it arrived in
        #[serde(default)]
        channel: Option<ChannelRef>,
    },
    /// User signed in
    SignIn(UserProfile),
    /// User was already signed in when the widget loaded
    AlreadySignedIn(UserProfile),
    /// User signed out
    SignOut,
    /// The local user sent a message
    SentMessage {
        /// Message text
        #[serde(default)]
        content: String,
        /// Channel
        #[serde(default)]
        channel: Option<ChannelRef>,
    },
    /// A message was deleted
    MessageDelete {
        /// Deleted message id
        #[serde(default)]
        id: String,
        /// Channel
        #[serde(default)]
        channel: Option<ChannelRef>,
    },
    /// Several messages were deleted
    MessageDeleteBulk {
        /// Deleted message ids
        #[serde(default)]
        ids: Vec<String>,
        /// Channel
        #[serde(default)]
        channel: Option<ChannelRef>,
    },
    /// A message was edited
    MessageUpdate {
        /// Updated message
        #[serde(default)]
        message: Value,
        /// Channel
        #[serde(default)]
        channel: Option<ChannelRef>,
    },
    /// Unread counter changed
    UnreadCountUpdate {
        /// New count
        #[serde(default)]
        count: u64,
    },
    /// A direct message arrived
    DirectMessage {
        /// The message
        #[serde(default)]
        message: Value,
    },
    /// The widget asked the host page to start a login
    LoginRequested,
}

fn channel_id(channel: Option<&ChannelRef>) -> &str {
    channel.map_or("", |c| c.id.as_str())
}

impl WidgetEvent {
    /// Store the event is written to.
    #[must_use]
    pub const fn category(&self) -> StoreKind {
        match self {
            Self::Ready => StoreKind::Status,
            Self::Message { .. } => StoreKind::Message,
            Self::SignIn(_) | Self::AlreadySignedIn(_) | Self::SignOut => StoreKind::User,
            Self::SentMessage { .. }
            | Self::MessageDelete { .. }
            | Self::MessageDeleteBulk { .. }
            | Self::MessageUpdate { .. }
            | Self::UnreadCountUpdate { .. }
            | Self::DirectMessage { .. }
            | Self::LoginRequested => StoreKind::Event,
        }
    }

    /// Wire name of the event, as sent in its `type` field.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Message { .. } => "message",
            Self::SignIn(_) => "signIn",
            Self::AlreadySignedIn(_) => "alreadySignedIn",
            Self::SignOut => "signOut",
            Self::SentMessage { .. } => "sentMessage",
            Self::MessageDelete { .. } => "messageDelete",
            Self::MessageDeleteBulk { .. } => "messageDeleteBulk",
            Self::MessageUpdate { .. } => "messageUpdate",
            Self::UnreadCountUpdate { .. } => "unreadCountUpdate",
            Self::DirectMessage { .. } => "directMessage",
            Self::LoginRequested => "loginRequested",
        }
    }

    /// Flat store payload, stamped with `timestamp_ms`. Always carries `type`.
    #[must_use]
    pub fn normalize(&self, timestamp_ms: i64) -> Value {
        let kind = self.type_name();
        match self {
            Self::Ready => json!({
                "type": kind,
                "initialized": true,
                "open": false,
                "_ts": timestamp_ms,
            }),
            Self::Message { message, channel } => {
                let author = message.author.as_ref().map_or_else(
                    || json!({}),
                    |a| json!({ "username": a.username, "id": a.id, "avatar": a.avatar }),
                );
                json!({
                    "type": kind,
                    "content": message.content,
                    "author": author,
                    "channel": channel.as_ref().map_or("", |c| c.name.as_str()),
                    "channel_id": channel_id(channel.as_ref()),
                    "timestamp": timestamp_ms,
                    "_ts": timestamp_ms,
                })
            }
            Self::SignIn(user) | Self::AlreadySignedIn(user) => json!({
                "type": kind,
                "username": user.username,
                "id": user.id,
                "avatar": user.avatar_url,
                "provider": user.provider,
                "signed_in": true,
                "_ts": timestamp_ms,
            }),
            Self::SignOut => json!({ "type": kind, "signed_in": false, "_ts": timestamp_ms }),
            Self::SentMessage { content, channel } => json!({
                "type": kind,
                "content": content,
                "channel_id": channel_id(channel.as_ref()),
                "channel_name": channel.as_ref().map_or("", |c| c.name.as_str()),
                "timestamp": timestamp_ms,
                "_ts": timestamp_ms,
            }),
            Self::MessageDelete { id, channel } => json!({
                "type": kind,
                "message_id": id,
                "channel": channel_id(channel.as_ref()),
                "timestamp": timestamp_ms,
                "_ts": timestamp_ms,
            }),
            Self::MessageDeleteBulk { ids, channel } => json!({
                "type": kind,
                "ids": ids,
                "channel": channel_id(channel.as_ref()),
                "timestamp": timestamp_ms,
                "_ts": timestamp_ms,
            }),
            Self::MessageUpdate { message, channel } => json!({
                "type": kind,
                "message": message,
                "channel": channel_id(channel.as_ref()),
                "timestamp": timestamp_ms,
                "_ts": timestamp_ms,
            }),
            Self::UnreadCountUpdate { count } => json!({
                "type": kind,
                "count": count,
                "timestamp": timestamp_ms,
                "_ts": timestamp_ms,
            }),
            Self::DirectMessage { message } => json!({
                "type": kind,
                "message": message,
                "timestamp": timestamp_ms,
                "_ts": timestamp_ms,
            }),
            Self::LoginRequested => json!({
                "type": kind,
                "timestamp": timestamp_ms,
                "_ts": timestamp_ms,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(value: Value) -> WidgetEvent {
        match serde_json::from_value(value) {
            Ok(event) => event,
            Err(err) => panic!("unparseable event: {err}"),
        }
    }

    #[test]
    fn categories() {
        assert_eq!(parse(json!({"type": "ready"})).category(), StoreKind::Status);
        assert_eq!(
            parse(json!({"type": "message", "message": {"content": "hi"}})).category(),
            StoreKind::Message
        );
        assert_eq!(
            parse(json!({"type": "signIn", "username": "ada", "avatarUrl": "a.png"})).category(),
            StoreKind::User
        );
        assert_eq!(parse(json!({"type": "signOut"})).category(), StoreKind::User);
        assert_eq!(
            parse(json!({"type": "messageDeleteBulk", "ids": ["1", "2"]})).category(),
            StoreKind::Event
        );
        assert_eq!(parse(json!({"type": "loginRequested"})).category(), StoreKind::Event);
    }

    #[test]
    fn normalized_message() {
        let event = parse(json!({
            "type": "message",
            "message": {"content": "hello", "author": {"username": "ada", "id": "7"}},
            "channel": {"id": "c1", "name": "general"}
        }));
        assert_eq!(
            event.normalize(1000),
            json!({
                "type": "message",
                "content": "hello",
                "author": {"username": "ada", "id": "7", "avatar": ""},
                "channel": "general",
                "channel_id": "c1",
                "timestamp": 1000,
                "_ts": 1000
            })
        );
    }

    #[test]
    fn normalized_sign_in() {
        let event = parse(json!({"type": "alreadySignedIn", "username": "ada", "avatarUrl": "a.png", "provider": "discord"}));
        let payload = event.normalize(5);
        assert_eq!(payload["type"], "alreadySignedIn");
        assert_eq!(payload["avatar"], "a.png");
        assert_eq!(payload["signed_in"], true);
    }

    #[test]
    fn every_payload_names_its_event() {
        let raw = [
            json!({"type": "ready"}),
            json!({"type": "message", "message": {"content": "hi"}}),
            json!({"type": "signIn", "username": "ada"}),
            json!({"type": "alreadySignedIn", "username": "ada"}),
            json!({"type": "signOut"}),
            json!({"type": "sentMessage", "content": "hi"}),
            json!({"type": "messageDelete", "id": "1"}),
            json!({"type": "messageDeleteBulk", "ids": ["1"]}),
            json!({"type": "messageUpdate", "message": {}}),
            json!({"type": "unreadCountUpdate", "count": 2}),
            json!({"type": "directMessage", "message": {}}),
            json!({"type": "loginRequested"}),
        ];
        for value in raw {
            let expected = value["type"].clone();
            let payload = parse(value).normalize(9);
            assert_eq!(payload["type"], expected);
            assert_eq!(payload["_ts"], 9);
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(serde_json::from_value::<WidgetEvent>(json!({"type": "explode"})).is_err());
    }
}
