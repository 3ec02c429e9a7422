//! Parsing of `[ACTION:type:data]` tags embedded in bot replies.
//!
//! Tags let a model reply drive the host page: open the widget, show a
//! notification, follow a link. Unknown tag types are ignored.

use lazy_regex::lazy_regex;
use serde::Serialize;
use serde_json::Value;

use crate::bridge::WidgetCommand;

static RE_ACTION_TAG: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"\[ACTION:(\w+):([^\]]*)\]");

/// Action types a reply may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Route the host page to a path
    Navigate,
    /// Widget notification bubble
    Notify,
    /// Open/close the widget
    Toggle,
    /// Hide the widget
    Hide,
    /// Show the widget
    Show,
    /// Open a URL in a new tab
    OpenUrl,
}

impl ActionKind {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "navigate" => Some(Self::Navigate),
            "notify" => Some(Self::Notify),
            "toggle" => Some(Self::Toggle),
            "hide" => Some(Self::Hide),
            "show" => Some(Self::Show),
            "open_url" => Some(Self::OpenUrl),
            _ => None,
        }
    }
}

/// One parsed action tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Action {
    /// Action type
    #[serde(rename = "type")]
    pub kind: ActionKind,
    /// Raw tag data (may be empty)
    pub data: String,
}

impl Action {
    /// Widget command carrying out the action.
    ///
    /// Page routes and URLs have no native widget command and are sent as
    /// raw `emit` events for the host page to handle.
    #[must_use]
    pub fn to_command(&self) -> WidgetCommand {
        match self.kind {
            ActionKind::Navigate => WidgetCommand::Emit {
                event: "navigate".to_string(),
                data: Value::String(self.data.clone()),
            },
            ActionKind::Notify => WidgetCommand::notify(self.data.clone()),
            ActionKind::Toggle => WidgetCommand::Toggle {
                value: match self.data.trim().to_ascii_lowercase().as_str() {
                    "" => None,
                    other => Some(other == "true"),
                },
            },
            ActionKind::Hide => WidgetCommand::Hide,
            ActionKind::Show => WidgetCommand::Show,
            ActionKind::OpenUrl => WidgetCommand::Emit {
                event: "open_url".to_string(),
                data: Value::String(self.data.clone()),
            },
        }
    }
}

/// Extract every valid action tag, in order of appearance.
#[must_use]
pub fn parse_actions(text: &str) -> Vec<Action> {
    RE_ACTION_TAG
        .captures_iter(text)
        .filter_map(|caps| {
            let kind = ActionKind::parse(caps.get(1)?.as_str())?;
            Some(Action {
                kind,
                data: caps.get(2).map_or("", |m| m.as_str()).to_string(),
            })
        })
        .collect()
}

/// Remove all action tags (valid or not) and trim the result.
#[must_use]
pub fn strip_actions(text: &str) -> String {
    RE_ACTION_TAG.replace_all(text, "").trim().to_string()
}
