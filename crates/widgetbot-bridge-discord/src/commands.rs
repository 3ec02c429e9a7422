//! Slash commands and the chat-side interception parser.
//!
//! Both entry paths produce a [`CommandInvocation`]: the native interaction
//! path through [`CommandInvocation::from_interaction`], the embedded chat
//! through [`parse_chat_command`].

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::interactions::Interaction;

/// Errors turning user input into an invocation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    /// A required option was empty or absent
    #[error("/{command} needs a {option}")]
    MissingOption {
        /// Command name
        command: &'static str,
        /// Option name
        option: &'static str,
    },
    /// No such command
    #[error("Unknown command: `/{0}`")]
    UnknownCommand(String),
}

/// Commands the relay understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlashCommand {
    /// Free-form AI chat
    Ai,
    /// AI question
    Ask,
    /// Structured content generation
    Gen,
    /// Host page navigation
    Navigate,
    /// Bridge status
    Status,
}

impl SlashCommand {
    /// Every command.
    pub const ALL: [Self; 5] = [Self::Ai, Self::Ask, Self::Gen, Self::Navigate, Self::Status];

    /// Name without the slash.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ai => "ai",
            Self::Ask => "ask",
            Self::Gen => "gen",
            Self::Navigate => "navigate",
            Self::Status => "status",
        }
    }

    /// Name of the command's single option.
    #[must_use]
    pub const fn option_name(self) -> Option<&'static str> {
        match self {
            Self::Ai | Self::Ask => Some("question"),
            Self::Gen => Some("prompt"),
            Self::Navigate => Some("path"),
            Self::Status => None,
        }
    }

    /// Whether the option must be supplied.
    #[must_use]
    pub const fn option_required(self) -> bool {
        matches!(self, Self::Ai | Self::Ask | Self::Gen)
    }
}

impl fmt::Display for SlashCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.name())
    }
}

impl FromStr for SlashCommand {
    type Err = CommandParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().trim_start_matches('/').to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.name() == name)
            .ok_or(CommandParseError::UnknownCommand(name))
    }
}

/// A command ready to hand to its handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    /// Which command
    pub command: SlashCommand,
    /// Option value, trimmed; `None` when absent or empty
    pub option: Option<String>,
    /// Display name of the invoking user
    pub author: String,
}

impl CommandInvocation {
    /// Validate that a required option is present.
    ///
    /// # Errors
    ///
    /// Returns `MissingOption` when the command needs an option and has none.
    pub fn new(
        command: SlashCommand,
        option: Option<String>,
        author: impl Into<String>,
    ) -> Result<Self, CommandParseError> {
        let option = option
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty());
        if option.is_none() && command.option_required() {
            return Err(CommandParseError::MissingOption {
                command: command.name(),
                option: command.option_name().unwrap_or("value"),
            });
        }
        Ok(Self {
            command,
            option,
            author: author.into(),
        })
    }

    /// Build from a native application-command interaction.
    ///
    /// # Errors
    ///
    /// Returns `UnknownCommand` or `MissingOption`.
    pub fn from_interaction(interaction: &Interaction) -> Result<Self, CommandParseError> {
        let name = interaction
            .data
            .as_ref()
            .map(|d| d.name.as_str())
            .unwrap_or_default();
        let command: SlashCommand = name.parse()?;
        let option = command
            .option_name()
            .and_then(|option| interaction.option(option));
        Self::new(command, option, interaction.author_name())
    }

    /// Option text, or `""`.
    #[must_use]
    pub fn option_text(&self) -> &str {
        self.option.as_deref().unwrap_or_default()
    }
}

/// Parse chat text typed into the embedded widget.
///
/// Returns `Ok(None)` for text that is not one of the relay's commands,
/// including unknown `/word` text, which continues as a normal message.
///
/// # Errors
///
/// Returns `MissingOption` for a recognized command without its option.
pub fn parse_chat_command(
    text: &str,
    author: &str,
) -> Result<Option<CommandInvocation>, CommandParseError> {
    let Some(body) = text.trim().strip_prefix('/') else {
        return Ok(None);
    };
    let (word, rest) = body
        .split_once(char::is_whitespace)
        .unwrap_or((body, ""));
    let Ok(command) = word.parse::<SlashCommand>() else {
        return Ok(None);
    };
    CommandInvocation::new(command, Some(rest.to_string()), author).map(Some)
}
