//! Configuration and settings management
//!
//! Loads settings from config files and environment variables and defines
//! relay constants (throttle windows, API endpoints, timeouts).

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bridge settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BridgeSettings {
    /// Discord bot token used for channel message edits
    pub discord_bot_token: Option<String>,
    /// Discord application ID (interaction follow-ups)
    pub discord_application_id: Option<String>,
    /// Hex-encoded Ed25519 public key of the Discord application
    pub discord_public_key: Option<String>,
    /// Default webhook URL for outbound webhook messages
    pub discord_webhook_url: Option<String>,

    /// Gemini API key for text generation
    pub gemini_api_key: Option<String>,
    /// Gemini text model
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
    /// Separate Gemini API key for image generation (falls back to `gemini_api_key`)
    pub gemini_image_api_key: Option<String>,
    /// Gemini image model
    #[serde(default = "default_gemini_image_model")]
    pub gemini_image_model: String,
    /// Enable Google Search grounding on generation requests
    #[serde(default = "default_true")]
    pub gemini_search_grounding: bool,

    /// Address the HTTP surface binds to
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Install the server-push channel at startup
    #[serde(default = "default_true")]
    pub push_enabled: bool,

    /// Server id of the embedded widget (reported by `/status`)
    #[serde(default)]
    pub widgetbot_server: String,
    /// Channel id of the embedded widget (reported by `/status`)
    #[serde(default)]
    pub widgetbot_channel: String,

    /// Override for the channel-message sink throttle (ms)
    pub channel_sink_interval_ms: Option<u64>,
    /// Override for the push sink throttle (ms)
    pub push_sink_interval_ms: Option<u64>,
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_gemini_image_model() -> String {
    "gemini-2.0-flash-exp-image-generation".to_string()
}

const fn default_true() -> bool {
    true
}

fn default_bind_addr() -> String {
    "0.0.0.0:8150".to_string()
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            discord_bot_token: None,
            discord_application_id: None,
            discord_public_key: None,
            discord_webhook_url: None,
            gemini_api_key: None,
            gemini_model: default_gemini_model(),
            gemini_image_api_key: None,
            gemini_image_model: default_gemini_image_model(),
            gemini_search_grounding: true,
            bind_addr: default_bind_addr(),
            push_enabled: true,
            widgetbot_server: String::new(),
            widgetbot_channel: String::new(),
            channel_sink_interval_ms: None,
            push_sink_interval_ms: None,
        }
    }
}

/// Build the layered configuration source.
///
/// # Errors
///
/// Returns a `ConfigError` if a source fails to load.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Not checked into git
        .add_source(File::with_name("config/local").required(false))
        // Eg. `APP__BIND_ADDR=127.0.0.1:9000`
        .add_source(Environment::with_prefix("APP").separator("__"))
        // UPPER_SNAKE_CASE env vars map onto snake_case fields; empty means unset
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

impl BridgeSettings {
    /// Create new settings by loading from environment and files
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        build_config()?.try_deserialize()
    }

    /// API key for image generation, preferring the dedicated image key.
    #[must_use]
    pub fn image_api_key(&self) -> Option<&str> {
        self.gemini_image_api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .or_else(|| self.gemini_api_key.as_deref().filter(|k| !k.is_empty()))
    }

    /// Whether the interactions endpoint can be served.
    #[must_use]
    pub fn interactions_enabled(&self) -> bool {
        self.discord_public_key.as_deref().is_some_and(|k| !k.is_empty())
            && self
                .discord_application_id
                .as_deref()
                .is_some_and(|id| !id.is_empty())
    }

    /// Throttle window for channel-message progress edits.
    #[must_use]
    pub fn channel_sink_interval(&self) -> Duration {
        self.channel_sink_interval_ms
            .map_or(CHANNEL_SINK_INTERVAL, Duration::from_millis)
    }

    /// Throttle window for push-channel progress emits.
    #[must_use]
    pub fn push_sink_interval(&self) -> Duration {
        self.push_sink_interval_ms
            .map_or(PUSH_SINK_INTERVAL, Duration::from_millis)
    }
}

// Progress sinks
/// Minimum interval between channel-message edits
pub const CHANNEL_SINK_INTERVAL: Duration = Duration::from_secs(3);
/// Minimum interval between ephemeral `@original` patches
pub const EPHEMERAL_SINK_INTERVAL: Duration = Duration::from_secs(3);
/// Minimum interval between push-channel progress emits
pub const PUSH_SINK_INTERVAL: Duration = Duration::from_millis(500);
/// Minimum interval between toast notifications
pub const TOAST_SINK_INTERVAL: Duration = Duration::from_secs(5);
/// How long a progress toast stays visible on the widget button (ms)
pub const TOAST_TIMEOUT_MS: u64 = 4000;

// Streaming progress mapping
/// Byte count at which streaming progress saturates
pub const STREAM_SATURATION_BYTES: u64 = 5000;
/// Lower bound of the generating phase (percent)
pub const GENERATING_MIN_PERCENT: u8 = 10;
/// Upper bound of the generating phase (percent)
pub const GENERATING_MAX_PERCENT: u8 = 80;

// Discord API
/// Discord REST API base URL
pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";
/// Timeout for cosmetic progress edits (seconds)
pub const DISCORD_PROGRESS_TIMEOUT_SECS: u64 = 5;
/// Timeout for regular Discord API calls (seconds)
pub const DISCORD_API_TIMEOUT_SECS: u64 = 15;
/// Maximum retries for non-cosmetic Discord API calls
pub const DISCORD_API_MAX_RETRIES: usize = 2;
/// Initial backoff for Discord API retries (ms)
pub const DISCORD_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Maximum backoff for Discord API retries (ms)
pub const DISCORD_API_MAX_BACKOFF_MS: u64 = 4000;
/// Discord message content limit
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;

// Generation API
/// Gemini REST API base URL
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
/// Timeout for text generation requests (seconds)
pub const LLM_HTTP_TIMEOUT_SECS: u64 = 60;
/// Timeout for image generation requests (seconds)
pub const IMAGE_HTTP_TIMEOUT_SECS: u64 = 60;

// Push / poll
/// Capacity of the push broadcast buffer
pub const PUSH_CHANNEL_CAPACITY: usize = 256;
/// Interval clients use for the poll fallback (ms)
pub const POLL_INTERVAL_MS: u64 = 2000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_key_falls_back_to_text_key() {
        let mut settings = BridgeSettings {
            gemini_api_key: Some("text-key".to_string()),
            ..BridgeSettings::default()
        };
        assert_eq!(settings.image_api_key(), Some("text-key"));

        settings.gemini_image_api_key = Some(String::new());
        assert_eq!(settings.image_api_key(), Some("text-key"));

        settings.gemini_image_api_key = Some("image-key".to_string());
        assert_eq!(settings.image_api_key(), Some("image-key"));
    }

    #[test]
    fn interactions_require_key_and_app_id() {
        let mut settings = BridgeSettings {
            discord_public_key: Some("abcd".to_string()),
            ..BridgeSettings::default()
        };
        assert!(!settings.interactions_enabled());

        settings.discord_application_id = Some("42".to_string());
        assert!(settings.interactions_enabled());
    }

    #[test]
    fn throttle_overrides() {
        let settings = BridgeSettings {
            channel_sink_interval_ms: Some(100),
            ..BridgeSettings::default()
        };
        assert_eq!(settings.channel_sink_interval(), Duration::from_millis(100));
        assert_eq!(settings.push_sink_interval(), PUSH_SINK_INTERVAL);
    }
}
