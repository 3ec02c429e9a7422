use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::utils::format_thousands;

/// Coarse stage of a generation command, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Prompt received, nothing generated yet
    Analyzing,
    /// Model output is streaming in (10-80%)
    Generating,
    /// Model output is being parsed and validated
    Parsing,
    /// Image generation for image-format results
    CreatingImage,
    /// Result is being posted back to the chat
    Posting,
    /// Finished
    Complete,
    /// Failed; terminal like `Complete`
    Error,
}

impl Phase {
    /// Default percentage reported when entering the phase.
    #[must_use]
    pub const fn default_percent(self) -> u8 {
        match self {
            Self::Analyzing | Self::Error => 0,
            Self::Generating => 10,
            Self::Parsing => 85,
            Self::CreatingImage => 90,
            Self::Posting => 95,
            Self::Complete => 100,
        }
    }

    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Analyzing => "Analyzing prompt...",
            Self::Generating => "Generating AI response...",
            Self::Parsing => "Parsing response...",
            Self::CreatingImage => "Creating image...",
            Self::Posting => "Posting to channel...",
            Self::Complete => "Complete",
            Self::Error => "Error",
        }
    }

    /// Wire name (`creating_image`, ...).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Analyzing => "analyzing",
            Self::Generating => "generating",
            Self::Parsing => "parsing",
            Self::CreatingImage => "creating_image",
            Self::Posting => "posting",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

/// One point-in-time progress update. Never mutated after construction;
/// the builder methods consume and return a new value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    task_id: String,
    phase: Phase,
    percent: u8,
    message: String,
    bytes_received: Option<u64>,
    timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    /// Create an event at the phase's default percentage with its label as message.
    #[must_use]
    pub fn new(task_id: impl Into<String>, phase: Phase) -> Self {
        Self {
            task_id: task_id.into(),
            phase,
            percent: phase.default_percent(),
            message: phase.label().to_string(),
            bytes_received: None,
            timestamp: Utc::now(),
        }
    }

    /// Override the percentage (clamped to 100).
    #[must_use]
    pub fn with_percent(mut self, percent: u8) -> Self {
        self.percent = percent.min(100);
        self
    }

    /// Override the free-text message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Attach a received-bytes counter.
    #[must_use]
    pub fn with_bytes(mut self, bytes: u64) -> Self {
        self.bytes_received = Some(bytes);
        self
    }

    /// Task the event belongs to.
    #[must_use]
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Phase of the event.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Percentage 0..=100.
    #[must_use]
    pub const fn percent(&self) -> u8 {
        self.percent
    }

    /// Free-text message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Bytes received so far, if reported.
    #[must_use]
    pub const fn bytes_received(&self) -> Option<u64> {
        self.bytes_received
    }

    /// Creation time.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// True for the event that ends an operation.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.percent >= 100 || matches!(self.phase, Phase::Complete | Phase::Error)
    }

    /// Render a fixed-width text progress bar for chat messages.
    ///
    /// ```
    /// use widgetbot_bridge_core::progress::{Phase, ProgressEvent};
    ///
    /// let event = ProgressEvent::new("t", Phase::Generating)
    ///     .with_percent(80)
    ///     .with_message("Generating AI response...")
    ///     .with_bytes(1200);
    /// assert_eq!(
    ///     event.render_bar(),
    ///     "[████████░░] 80% Generating AI response... (1,200 bytes received)"
    /// );
    /// ```
    #[must_use]
    pub fn render_bar(&self) -> String {
        // Half-to-even keeps 45% at four cells and 95% at ten.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let filled = (f64::from(self.percent) / 10.0).round_ties_even() as usize;
        let filled = filled.min(10);
        let bar = format!("{}{}", "█".repeat(filled), "░".repeat(10 - filled));
        let suffix = self
            .bytes_received
            .map(|b| format!(" ({} bytes received)", format_thousands(b)))
            .unwrap_or_default();
        format!("[{bar}] {}% {}{suffix}", self.percent, self.message)
    }

    /// Plain record used for push payloads.
    #[must_use]
    pub fn to_record(&self) -> Value {
        json!({
            "task_id": self.task_id,
            "phase": self.phase.as_str(),
            "percent": self.percent,
            "message": self.message,
            "bytes_received": self.bytes_received,
            "timestamp": self.timestamp.to_rfc3339(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_phase() {
        let event = ProgressEvent::new("t1", Phase::Parsing);
        assert_eq!(event.percent(), 85);
        assert_eq!(event.message(), "Parsing response...");
        assert_eq!(event.bytes_received(), None);
        assert!(!event.is_terminal());
        assert!(ProgressEvent::new("t1", Phase::Complete).is_terminal());
        assert!(ProgressEvent::new("t1", Phase::Error).is_terminal());
    }

    #[test]
    fn percent_is_clamped() {
        let event = ProgressEvent::new("t1", Phase::Generating).with_percent(250);
        assert_eq!(event.percent(), 100);
    }

    #[test]
    fn render_bar_with_bytes() {
        let event = ProgressEvent::new("t1", Phase::Generating)
            .with_percent(45)
            .with_bytes(600);
        insta::assert_snapshot!(
            event.render_bar(),
            @"[████░░░░░░] 45% Generating AI response... (600 bytes received)"
        );
    }

    #[test]
    fn render_bar_without_bytes() {
        let event = ProgressEvent::new("t1", Phase::Complete);
        assert_eq!(event.render_bar(), "[██████████] 100% Complete");

        let event = ProgressEvent::new("t1", Phase::Analyzing);
        assert_eq!(event.render_bar(), "[░░░░░░░░░░] 0% Analyzing prompt...");
    }

    #[test]
    fn record_uses_wire_phase_names() {
        let record = ProgressEvent::new("t9", Phase::CreatingImage).to_record();
        assert_eq!(record["phase"], "creating_image");
        assert_eq!(record["percent"], 90);
        assert_eq!(record["task_id"], "t9");
        assert!(record["bytes_received"].is_null());
    }
}
