//! Real-time progress tracking for long-running generation commands.
//!
//! A [`ProgressTracker`] fans [`ProgressEvent`] values out to registered
//! [`ProgressSink`]s, each with its own throttle window. Phase transitions
//! and the terminal event always pass the throttle.

mod event;
mod sinks;
mod throttle;
mod tracker;

pub use event::{Phase, ProgressEvent};
pub use sinks::{ChannelMessageSink, EphemeralSink, ProgressSink, PushSink, ToastSink};
pub use throttle::{should_deliver, LastDelivery};
pub use tracker::{streaming_percent, ProgressTracker};
