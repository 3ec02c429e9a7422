#![deny(missing_docs)]
//! Widgetbot bridge runtime helpers.
//!
//! Background execution for long-running generation commands and the
//! placeholder guard that keeps chat channels clean.

/// Background task dispatcher.
pub mod dispatcher;
/// Placeholder message guard.
pub mod placeholder;

pub use dispatcher::{panic_message, TaskDispatcher, TaskOutcome, TaskTicket};
pub use placeholder::with_placeholder;
