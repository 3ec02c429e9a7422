#![deny(missing_docs)]
//! Discord transport for the widgetbot bridge.
//!
//! Signed interactions, chat command interception, the HTTP surface the
//! embedded widget talks to and the REST client used for progress edits.

/// Discord REST client.
pub mod client;
/// Slash command parsing.
pub mod commands;
/// Command handlers.
pub mod handlers;
/// HTTP routes.
pub mod http;
/// Interaction payloads and signature verification.
pub mod interactions;
/// Command relay for both entry paths.
pub mod relay;
/// Server wiring.
pub mod runner;
/// Webhook execution.
pub mod webhook;
