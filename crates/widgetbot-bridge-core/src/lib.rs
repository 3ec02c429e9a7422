#![deny(missing_docs)]
//! Widgetbot bridge core library.
//!
//! Progress relay, command/event store bridge, generated-content store and
//! the generation API client shared by the transports.

/// `[ACTION:type:data]` tag parsing.
pub mod actions;
/// Widget command/event records and the always-on store bridge.
pub mod bridge;
/// Configuration management.
pub mod config;
/// Generated-content schemas and the in-memory feed store.
pub mod gen;
/// Generation API providers and responders.
pub mod llm;
/// Chat platform collaborator interface.
pub mod platform;
/// Progress events, throttling, tracker and sinks.
pub mod progress;
/// Optional push channel registry.
pub mod transport;
/// Utility functions.
pub mod utils;

/// Recording fakes for tests.
#[cfg(any(test, feature = "testing"))]
pub mod testing;
