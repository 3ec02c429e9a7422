//! Generation API client
//!
//! A [`GenerationProvider`] produces text (optionally streamed, reporting
//! byte counts to a [`StreamObserver`]) and images. [`GeminiProvider`] is
//! the production implementation; the responders turn raw model output
//! into validated gen responses and action-tagged chat replies.

mod gemini;
mod http_utils;
/// Prompts and response shaping for the chat commands
pub mod responder;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub use gemini::{extract_inline_image, extract_stream_text, GeminiProvider};

use crate::gen::GeneratedImage;

/// Errors that can occur during generation API calls
#[derive(Debug, Error)]
pub enum LlmError {
    /// Error returned by the provider's API
    #[error("API error: {0}")]
    ApiError(String),
    /// Error during network communication
    #[error("Network error: {0}")]
    NetworkError(String),
    /// Error during JSON serialization or deserialization
    #[error("JSON error: {0}")]
    JsonError(String),
    /// Missing provider configuration or API key
    #[error("Missing client/API key: {0}")]
    MissingConfig(String),
    /// Model output did not match the expected schema
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Output format requested from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    /// Free text
    Text,
    /// A single JSON object
    Json,
}

/// Receives byte counts while a response streams in.
#[async_trait]
pub trait StreamObserver: Send + Sync {
    /// Called once per received chunk with its size and the running total.
    async fn on_chunk(&self, chunk_bytes: usize, total_bytes: u64);
}

/// Generation backend.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Generate a response to `prompt` under `system`.
    ///
    /// With an observer the response is streamed and progress reported;
    /// a streaming failure falls back to a single request.
    async fn generate(
        &self,
        system: &str,
        prompt: &str,
        format: ResponseFormat,
        observer: Option<Arc<dyn StreamObserver>>,
    ) -> Result<String, LlmError>;

    /// Generate an image from `prompt`.
    async fn generate_image(&self, prompt: &str) -> Result<GeneratedImage, LlmError>;
}
