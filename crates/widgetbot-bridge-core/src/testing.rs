//! Testing helpers and recording fakes.
//!
//! The fakes record every call so tests can assert on the exact sequence of
//! side effects a relay run produced.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

use crate::gen::GeneratedImage;
use crate::llm::{GenerationProvider, LlmError, ResponseFormat, StreamObserver};
use crate::platform::{ChatPlatform, PlatformError};
use crate::transport::{Namespace, PushChannel, PushFrame};

/// One call made against a [`RecordingPlatform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    /// `post_message(channel, content)`
    Post {
        /// Channel id
        channel: String,
        /// Content
        content: String,
    },
    /// `edit_message(channel, message, content)`
    Edit {
        /// Channel id
        channel: String,
        /// Message id
        message: String,
        /// Content
        content: String,
    },
    /// `delete_message(channel, message)`
    Delete {
        /// Channel id
        channel: String,
        /// Message id
        message: String,
    },
    /// `patch_original(token, content)`
    Patch {
        /// Interaction token
        token: String,
        /// Content
        content: String,
    },
}

/// Chat platform that records calls and always succeeds, unless told to fail edits.
#[derive(Default)]
pub struct RecordingPlatform {
    calls: Mutex<Vec<PlatformCall>>,
    fail_edits: bool,
}

impl RecordingPlatform {
    /// Platform whose edits fail as if the message had been deleted.
    #[must_use]
    pub fn failing_edits() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_edits: true,
        }
    }

    /// Every call so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<PlatformCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of posts so far.
    #[must_use]
    pub fn post_count(&self) -> usize {
        self.count(|c| matches!(c, PlatformCall::Post { .. }))
    }

    /// Number of deletes so far.
    #[must_use]
    pub fn delete_count(&self) -> usize {
        self.count(|c| matches!(c, PlatformCall::Delete { .. }))
    }

    fn count(&self, pred: impl Fn(&PlatformCall) -> bool) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| pred(c))
            .count()
    }

    fn record(&self, call: PlatformCall) -> usize {
        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        calls.push(call);
        calls.len()
    }
}

#[async_trait]
impl ChatPlatform for RecordingPlatform {
    async fn post_message(&self, channel_id: &str, content: &str) -> Result<String, PlatformError> {
        let n = self.record(PlatformCall::Post {
            channel: channel_id.to_string(),
            content: content.to_string(),
        });
        Ok(format!("msg-{n}"))
    }

    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<(), PlatformError> {
        self.record(PlatformCall::Edit {
            channel: channel_id.to_string(),
            message: message_id.to_string(),
            content: content.to_string(),
        });
        if self.fail_edits {
            return Err(PlatformError::NotFound("Unknown Message".to_string()));
        }
        Ok(())
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), PlatformError> {
        self.record(PlatformCall::Delete {
            channel: channel_id.to_string(),
            message: message_id.to_string(),
        });
        Ok(())
    }

    async fn patch_original(
        &self,
        interaction_token: &str,
        content: &str,
    ) -> Result<(), PlatformError> {
        self.record(PlatformCall::Patch {
            token: interaction_token.to_string(),
            content: content.to_string(),
        });
        Ok(())
    }
}

/// Push channel that keeps every frame.
#[derive(Default)]
pub struct RecordingPush {
    frames: Mutex<Vec<PushFrame>>,
}

impl RecordingPush {
    /// Frames emitted so far.
    #[must_use]
    pub fn frames(&self) -> Vec<PushFrame> {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Frames named `event`.
    #[must_use]
    pub fn frames_named(&self, event: &str) -> Vec<PushFrame> {
        self.frames()
            .into_iter()
            .filter(|f| f.event == event)
            .collect()
    }
}

impl PushChannel for RecordingPush {
    fn emit(&self, namespace: Namespace, event: &str, payload: Value) -> bool {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(PushFrame {
                namespace,
                event: event.to_string(),
                payload,
            });
        true
    }
}

/// Provider replaying a fixed response in chunks, reporting each to the observer.
pub struct ScriptedProvider {
    chunks: Vec<String>,
    image: Option<GeneratedImage>,
    error: Option<String>,
}

impl ScriptedProvider {
    /// Provider answering with `chunks` concatenated.
    #[must_use]
    pub fn new<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
            image: None,
            error: None,
        }
    }

    /// Provider whose every call fails with `message`.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            chunks: Vec::new(),
            image: None,
            error: Some(message.into()),
        }
    }

    /// Also answer image requests with a small PNG stub.
    #[must_use]
    pub fn with_image(mut self) -> Self {
        self.image = Some(GeneratedImage {
            bytes: Bytes::from_static(b"\x89PNG\r\n\x1a\n"),
            mime: "image/png".to_string(),
        });
        self
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    async fn generate(
        &self,
        _system: &str,
        _prompt: &str,
        _format: ResponseFormat,
        observer: Option<Arc<dyn StreamObserver>>,
    ) -> Result<String, LlmError> {
        if let Some(error) = &self.error {
            return Err(LlmError::ApiError(error.clone()));
        }
        let mut total: u64 = 0;
        for chunk in &self.chunks {
            total += chunk.len() as u64;
            if let Some(observer) = &observer {
                observer.on_chunk(chunk.len(), total).await;
            }
        }
        Ok(self.chunks.concat())
    }

    async fn generate_image(&self, _prompt: &str) -> Result<GeneratedImage, LlmError> {
        if let Some(error) = &self.error {
            return Err(LlmError::ApiError(error.clone()));
        }
        self.image
            .clone()
            .ok_or_else(|| LlmError::MissingConfig("No image API key configured".to_string()))
    }
}
