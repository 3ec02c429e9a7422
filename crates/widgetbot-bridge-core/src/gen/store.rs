use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use super::schema::GenResponse;
use crate::transport::{Namespace, TransportRegistry, EVENT_GEN_ENTRY};

/// Binary image produced by the image model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    /// Raw image bytes
    pub bytes: Bytes,
    /// MIME type, e.g. `image/png`
    pub mime: String,
}

/// One finished `/gen` result. Never mutated once stored.
#[derive(Debug, Clone, PartialEq)]
pub struct GenEntry {
    /// Unique id
    pub id: Uuid,
    /// Prompt as typed by the user
    pub prompt: String,
    /// Validated response, absent when generation failed
    pub response: Option<GenResponse>,
    /// Generated image, fetched out of band
    pub image: Option<GeneratedImage>,
    /// Chat user who asked
    pub author: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Failure description
    pub error: Option<String>,
}

impl GenEntry {
    /// Successful entry.
    #[must_use]
    pub fn new(prompt: impl Into<String>, response: GenResponse, author: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            prompt: prompt.into(),
            response: Some(response),
            image: None,
            author: author.into(),
            created_at: Utc::now(),
            error: None,
        }
    }

    /// Failed entry.
    #[must_use]
    pub fn failed(
        prompt: impl Into<String>,
        error: impl Into<String>,
        author: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            prompt: prompt.into(),
            response: None,
            image: None,
            author: author.into(),
            created_at: Utc::now(),
            error: Some(error.into()),
        }
    }

    /// Attach the generated image.
    #[must_use]
    pub fn with_image(mut self, image: GeneratedImage) -> Self {
        self.image = Some(image);
        self
    }

    /// Serializable view without image bytes.
    #[must_use]
    pub fn payload(&self) -> GenEntryPayload {
        GenEntryPayload {
            id: self.id,
            prompt: self.prompt.clone(),
            response: self.response.clone(),
            has_image: self.image.is_some(),
            image_mime: self.image.as_ref().map(|i| i.mime.clone()),
            author: self.author.clone(),
            created_at: self.created_at,
            error: self.error.clone(),
        }
    }
}

/// Push and poll view of a [`GenEntry`]. Image bytes are served separately.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenEntryPayload {
    /// Entry id
    pub id: Uuid,
    /// Prompt
    pub prompt: String,
    /// Validated response
    pub response: Option<GenResponse>,
    /// Whether an image can be fetched for this entry
    pub has_image: bool,
    /// MIME type of that image
    pub image_mime: Option<String>,
    /// Chat user who asked
    pub author: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Failure description
    pub error: Option<String>,
}

/// Append-only in-memory feed of gen entries.
pub struct GenStore {
    entries: Mutex<Vec<Arc<GenEntry>>>,
    registry: Arc<TransportRegistry>,
}

impl GenStore {
    /// Empty store notifying through `registry`.
    #[must_use]
    pub fn new(registry: Arc<TransportRegistry>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            registry,
        }
    }

    /// Append `entry` and notify push listeners. Returns the stored entry.
    pub fn add(&self, entry: GenEntry) -> Arc<GenEntry> {
        let entry = Arc::new(entry);
        let position = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries.push(entry.clone());
            entries.len()
        };

        let payload = serde_json::to_value(entry.payload()).unwrap_or_default();
        let pushed = self.registry.emit(Namespace::Gen, EVENT_GEN_ENTRY, payload);
        debug!(id = %entry.id, position, pushed, "Gen entry stored");
        entry
    }

    /// All entries in insertion order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<GenEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Entries added after the first `cursor` entries.
    #[must_use]
    pub fn list_since(&self, cursor: usize) -> Vec<Arc<GenEntry>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(cursor..).map(<[_]>::to_vec).unwrap_or_default()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn count(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Entry with `id`.
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<Arc<GenEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|entry| entry.id == id)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gen::{ArticleContent, GenContent};

    fn response() -> GenResponse {
        GenResponse {
            title: "Decorators".into(),
            color: "#5865F2".into(),
            footer: None,
            content: GenContent::Article(ArticleContent {
                body: "...".into(),
                summary: None,
            }),
        }
    }

    #[test]
    fn cursor_reads() {
        let store = GenStore::new(Arc::new(TransportRegistry::new(false)));
        let first = store.add(GenEntry::new("a", response(), "ada"));
        let second = store.add(GenEntry::failed("b", "boom", "ada"));

        assert_eq!(store.count(), 2);
        assert_eq!(store.list_since(0).len(), 2);
        assert_eq!(store.list_since(1).first().map(|e| e.id), Some(second.id));
        assert!(store.list_since(2).is_empty());
        assert!(store.list_since(99).is_empty());
        assert_eq!(store.get(first.id).map(|e| e.prompt.clone()), Some("a".into()));
        assert!(store.get(Uuid::new_v4()).is_none());
    }

    #[test]
    fn payload_omits_bytes() {
        let entry = GenEntry::new("cat", response(), "ada").with_image(GeneratedImage {
            bytes: Bytes::from_static(b"\x89PNG"),
            mime: "image/png".into(),
        });
        let value = serde_json::to_value(entry.payload()).unwrap_or_default();
        assert_eq!(value["has_image"], true);
        assert_eq!(value["image_mime"], "image/png");
        assert!(value.get("image").is_none());
        assert!(value.get("bytes").is_none());
    }
}
