use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bytes::Bytes;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use reqwest::Client as HttpClient;
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use super::http_utils::{create_http_client, error_from_response, send_json_request};
use super::{GenerationProvider, LlmError, ResponseFormat, StreamObserver};
use crate::config::{BridgeSettings, GEMINI_API_BASE, IMAGE_HTTP_TIMEOUT_SECS, LLM_HTTP_TIMEOUT_SECS};
use crate::gen::GeneratedImage;

/// Generation provider backed by the Gemini REST API
pub struct GeminiProvider {
    http_client: HttpClient,
    image_http_client: HttpClient,
    api_key: Option<String>,
    model: String,
    image_api_key: Option<String>,
    image_model: String,
    search_grounding: bool,
    base_url: String,
}

impl GeminiProvider {
    /// Provider configured from settings.
    #[must_use]
    pub fn new(settings: &BridgeSettings) -> Self {
        Self {
            http_client: create_http_client(LLM_HTTP_TIMEOUT_SECS),
            image_http_client: create_http_client(IMAGE_HTTP_TIMEOUT_SECS),
            api_key: settings.gemini_api_key.clone().filter(|k| !k.is_empty()),
            model: settings.gemini_model.clone(),
            image_api_key: settings.image_api_key().map(str::to_string),
            image_model: settings.gemini_image_model.clone(),
            search_grounding: settings.gemini_search_grounding,
            base_url: GEMINI_API_BASE.to_string(),
        }
    }

    /// Point the provider at another API root.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn text_key(&self) -> Result<&str, LlmError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| LlmError::MissingConfig("GEMINI_API_KEY is not set".to_string()))
    }

    fn request_body(&self, system: &str, prompt: &str, format: ResponseFormat) -> Value {
        let mut body = json!({
            "contents": [{
                "role": "user",
                "parts": [{"text": prompt}]
            }],
            "system_instruction": {
                "parts": [{"text": system}]
            }
        });
        if format == ResponseFormat::Json {
            body["generationConfig"] = json!({ "responseMimeType": "application/json" });
        }
        if self.search_grounding {
            body["tools"] = json!([{ "google_search": {} }]);
        }
        body
    }

    async fn generate_once(&self, body: &Value) -> Result<String, LlmError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url,
            self.model,
            self.text_key()?
        );
        let response = send_json_request(&self.http_client, &url, body).await?;
        let text = extract_stream_text(&response);
        if text.is_empty() {
            return Err(LlmError::ApiError("Empty response".to_string()));
        }
        Ok(text)
    }

    async fn generate_streamed(
        &self,
        body: &Value,
        observer: &dyn StreamObserver,
    ) -> Result<String, LlmError> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url,
            self.model,
            self.text_key()?
        );
        let response = self
            .http_client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.without_url().to_string()))?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let mut stream = response.bytes_stream().eventsource();
        let mut text = String::new();
        let mut total_bytes: u64 = 0;

        while let Some(event) = stream.next().await {
            let event = event.map_err(|e| LlmError::NetworkError(format!("SSE stream error: {e}")))?;
            if event.data.trim().is_empty() {
                continue;
            }
            let chunk: Value = serde_json::from_str(&event.data)
                .map_err(|e| LlmError::JsonError(format!("Failed to parse event data: {e}")))?;
            let chunk_text = extract_stream_text(&chunk);
            if chunk_text.is_empty() {
                continue;
            }
            total_bytes = total_bytes.saturating_add(chunk_text.len() as u64);
            text.push_str(&chunk_text);
            observer.on_chunk(chunk_text.len(), total_bytes).await;
        }

        if text.is_empty() {
            return Err(LlmError::ApiError("Empty streamed response".to_string()));
        }
        Ok(text)
    }
}

#[async_trait]
impl GenerationProvider for GeminiProvider {
    #[instrument(skip(self, system, prompt, observer), fields(model = %self.model))]
    async fn generate(
        &self,
        system: &str,
        prompt: &str,
        format: ResponseFormat,
        observer: Option<Arc<dyn StreamObserver>>,
    ) -> Result<String, LlmError> {
        let body = self.request_body(system, prompt, format);

        let Some(observer) = observer else {
            return self.generate_once(&body).await;
        };

        match self.generate_streamed(&body, observer.as_ref()).await {
            Ok(text) => Ok(text),
            Err(LlmError::MissingConfig(msg)) => Err(LlmError::MissingConfig(msg)),
            Err(e) => {
                warn!(error = %e, "Streaming failed, falling back to non-streaming");
                self.generate_once(&body).await
            }
        }
    }

    #[instrument(skip(self, prompt), fields(model = %self.image_model))]
    async fn generate_image(&self, prompt: &str) -> Result<GeneratedImage, LlmError> {
        let key = self
            .image_api_key
            .as_deref()
            .ok_or_else(|| LlmError::MissingConfig("No image API key configured".to_string()))?;
        let url = format!(
            "{}/models/{}:generateContent?key={key}",
            self.base_url, self.image_model
        );
        let body = json!({
            "contents": [{"parts": [{"text": prompt}]}],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"]
            }
        });

        let response = send_json_request(&self.image_http_client, &url, &body).await?;
        let image = extract_inline_image(&response)?;
        debug!(mime = %image.mime, size = image.bytes.len(), "Image generated");
        Ok(image)
    }
}

/// Concatenated text parts of the first candidate of a response or stream chunk.
#[must_use]
pub fn extract_stream_text(response: &Value) -> String {
    response
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default()
}

/// Decode the first inline image of a response.
///
/// # Errors
///
/// Returns `ApiError` when the response carries no image, `JsonError` when
/// the payload is not valid base64.
pub fn extract_inline_image(response: &Value) -> Result<GeneratedImage, LlmError> {
    let parts = response
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .ok_or_else(|| LlmError::ApiError("No candidates returned".to_string()))?;

    let inline = parts
        .iter()
        .find_map(|part| part.get("inlineData").or_else(|| part.get("inline_data")))
        .ok_or_else(|| LlmError::ApiError("No image data in response".to_string()))?;

    let data = inline
        .get("data")
        .and_then(Value::as_str)
        .ok_or_else(|| LlmError::ApiError("Inline data without payload".to_string()))?;
    let bytes = BASE64
        .decode(data)
        .map_err(|e| LlmError::JsonError(format!("Invalid image payload: {e}")))?;
    let mime = inline
        .get("mimeType")
        .or_else(|| inline.get("mime_type"))
        .and_then(Value::as_str)
        .unwrap_or("image/png")
        .to_string();

    Ok(GeneratedImage {
        bytes: Bytes::from(bytes),
        mime,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::http::{StatusCode, Uri};
    use axum::response::IntoResponse;
    use axum::{Json, Router};
    use tokio::net::TcpListener;

    #[derive(Default)]
    struct Hits {
        streamed: AtomicUsize,
        unary: AtomicUsize,
    }

    struct CountingObserver(AtomicUsize);

    #[async_trait]
    impl StreamObserver for CountingObserver {
        async fn on_chunk(&self, _chunk_bytes: usize, _total_bytes: u64) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Local Gemini stand-in whose streaming endpoint always fails.
    async fn broken_stream_api(hits: Arc<Hits>) -> String {
        let app = Router::new().fallback(move |uri: Uri| {
            let hits = hits.clone();
            async move {
                if uri.path().ends_with(":streamGenerateContent") {
                    hits.streamed.fetch_add(1, Ordering::SeqCst);
                    return (StatusCode::INTERNAL_SERVER_ERROR, "stream down").into_response();
                }
                hits.unary.fetch_add(1, Ordering::SeqCst);
                Json(json!({
                    "candidates": [{"content": {"parts": [{"text": "hello"}]}}]
                }))
                .into_response()
            }
        });
        let listener = match TcpListener::bind("127.0.0.1:0").await {
            Ok(listener) => listener,
            Err(e) => panic!("bind failed: {e}"),
        };
        let addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => panic!("no local addr: {e}"),
        };
        tokio::spawn(async move { axum::serve(listener, app).await });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn failed_stream_falls_back_to_single_request() {
        let hits = Arc::new(Hits::default());
        let provider = GeminiProvider::new(&BridgeSettings {
            gemini_api_key: Some("k".to_string()),
            ..BridgeSettings::default()
        })
        .with_base_url(broken_stream_api(hits.clone()).await);
        let observer = Arc::new(CountingObserver(AtomicUsize::new(0)));

        let result = provider
            .generate("sys", "hi", ResponseFormat::Text, Some(observer.clone()))
            .await;

        assert_eq!(result.ok().as_deref(), Some("hello"));
        assert_eq!(hits.streamed.load(Ordering::SeqCst), 1);
        assert_eq!(hits.unary.load(Ordering::SeqCst), 1);
        assert_eq!(observer.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_key_does_not_fall_back() {
        let hits = Arc::new(Hits::default());
        let provider = GeminiProvider::new(&BridgeSettings::default())
            .with_base_url(broken_stream_api(hits.clone()).await);
        let observer: Arc<dyn StreamObserver> = Arc::new(CountingObserver(AtomicUsize::new(0)));

        let result = provider
            .generate("sys", "hi", ResponseFormat::Text, Some(observer))
            .await;

        assert!(matches!(result, Err(LlmError::MissingConfig(_))));
        assert_eq!(hits.streamed.load(Ordering::SeqCst), 0);
        assert_eq!(hits.unary.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn joins_text_parts() {
        let chunk = json!({
            "candidates": [{"content": {"parts": [{"text": "Hel"}, {"text": "lo"}]}}]
        });
        assert_eq!(extract_stream_text(&chunk), "Hello");
        assert_eq!(extract_stream_text(&json!({"candidates": []})), "");
    }

    #[test]
    fn decodes_inline_image() {
        let response = json!({
            "candidates": [{"content": {"parts": [
                {"text": "here you go"},
                {"inlineData": {"mimeType": "image/jpeg", "data": BASE64.encode(b"jpegbytes")}}
            ]}}]
        });
        let image = extract_inline_image(&response);
        assert!(matches!(
            image,
            Ok(GeneratedImage { ref bytes, ref mime }) if bytes.as_ref() == b"jpegbytes" && mime == "image/jpeg"
        ));
    }

    #[test]
    fn snake_case_inline_data_defaults_to_png() {
        let response = json!({
            "candidates": [{"content": {"parts": [{"inline_data": {"data": BASE64.encode(b"x")}}]}}]
        });
        assert_eq!(
            extract_inline_image(&response).map(|i| i.mime).ok().as_deref(),
            Some("image/png")
        );
    }

    #[test]
    fn missing_image_is_an_error() {
        let response = json!({"candidates": [{"content": {"parts": [{"text": "sorry"}]}}]});
        assert!(matches!(
            extract_inline_image(&response),
            Err(LlmError::ApiError(msg)) if msg == "No image data in response"
        ));
    }

    #[test]
    fn request_body_options() {
        let settings = BridgeSettings {
            gemini_search_grounding: false,
            ..BridgeSettings::default()
        };
        let provider = GeminiProvider::new(&settings);
        let body = provider.request_body("sys", "hi", ResponseFormat::Json);
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert!(body.get("tools").is_none());
        assert_eq!(body["system_instruction"]["parts"][0]["text"], "sys");

        let grounded = GeminiProvider::new(&BridgeSettings::default());
        let body = grounded.request_body("sys", "hi", ResponseFormat::Text);
        assert!(body.get("generationConfig").is_none());
        assert!(body["tools"][0].get("google_search").is_some());
    }

    #[tokio::test]
    async fn missing_key_is_reported_without_network() {
        let provider = GeminiProvider::new(&BridgeSettings::default());
        let result = provider
            .generate("sys", "hi", ResponseFormat::Text, None)
            .await;
        assert!(matches!(result, Err(LlmError::MissingConfig(_))));
        assert!(matches!(
            provider.generate_image("cat").await,
            Err(LlmError::MissingConfig(_))
        ));
    }
}
