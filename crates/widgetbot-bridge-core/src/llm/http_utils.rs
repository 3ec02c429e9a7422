//! HTTP helpers shared by generation providers.

use std::time::Duration;

use reqwest::Client as HttpClient;
use serde_json::Value;

use super::LlmError;
use crate::utils::truncate_str;

/// HTTP client with the given request timeout.
#[must_use]
pub fn create_http_client(timeout_secs: u64) -> HttpClient {
    HttpClient::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_else(|_| HttpClient::new())
}

/// Turn a non-success response into an `ApiError` with a readable message.
pub async fn error_from_response(response: reqwest::Response) -> LlmError {
    let status = response.status();
    let error_text = response.text().await.unwrap_or_default();

    // Proxies answer with HTML pages
    let trimmed = error_text.trim_start();
    let is_html = trimmed.starts_with("<!DOCTYPE")
        || trimmed.starts_with("<html")
        || trimmed.starts_with("<HTML");

    if is_html {
        LlmError::ApiError(format!("{status} (Server returned HTML error page)"))
    } else {
        LlmError::ApiError(format!("{status} - {}", truncate_str(&error_text, 300)))
    }
}

/// POST `body` as JSON and parse the JSON response.
///
/// # Errors
///
/// Returns `NetworkError` on connectivity issues, `ApiError` on non-success
/// status codes, or `JsonError` if parsing fails.
pub async fn send_json_request(
    client: &HttpClient,
    url: &str,
    body: &Value,
) -> Result<Value, LlmError> {
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| LlmError::NetworkError(e.without_url().to_string()))?;

    if !response.status().is_success() {
        return Err(error_from_response(response).await);
    }

    response
        .json()
        .await
        .map_err(|e| LlmError::JsonError(e.to_string()))
}
