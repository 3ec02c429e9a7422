use std::sync::Arc;

use tracing::debug;

use super::{GenerationProvider, LlmError, ResponseFormat, StreamObserver};
use crate::actions::{parse_actions, strip_actions, Action};
use crate::gen::{GenResponse, RawGenResponse};
use crate::utils::truncate_str;

/// System prompt for plain chat replies with action tags.
pub const CHAT_SYSTEM_PROMPT: &str = "\
You are a helpful Discord bot assistant embedded in a web application.

When your response should trigger an action in the web app, include action tags
using this exact format: [ACTION:type:data]

Available actions:
- [ACTION:navigate:/page-path] -- navigate to a page in the web app
- [ACTION:notify:message text] -- show a notification in the chat widget
- [ACTION:toggle:true] or [ACTION:toggle:false] -- open or close the chat widget
- [ACTION:hide:] -- hide the chat widget entirely
- [ACTION:show:] -- show a hidden chat widget
- [ACTION:open_url:https://example.com] -- open a URL in a new tab

Rules:
- Place action tags at the END of your message, after the human-readable text.
- You can include multiple actions in one response.
- Only use actions when they are relevant to the user's request.
- Always provide a helpful text response alongside any actions.
";

/// System prompt for structured `/gen` output.
pub const GEN_SYSTEM_PROMPT: &str = r##"
You generate structured content cards for a web application.
Given a user prompt, pick the BEST output format and return ONLY a JSON object:

{
  "format": "article" | "code" | "data_table" | "image" | "callout",
  "title": "string (max 80 chars)",
  "color": "#hex color (default #5865F2)",
  "footer": "string or null",
  "article": {"body": "markdown", "summary": "string or null"},
  "code": {"language": "string", "code": "string", "explanation": "string or null", "filename": "string or null"},
  "data_table": {"columns": ["..."], "rows": [["..."]], "caption": "string or null"},
  "image": {"prompt": "detailed image prompt", "caption": "string or null"},
  "callout": {"variant": "info" | "warning" | "tip" | "success" | "danger", "title": "string", "body": "string"}
}

Fill ONLY the field matching `format`; all others must be null.
- article: explanations, tutorials, how-tos
- code: programming tasks, code examples
- data_table: comparisons, feature matrices; every row has one cell per column
- image: drawings, illustrations, "show me what X looks like"
- callout: tips, warnings, short facts
"##;

/// A chat reply with its action tags separated out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextReply {
    /// Display text with tags removed
    pub text: String,
    /// Parsed action tags
    pub actions: Vec<Action>,
    /// Raw model output
    pub raw: String,
}

impl TextReply {
    /// Split raw model output into display text and actions.
    #[must_use]
    pub fn from_raw(raw: String) -> Self {
        Self {
            text: strip_actions(&raw),
            actions: parse_actions(&raw),
            raw,
        }
    }
}

/// Ask for a plain reply to `question`.
///
/// # Errors
///
/// Propagates provider errors.
pub async fn generate_text_response(
    provider: &dyn GenerationProvider,
    question: &str,
    observer: Option<Arc<dyn StreamObserver>>,
) -> Result<TextReply, LlmError> {
    let raw = provider
        .generate(CHAT_SYSTEM_PROMPT, question, ResponseFormat::Text, observer)
        .await?;
    Ok(TextReply::from_raw(raw))
}

/// Ask for a structured card for `prompt` and validate it.
///
/// # Errors
///
/// Returns `JsonError` when the output is not JSON, `ValidationError` when
/// it does not match the gen schema, or a provider error.
pub async fn generate_gen_response(
    provider: &dyn GenerationProvider,
    prompt: &str,
    observer: Option<Arc<dyn StreamObserver>>,
) -> Result<GenResponse, LlmError> {
    let raw = provider
        .generate(GEN_SYSTEM_PROMPT, prompt, ResponseFormat::Json, observer)
        .await?;
    parse_gen_response(&raw)
}

/// Parse and validate model output as a gen response.
///
/// Markdown code fences around the JSON are tolerated.
///
/// # Errors
///
/// Returns `JsonError` or `ValidationError`.
pub fn parse_gen_response(raw: &str) -> Result<GenResponse, LlmError> {
    let json = strip_code_fences(raw);
    let loose: RawGenResponse = serde_json::from_str(json).map_err(|e| {
        LlmError::JsonError(format!("{e}. Raw: {}", truncate_str(raw, 300)))
    })?;
    let response =
        GenResponse::try_from(loose).map_err(|e| LlmError::ValidationError(e.to_string()))?;
    debug!(format = response.content.format(), "Gen response validated");
    Ok(response)
}

fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
