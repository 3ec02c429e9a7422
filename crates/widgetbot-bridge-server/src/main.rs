use dotenvy::dotenv;
use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};
use widgetbot_bridge_core::config::BridgeSettings;
use widgetbot_bridge_discord::runner::run_server;

/// Regex patterns for redacting sensitive data
struct RedactionPatterns {
    bot_header: Regex,
    bot_token: Regex,
    webhook: Regex,
    interaction: Regex,
    gemini_key: Regex,
    env_secret: Regex,
}

impl RedactionPatterns {
    /// Initialize all regex patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            bot_header: Regex::new(r"(Bot )[A-Za-z0-9_.-]{20,}")?,
            bot_token: Regex::new(r"[MN][A-Za-z0-9_-]{23,25}\.[A-Za-z0-9_-]{6}\.[A-Za-z0-9_-]{27,38}")?,
            webhook: Regex::new(r"(/api(?:/v\d+)?/webhooks/[0-9]+/)[A-Za-z0-9_-]+")?,
            interaction: Regex::new(r"(/webhooks/[0-9]+/)[A-Za-z0-9_.-]{40,}(/messages)")?,
            gemini_key: Regex::new(r"([?&]key=)[A-Za-z0-9_-]+")?,
            env_secret: Regex::new(
                r"((?:DISCORD_BOT_TOKEN|DISCORD_WEBHOOK_URL|GEMINI_API_KEY|GEMINI_IMAGE_API_KEY)=)[^\s&]+",
            )?,
        })
    }

    fn redact(&self, input: &str) -> String {
        let mut output = input.to_string();
        output = self
            .bot_header
            .replace_all(&output, "${1}[DISCORD_TOKEN]")
            .to_string();
        output = self
            .bot_token
            .replace_all(&output, "[DISCORD_TOKEN]")
            .to_string();
        output = self
            .interaction
            .replace_all(&output, "${1}[INTERACTION_TOKEN]${2}")
            .to_string();
        output = self
            .webhook
            .replace_all(&output, "${1}[WEBHOOK_TOKEN]")
            .to_string();
        output = self
            .gemini_key
            .replace_all(&output, "${1}[MASKED]")
            .to_string();
        output = self
            .env_secret
            .replace_all(&output, "${1}[MASKED]")
            .to_string();
        output
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> RedactingWriter<W> {
    const fn new(inner: W, patterns: Arc<RedactionPatterns>) -> Self {
        Self { inner, patterns }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.patterns.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // The caller's buffer was consumed in full even if the redacted text is shorter.
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<F> RedactingMakeWriter<F> {
    const fn new(make_inner: F, patterns: Arc<RedactionPatterns>) -> Self {
        Self {
            make_inner,
            patterns,
        }
    }
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new((self.make_inner)(), self.patterns.clone())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    // Compiled before logging so nothing is ever written unredacted
    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);

    init_logging(patterns);

    info!("Starting widgetbot bridge v{}...", env!("CARGO_PKG_VERSION"));

    let settings = init_settings();

    if let Err(e) = run_server(settings).await {
        error!("Bridge server failed: {e:#}");
        std::process::exit(1);
    }

    Ok(())
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter::new(io::stderr, patterns);

    let debug_mode = std::env::var("DEBUG_MODE")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);

    let filter = if debug_mode {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "widgetbot_bridge_core=info,widgetbot_bridge_runtime=info,widgetbot_bridge_discord=info,widgetbot_bridge_server=info,hyper=warn,h2=error,reqwest=warn,tokio=warn,tower=warn,axum=warn",
            )
        })
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn init_settings() -> Arc<BridgeSettings> {
    let settings = match BridgeSettings::new() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load bridge configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        bind_addr = %settings.bind_addr,
        push = settings.push_enabled,
        interactions = settings.interactions_enabled(),
        "Configuration loaded successfully."
    );
    Arc::new(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> RedactionPatterns {
        match RedactionPatterns::new() {
            Ok(patterns) => patterns,
            Err(e) => panic!("invalid pattern: {e}"),
        }
    }

    #[test]
    fn masks_authorization_header() {
        let line = r#"headers: {"authorization": "Bot MTA5ODc2NTQzMjEwOTg3NjU0.GhIjKl.abcdefghijklmnopqrstuvwxyz0123"}"#;
        let redacted = patterns().redact(line);
        assert!(redacted.contains("Bot [DISCORD_TOKEN]"), "{redacted}");
        assert!(!redacted.contains("GhIjKl"));
    }

    #[test]
    fn masks_bare_bot_token() {
        let redacted =
            patterns().redact("token=MTA5ODc2NTQzMjEwOTg3NjU0.GhIjKl.abcdefghijklmnopqrstuvwxyz0123 loaded");
        assert_eq!(redacted, "token=[DISCORD_TOKEN] loaded");
    }

    #[test]
    fn masks_webhook_and_interaction_tokens() {
        let patterns = patterns();
        assert_eq!(
            patterns.redact("POST https://discord.com/api/v10/webhooks/123456/abcDEF-ghi_jkl?wait=true"),
            "POST https://discord.com/api/v10/webhooks/123456/[WEBHOOK_TOKEN]?wait=true"
        );

        let token = "a".repeat(64);
        let url = format!("PATCH https://discord.com/api/v10/webhooks/42/{token}/messages/@original");
        assert_eq!(
            patterns.redact(&url),
            "PATCH https://discord.com/api/v10/webhooks/42/[INTERACTION_TOKEN]/messages/@original"
        );
    }

    #[test]
    fn masks_gemini_key_and_env_secrets() {
        let patterns = patterns();
        assert_eq!(
            patterns.redact("GET /v1beta/models/x:generateContent?alt=sse&key=AIzaSyABC123"),
            "GET /v1beta/models/x:generateContent?alt=sse&key=[MASKED]"
        );
        assert_eq!(
            patterns.redact("GEMINI_API_KEY=secret DEBUG_MODE=1"),
            "GEMINI_API_KEY=[MASKED] DEBUG_MODE=1"
        );
    }

    #[test]
    fn leaves_plain_text_alone() {
        let line = "Gen entry stored id=7 format=image";
        assert_eq!(patterns().redact(line), line);
    }

    #[test]
    fn writer_reports_full_length() {
        let mut buf = Vec::new();
        let input = b"GEMINI_API_KEY=secret\n";
        {
            let mut writer = RedactingWriter::new(&mut buf, Arc::new(patterns()));
            assert!(matches!(writer.write(input), Ok(n) if n == input.len()));
        }
        assert_eq!(String::from_utf8_lossy(&buf), "GEMINI_API_KEY=[MASKED]\n");
    }
}
