//! Utility functions for text truncation, number formatting, timestamps and retries.

use anyhow::Result;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::warn;

use crate::config::{
    DISCORD_API_INITIAL_BACKOFF_MS, DISCORD_API_MAX_BACKOFF_MS, DISCORD_API_MAX_RETRIES,
};

/// Truncate a string to at most `max_chars` characters (Unicode-safe).
#[must_use]
pub fn truncate_str(s: impl AsRef<str>, max_chars: usize) -> String {
    let s = s.as_ref();
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.char_indices()
        .nth(max_chars)
        .map_or_else(|| s.to_string(), |(pos, _)| s[..pos].to_string())
}

/// Format an integer with `,` thousands separators.
///
/// ```
/// use widgetbot_bridge_core::utils::format_thousands;
/// assert_eq!(format_thousands(1200), "1,200");
/// assert_eq!(format_thousands(600), "600");
/// ```
#[must_use]
pub fn format_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

static LAST_TS_MICROS: AtomicI64 = AtomicI64::new(0);

/// Strictly increasing wall-clock timestamp in seconds.
///
/// Two calls never return the same value, even within the same microsecond,
/// so records stamped with it are never collapsed by change detection.
#[must_use]
pub fn unique_timestamp() -> f64 {
    let now = chrono::Utc::now().timestamp_micros();
    let mut prev = LAST_TS_MICROS.load(Ordering::Relaxed);
    loop {
        let next = now.max(prev + 1);
        match LAST_TS_MICROS.compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed)
        {
            Ok(_) => {
                #[allow(clippy::cast_precision_loss)]
                return next as f64 / 1_000_000.0;
            }
            Err(actual) => prev = actual,
        }
    }
}

/// Retry a chat-platform API operation with exponential backoff and jitter.
///
/// Used for deletes; cosmetic progress edits never go through here.
///
/// # Errors
///
/// Returns the last error once all attempts are exhausted.
pub async fn retry_transport_operation<F, Fut, T>(operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    retry_transport_operation_if(operation, |_: &anyhow::Error| true).await
}

/// Like [`retry_transport_operation`], but only errors accepted by
/// `retryable` are attempted again; any other error is returned at once.
///
/// # Errors
///
/// Returns the first non-retryable error, or the last error once all
/// attempts are exhausted.
pub async fn retry_transport_operation_if<F, Fut, T, C>(operation: F, retryable: C) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
    C: FnMut(&anyhow::Error) -> bool,
{
    let retry_strategy = ExponentialBackoff::from_millis(DISCORD_API_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(DISCORD_API_MAX_BACKOFF_MS))
        .map(jitter)
        .take(DISCORD_API_MAX_RETRIES);

    RetryIf::spawn(retry_strategy, operation, retryable)
        .await
        .map_err(|e| {
            warn!(
                "Transport operation failed (up to {} retries): {}",
                DISCORD_API_MAX_RETRIES, e
            );
            e
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_truncate_str_unicode() {
        let s = "Привет, мир!";
        assert_eq!(truncate_str(s, 6), "Привет");
        assert_eq!(truncate_str(s, 50), "Привет, мир!");
    }

    #[test]
    fn thousands_grouping() {
        assert_eq!(format_thousands(0), "0");
        assert_eq!(format_thousands(999), "999");
        assert_eq!(format_thousands(1000), "1,000");
        assert_eq!(format_thousands(1_234_567), "1,234,567");
    }

    #[test]
    fn timestamps_strictly_increase() {
        let mut last = unique_timestamp();
        for _ in 0..1000 {
            let next = unique_timestamp();
            assert!(next > last);
            last = next;
        }
    }

    #[tokio::test]
    async fn retry_recovers_from_transient_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let result = retry_transport_operation(|| {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    anyhow::bail!("connection reset");
                }
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.ok(), Some(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rejected_errors_are_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let result: Result<()> = retry_transport_operation_if(
            || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    anyhow::bail!("request timed out")
                }
            },
            |e: &anyhow::Error| e.to_string().contains("refused"),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
