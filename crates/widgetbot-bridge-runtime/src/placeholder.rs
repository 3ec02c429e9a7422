use std::future::Future;
use std::panic::AssertUnwindSafe;

use anyhow::anyhow;
use futures_util::FutureExt;
use tracing::{debug, warn};
use widgetbot_bridge_core::platform::ChatPlatform;

use crate::dispatcher::panic_message;

/// Run `work` while a loading placeholder is visible in `channel_id`.
///
/// The placeholder is deleted exactly once after `work` settles, whether it
/// succeeded, failed or panicked. A panic is returned as an error. If the
/// placeholder cannot be posted, `work` still runs and receives `None`.
///
/// # Errors
///
/// Returns the error produced by `work`, or an error describing its panic.
pub async fn with_placeholder<T, F, Fut>(
    platform: &dyn ChatPlatform,
    channel_id: &str,
    text: &str,
    work: F,
) -> anyhow::Result<T>
where
    F: FnOnce(Option<String>) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let message_id = match platform.post_message(channel_id, text).await {
        Ok(id) => {
            debug!(channel_id, message_id = %id, "Placeholder posted");
            Some(id)
        }
        Err(e) => {
            warn!(channel_id, error = %e, "Failed to post placeholder");
            None
        }
    };

    let outcome = AssertUnwindSafe(work(message_id.clone()))
        .catch_unwind()
        .await;

    if let Some(id) = message_id {
        if let Err(e) = platform.delete_message(channel_id, &id).await {
            warn!(channel_id, message_id = %id, error = %e, "Failed to delete placeholder");
        }
    }

    match outcome {
        Ok(result) => result,
        Err(payload) => Err(anyhow!("Handler panicked: {}", panic_message(payload.as_ref()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use widgetbot_bridge_core::platform::{MockChatPlatform, PlatformError};
    use widgetbot_bridge_core::testing::{PlatformCall, RecordingPlatform};

    #[tokio::test]
    async fn placeholder_removed_after_success() {
        let platform = RecordingPlatform::default();
        let result = with_placeholder(&platform, "c1", "Loading...", |id| async move {
            Ok(id.unwrap_or_default())
        })
        .await;

        assert_eq!(result.ok().as_deref(), Some("msg-1"));
        assert_eq!(
            platform.calls(),
            vec![
                PlatformCall::Post {
                    channel: "c1".to_string(),
                    content: "Loading...".to_string(),
                },
                PlatformCall::Delete {
                    channel: "c1".to_string(),
                    message: "msg-1".to_string(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn placeholder_removed_once_after_error() {
        let platform = RecordingPlatform::default();
        let result: anyhow::Result<()> =
            with_placeholder(&platform, "c1", "Loading...", |_| async {
                Err(anyhow!("quota exceeded"))
            })
            .await;

        assert!(result.is_err_and(|e| e.to_string() == "quota exceeded"));
        assert_eq!(platform.delete_count(), 1);
    }

    #[tokio::test]
    async fn panic_becomes_error_and_placeholder_is_removed() {
        let platform = RecordingPlatform::default();
        let result: anyhow::Result<()> =
            with_placeholder(&platform, "c1", "Loading...", |_| async {
                panic!("handler blew up");
            })
            .await;

        let message = result.err().map(|e| e.to_string()).unwrap_or_default();
        assert_eq!(message, "Handler panicked: handler blew up");
        assert_eq!(platform.post_count(), 1);
        assert_eq!(platform.delete_count(), 1);
    }

    #[tokio::test]
    async fn post_failure_still_runs_work() {
        let mut platform = MockChatPlatform::new();
        platform
            .expect_post_message()
            .times(1)
            .returning(|_, _| Err(PlatformError::Network("timeout".to_string())));
        platform.expect_delete_message().times(0);

        let result = with_placeholder(&platform, "c1", "Loading...", |id| async move {
            Ok(id.is_none())
        })
        .await;
        assert!(result.is_ok_and(|ran_without_id| ran_without_id));
    }
}
