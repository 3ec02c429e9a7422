use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::FutureExt;
use tracing::{debug, warn};
use uuid::Uuid;

use super::event::{Phase, ProgressEvent};
use super::sinks::ProgressSink;
use super::throttle::{should_deliver, LastDelivery};
use crate::config::{GENERATING_MAX_PERCENT, GENERATING_MIN_PERCENT, STREAM_SATURATION_BYTES};
use crate::llm::StreamObserver;

struct RegisteredSink {
    sink: Arc<dyn ProgressSink>,
    interval: Duration,
    last: Mutex<Option<LastDelivery>>,
}

impl RegisteredSink {
    /// Apply the throttle and, when it passes, record the delivery.
    fn claim(&self, event: &ProgressEvent, now: Instant) -> bool {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if !should_deliver(event, last.as_ref(), self.interval, now) {
            return false;
        }
        *last = Some(LastDelivery {
            phase: event.phase(),
            at: now,
        });
        true
    }
}

/// Fans progress events out to throttled sinks for one in-flight command.
pub struct ProgressTracker {
    task_id: String,
    sinks: Vec<RegisteredSink>,
    closed: AtomicBool,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    /// Tracker with a fresh task id.
    #[must_use]
    pub fn new() -> Self {
        Self::with_task_id(Uuid::new_v4().to_string())
    }

    /// Tracker reporting under a caller-chosen task id.
    #[must_use]
    pub fn with_task_id(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            sinks: Vec::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Task id stamped on every event.
    #[must_use]
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Number of registered sinks.
    #[must_use]
    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Register a sink throttled at `interval`. Sinks are served in registration order.
    pub fn register(&mut self, sink: Arc<dyn ProgressSink>, interval: Duration) {
        self.sinks.push(RegisteredSink {
            sink,
            interval,
            last: Mutex::new(None),
        });
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>, interval: Duration) -> Self {
        self.register(sink, interval);
        self
    }

    /// Deliver `event` to every sink whose throttle admits it.
    ///
    /// Returns the number of sinks that reported a successful delivery.
    pub async fn report(&self, event: ProgressEvent) -> usize {
        if self.closed.load(Ordering::Acquire) {
            debug!(task_id = %self.task_id, phase = event.phase().as_str(), "Tracker closed, dropping event");
            return 0;
        }

        let mut delivered = 0;
        for registered in &self.sinks {
            if !registered.claim(&event, Instant::now()) {
                continue;
            }

            let name = registered.sink.name();
            match AssertUnwindSafe(registered.sink.deliver(&event))
                .catch_unwind()
                .await
            {
                Ok(true) => delivered += 1,
                Ok(false) => {
                    debug!(task_id = %self.task_id, sink = name, phase = event.phase().as_str(), "Sink skipped event");
                }
                Err(_) => {
                    warn!(task_id = %self.task_id, sink = name, "Progress sink panicked");
                }
            }
        }
        delivered
    }

    /// Report a phase with optional percent and message overrides.
    pub async fn update(
        &self,
        phase: Phase,
        percent: Option<u8>,
        message: Option<String>,
    ) -> usize {
        let mut event = ProgressEvent::new(self.task_id.clone(), phase);
        if let Some(percent) = percent {
            event = event.with_percent(percent);
        }
        if let Some(message) = message {
            event = event.with_message(message);
        }
        self.report(event).await
    }

    /// Stop delivering. Later reports are ignored.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Whether [`close`](Self::close) was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Map a cumulative stream byte count into the generating range.
#[must_use]
pub fn streaming_percent(total_bytes: u64) -> u8 {
    let span = u64::from(GENERATING_MAX_PERCENT - GENERATING_MIN_PERCENT);
    let gained = total_bytes.saturating_mul(span) / STREAM_SATURATION_BYTES;
    let percent = u64::from(GENERATING_MIN_PERCENT).saturating_add(gained);
    u8::try_from(percent.min(u64::from(GENERATING_MAX_PERCENT))).unwrap_or(GENERATING_MAX_PERCENT)
}

#[async_trait]
impl StreamObserver for ProgressTracker {
    async fn on_chunk(&self, _chunk_bytes: usize, total_bytes: u64) {
        let event = ProgressEvent::new(self.task_id.clone(), Phase::Generating)
            .with_percent(streaming_percent(total_bytes))
            .with_bytes(total_bytes);
        self.report(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingSink {
        seen: Mutex<Vec<(Phase, u8)>>,
        fail: bool,
    }

    #[async_trait]
    impl ProgressSink for CountingSink {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn deliver(&self, event: &ProgressEvent) -> bool {
            self.seen
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((event.phase(), event.percent()));
            !self.fail
        }
    }

    struct PanickingSink {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ProgressSink for PanickingSink {
        fn name(&self) -> &'static str {
            "panicking"
        }

        async fn deliver(&self, _event: &ProgressEvent) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            panic!("sink exploded");
        }
    }

    fn seen(sink: &CountingSink) -> Vec<(Phase, u8)> {
        sink.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[test]
    fn streaming_percent_maps_into_generating_range() {
        assert_eq!(streaming_percent(0), 10);
        assert_eq!(streaming_percent(600), 18);
        assert_eq!(streaming_percent(2500), 45);
        assert_eq!(streaming_percent(5000), 80);
        assert_eq!(streaming_percent(u64::MAX), 80);
    }

    #[tokio::test]
    async fn throttles_same_phase_but_passes_transitions() {
        let fast = Arc::new(CountingSink::default());
        let slow = Arc::new(CountingSink::default());
        let tracker = ProgressTracker::with_task_id("t")
            .with_sink(fast.clone(), Duration::ZERO)
            .with_sink(slow.clone(), Duration::from_secs(3600));

        tracker.update(Phase::Analyzing, None, None).await;
        tracker.on_chunk(100, 1000).await;
        tracker.on_chunk(100, 2000).await;
        tracker.update(Phase::Parsing, None, None).await;
        tracker.update(Phase::Complete, None, None).await;

        assert_eq!(seen(&fast).len(), 5);
        assert_eq!(
            seen(&slow),
            vec![
                (Phase::Analyzing, 0),
                (Phase::Generating, 24),
                (Phase::Parsing, 85),
                (Phase::Complete, 100),
            ]
        );
    }

    #[tokio::test]
    async fn failing_and_panicking_sinks_do_not_block_others() {
        let failing = Arc::new(CountingSink {
            fail: true,
            ..CountingSink::default()
        });
        let panicking = Arc::new(PanickingSink {
            calls: AtomicUsize::new(0),
        });
        let healthy = Arc::new(CountingSink::default());

        let tracker = ProgressTracker::new()
            .with_sink(failing.clone(), Duration::ZERO)
            .with_sink(panicking.clone(), Duration::ZERO)
            .with_sink(healthy.clone(), Duration::ZERO);

        let delivered = tracker.update(Phase::Generating, Some(30), None).await;
        assert_eq!(delivered, 1);
        assert_eq!(seen(&failing).len(), 1);
        assert_eq!(panicking.calls.load(Ordering::SeqCst), 1);
        assert_eq!(seen(&healthy), vec![(Phase::Generating, 30)]);

        // A panic does not poison later deliveries.
        tracker.update(Phase::Complete, None, None).await;
        assert_eq!(seen(&healthy).len(), 2);
    }

    #[tokio::test]
    async fn closed_tracker_ignores_reports() {
        let sink = Arc::new(CountingSink::default());
        let tracker = ProgressTracker::new().with_sink(sink.clone(), Duration::ZERO);

        tracker.update(Phase::Analyzing, None, None).await;
        tracker.close();
        assert!(tracker.is_closed());
        assert_eq!(tracker.update(Phase::Complete, None, None).await, 0);
        assert_eq!(seen(&sink).len(), 1);
    }

    #[tokio::test]
    async fn update_overrides_message() {
        let sink = Arc::new(CountingSink::default());
        let tracker = ProgressTracker::new().with_sink(sink.clone(), Duration::ZERO);
        tracker
            .update(Phase::Error, None, Some("Error: boom".to_string()))
            .await;
        assert_eq!(seen(&sink), vec![(Phase::Error, 0)]);
    }
}
