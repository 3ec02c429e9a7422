use std::time::{Duration, Instant};

use super::event::{Phase, ProgressEvent};

/// What a sink last received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastDelivery {
    /// Phase of the last delivered event
    pub phase: Phase,
    /// When it was delivered
    pub at: Instant,
}

/// Decide whether `event` may be delivered to a sink throttled at `interval`.
///
/// Delivers when the sink has received nothing yet, when the event is
/// terminal, when the phase changed, or when the window has elapsed.
#[must_use]
pub fn should_deliver(
    event: &ProgressEvent,
    last: Option<&LastDelivery>,
    interval: Duration,
    now: Instant,
) -> bool {
    let Some(last) = last else {
        return true;
    };
    if event.is_terminal() || event.phase() != last.phase {
        return true;
    }
    now.saturating_duration_since(last.at) >= interval
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(3000);

    fn last(phase: Phase, at: Instant) -> LastDelivery {
        LastDelivery { phase, at }
    }

    #[test]
    fn first_event_always_delivered() {
        let event = ProgressEvent::new("t", Phase::Generating);
        assert!(should_deliver(&event, None, WINDOW, Instant::now()));
    }

    #[test]
    fn same_phase_inside_window_is_dropped() {
        let start = Instant::now();
        let event = ProgressEvent::new("t", Phase::Generating).with_percent(45);
        let prev = last(Phase::Generating, start);
        assert!(!should_deliver(
            &event,
            Some(&prev),
            WINDOW,
            start + Duration::from_millis(100)
        ));
    }

    #[test]
    fn same_phase_after_window_is_delivered() {
        let start = Instant::now();
        let event = ProgressEvent::new("t", Phase::Generating).with_percent(60);
        let prev = last(Phase::Generating, start);
        assert!(should_deliver(&event, Some(&prev), WINDOW, start + WINDOW));
    }

    #[test]
    fn phase_transition_bypasses_window() {
        let start = Instant::now();
        let event = ProgressEvent::new("t", Phase::Parsing);
        let prev = last(Phase::Generating, start);
        assert!(should_deliver(&event, Some(&prev), WINDOW, start));
    }

    #[test]
    fn terminal_event_bypasses_window() {
        let start = Instant::now();
        let prev = last(Phase::Complete, start);
        let repeat = ProgressEvent::new("t", Phase::Complete);
        assert!(should_deliver(&repeat, Some(&prev), WINDOW, start));

        let prev = last(Phase::Generating, start);
        let full = ProgressEvent::new("t", Phase::Generating).with_percent(100);
        assert!(should_deliver(&full, Some(&prev), WINDOW, start));
    }
}
