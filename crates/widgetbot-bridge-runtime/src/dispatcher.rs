use std::any::Any;
use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

/// How a submitted task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The work ran to completion
    Completed,
    /// The work panicked; carries the panic message
    Panicked(String),
    /// The runtime shut down before the work finished
    Cancelled,
}

/// Acknowledgment for submitted work. Dropping it detaches the task.
#[derive(Debug)]
pub struct TaskTicket {
    id: Uuid,
    label: String,
    handle: JoinHandle<()>,
}

impl TaskTicket {
    /// Task id, also recorded on the task's tracing span.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Label given at submission.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Wait for the task and report how it ended.
    pub async fn join(self) -> TaskOutcome {
        match self.handle.await {
            Ok(()) => TaskOutcome::Completed,
            Err(err) if err.is_panic() => {
                TaskOutcome::Panicked(panic_message(err.into_panic().as_ref()))
            }
            Err(_) => TaskOutcome::Cancelled,
        }
    }
}

/// Message carried by a panic payload.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Runs generation work off the request path.
///
/// Every task is tracked so shutdown can wait for in-flight work. There is
/// no cancellation: once submitted, work runs until it finishes.
#[derive(Clone, Default)]
pub struct TaskDispatcher {
    tracker: TaskTracker,
}

impl TaskDispatcher {
    /// Empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `work` in the background and return immediately.
    pub fn submit<F>(&self, label: impl Into<String>, work: F) -> TaskTicket
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let label = label.into();
        let span = info_span!("task", %id, label = %label);
        debug!(%id, label = %label, "Task submitted");

        let task_label = label.clone();
        let handle = self.tracker.spawn(
            async move {
                work.await;
                debug!(label = %task_label, "Task finished");
            }
            .instrument(span),
        );

        TaskTicket { id, label, handle }
    }

    /// Number of tasks still running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting the dispatcher as idle and wait for in-flight work.
    pub async fn shutdown(&self) {
        let pending = self.tracker.len();
        if pending > 0 {
            info!(pending, "Waiting for in-flight tasks");
        }
        self.tracker.close();
        self.tracker.wait().await;
        info!("Task dispatcher drained");
    }

    /// Stop awaiting `ticket`; a panic in its task is logged by a tracked watcher.
    pub fn detach(&self, ticket: TaskTicket) {
        self.tracker.spawn(async move {
            let label = ticket.label.clone();
            let id = ticket.id;
            if let TaskOutcome::Panicked(message) = ticket.join().await {
                error!(%id, label = %label, panic = %message, "Background task panicked");
            }
        });
    }
}
