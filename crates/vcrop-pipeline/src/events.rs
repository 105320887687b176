//! Notifications for the surrounding UI.

use crate::controller::PipelinePhase;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Something the UI may want to show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipelineEvent {
    PhaseChanged { from: PipelinePhase, to: PipelinePhase },
    /// Encoding progress, 0 to 100.
    Progress(u8),
    /// A recovered problem: dropped frame, fallback configuration, deep queue.
    Warning(String),
    /// The recording finished.
    Done { file_name: String, size: usize },
    /// The attempt failed; the message is shown with a retry affordance.
    Failed(String),
}

/// Sending half of the event stream. Each subscriber gets its own queue and
/// sees only events emitted after it subscribed. With no subscribers, events
/// are dropped.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    subscribers: Arc<Mutex<Vec<Sender<PipelineEvent>>>>,
}

impl EventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: PipelineEvent) {
        let mut subscribers = self.subscribers.lock();
        // Dropped receivers disconnect their sender.
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscribe(&self) -> Receiver<PipelineEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
