//! Lifecycle event fan-out.
//!
//! Events are best-effort: publishing never blocks or fails the path that
//! produced them, and an absence of subscribers is not an error.

use armada_id::{AgentId, AppId, TaskId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::model::TaskState;

/// Events observable by subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchedulerEvent {
    /// A task's master-reported state changed.
    TaskStatusChanged {
        task_id: TaskId,
        app_id: AppId,
        state: TaskState,
        message: String,
    },

    /// An executor sent a framework-level message.
    FrameworkMessage {
        agent: AgentId,
        executor_id: String,
        payload: Vec<u8>,
    },
}

/// Broadcast-backed event bus.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SchedulerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publishes an event to all current subscribers.
    pub fn post(&self, event: SchedulerEvent) {
        // send only errors when there are no receivers
        if self.tx.send(event).is_err() {
            trace!("No event subscribers");
        }
    }

    /// Registers a new subscriber.
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
