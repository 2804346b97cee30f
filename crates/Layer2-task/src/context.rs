//! Stage context
//!
//! The per-task view the orchestrator hands to a spawned stage: the store to
//! submit deltas through, the bus to publish the resulting events on, and the
//! task's cancellation flag. Stages own no task state of their own.

use crate::event::TaskEventBus;
use crate::stage::FailureReason;
use crate::store::{TaskDelta, TaskStore};
use crate::task::{TaskId, TaskRecord};
use biopilot_foundation::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Store + bus + cancellation flag for one task's stage
#[derive(Clone)]
pub struct StageContext {
    store: Arc<TaskStore>,
    bus: Arc<TaskEventBus>,
    cancelled: Arc<AtomicBool>,
}

impl StageContext {
    pub fn new(store: Arc<TaskStore>, bus: Arc<TaskEventBus>, cancelled: Arc<AtomicBool>) -> Self {
        Self {
            store,
            bus,
            cancelled,
        }
    }

    /// Check the cancellation flag. Stages call this at every suspension
    /// point and stop before their next emission once it is raised.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Apply a delta and publish its events in application order
    pub async fn apply(&self, task_id: TaskId, delta: TaskDelta) -> Result<()> {
        let events = self.store.apply(task_id, delta).await?;
        self.bus.publish_all(task_id, events).await;
        Ok(())
    }

    /// Move the task to `Failed(reason)` and publish the terminal events.
    /// Quiet when the task already reached a terminal stage (e.g. `cancel`
    /// got there first).
    pub async fn fail(&self, task_id: TaskId, reason: FailureReason) {
        match self.store.fail(task_id, reason).await {
            Ok(events) => self.bus.publish_all(task_id, events).await,
            Err(err) => tracing::warn!(task = %task_id, error = %err, "Failed to mark task failed"),
        }
    }

    /// Consistent snapshot of the task record
    pub async fn snapshot(&self, task_id: TaskId) -> Option<TaskRecord> {
        self.store.get(task_id).await
    }
}
