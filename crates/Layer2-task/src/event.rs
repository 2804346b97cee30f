//! Per-task event stream
//!
//! One broadcast channel per task. Events are delivered in publish order,
//! exactly once per live subscriber; after the terminal event the channel is
//! closed, so every subscriber's stream is finite. A late subscriber sees only
//! events published after it subscribed, never a backlog.

use crate::stage::{FailureReason, TaskStage};
use crate::task::{AnalysisResult, GeneratedScript, LogEntry, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, trace};

/// Terminal outcome of a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RunOutcome {
    /// Run finished with a structured result
    Completed(AnalysisResult),

    /// Stage failure or cancellation
    Failed(FailureReason),
}

/// State-change notification for one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TaskEvent {
    /// A reasoning step was appended
    ThoughtAdded { thought: String },

    /// Planning finished and produced a script
    PlanningFinished { script: GeneratedScript },

    /// The task moved to a new stage
    StageChanged { stage: TaskStage },

    /// A remote run log line was appended
    LogAppended { entry: LogEntry },

    /// The task reached a terminal stage. Always the last event on the stream.
    RunFinished { outcome: RunOutcome },
}

impl TaskEvent {
    /// The terminal event closes the task's stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskEvent::RunFinished { .. })
    }

    /// Short kind tag for logging
    pub fn kind(&self) -> &'static str {
        match self {
            TaskEvent::ThoughtAdded { .. } => "thought_added",
            TaskEvent::PlanningFinished { .. } => "planning_finished",
            TaskEvent::StageChanged { .. } => "stage_changed",
            TaskEvent::LogAppended { .. } => "log_appended",
            TaskEvent::RunFinished { .. } => "run_finished",
        }
    }
}

/// Event bus settings
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Per-task broadcast channel capacity
    pub channel_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

/// Per-task publish/subscribe bus
pub struct TaskEventBus {
    /// Settings
    config: EventBusConfig,

    /// Live channels by task id; removed after the terminal event
    channels: RwLock<HashMap<TaskId, broadcast::Sender<TaskEvent>>>,

    /// Total published events
    published: AtomicU64,
}

impl TaskEventBus {
    /// Create a bus with default settings
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    /// Create a bus with custom settings
    pub fn with_config(config: EventBusConfig) -> Self {
        Self {
            config,
            channels: RwLock::new(HashMap::new()),
            published: AtomicU64::new(0),
        }
    }

    /// Open the channel for a task. Called once at task creation; opening an
    /// already-open task is a no-op.
    pub async fn open(&self, task_id: TaskId) {
        let mut channels = self.channels.write().await;
        channels.entry(task_id).or_insert_with(|| {
            debug!(task = %task_id, "Opened event channel");
            let (tx, _) = broadcast::channel(self.config.channel_capacity);
            tx
        });
    }

    /// Subscribe to a task's events. Returns `None` once the task's terminal
    /// event has been published (the stream is not restartable).
    pub async fn subscribe(&self, task_id: TaskId) -> Option<broadcast::Receiver<TaskEvent>> {
        let channels = self.channels.read().await;
        channels.get(&task_id).map(|tx| tx.subscribe())
    }

    /// Publish one event. Delivery to zero subscribers is not an error. A
    /// terminal event closes the channel after delivery.
    pub async fn publish(&self, task_id: TaskId, event: TaskEvent) {
        let terminal = event.is_terminal();
        let count = self.published.fetch_add(1, Ordering::SeqCst);

        trace!(task = %task_id, kind = event.kind(), "Publishing event #{}", count + 1);

        let mut channels = self.channels.write().await;
        if let Some(tx) = channels.get(&task_id) {
            let _ = tx.send(event);
        }
        if terminal && channels.remove(&task_id).is_some() {
            debug!(task = %task_id, "Closed event channel");
        }
    }

    /// Publish a batch of events, in order
    pub async fn publish_all(&self, task_id: TaskId, events: Vec<TaskEvent>) {
        for event in events {
            self.publish(task_id, event).await;
        }
    }

    /// Check whether a task's channel is still open
    pub async fn is_open(&self, task_id: TaskId) -> bool {
        self.channels.read().await.contains_key(&task_id)
    }

    /// Total events published since creation
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::SeqCst)
    }
}

impl Default for TaskEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::LogLevel;

    #[tokio::test]
    async fn test_publish_order_preserved() {
        let bus = TaskEventBus::new();
        let id = TaskId::new();
        bus.open(id).await;

        let mut rx = bus.subscribe(id).await.unwrap();

        for i in 0..5 {
            bus.publish(
                id,
                TaskEvent::ThoughtAdded {
                    thought: format!("step {}", i),
                },
            )
            .await;
        }

        for i in 0..5 {
            match rx.recv().await.unwrap() {
                TaskEvent::ThoughtAdded { thought } => assert_eq!(thought, format!("step {}", i)),
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_terminal_event_closes_stream() {
        let bus = TaskEventBus::new();
        let id = TaskId::new();
        bus.open(id).await;

        let mut rx = bus.subscribe(id).await.unwrap();

        bus.publish(
            id,
            TaskEvent::RunFinished {
                outcome: RunOutcome::Failed(FailureReason::Interrupted),
            },
        )
        .await;

        // The terminal event is delivered, then the stream ends.
        assert!(matches!(
            rx.recv().await.unwrap(),
            TaskEvent::RunFinished { .. }
        ));
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));

        // Not restartable
        assert!(bus.subscribe(id).await.is_none());
        assert!(!bus.is_open(id).await);
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_no_backlog() {
        let bus = TaskEventBus::new();
        let id = TaskId::new();
        bus.open(id).await;

        bus.publish(
            id,
            TaskEvent::ThoughtAdded {
                thought: "early".to_string(),
            },
        )
        .await;

        let mut rx = bus.subscribe(id).await.unwrap();

        bus.publish(
            id,
            TaskEvent::LogAppended {
                entry: LogEntry::new(LogLevel::Info, "late"),
            },
        )
        .await;

        match rx.recv().await.unwrap() {
            TaskEvent::LogAppended { entry } => assert_eq!(entry.message, "late"),
            other => panic!("late subscriber received backlog: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_independent_tasks_do_not_cross() {
        let bus = TaskEventBus::new();
        let a = TaskId::new();
        let b = TaskId::new();
        bus.open(a).await;
        bus.open(b).await;

        let mut rx_b = bus.subscribe(b).await.unwrap();

        bus.publish(
            a,
            TaskEvent::ThoughtAdded {
                thought: "for a".to_string(),
            },
        )
        .await;
        bus.publish(
            b,
            TaskEvent::ThoughtAdded {
                thought: "for b".to_string(),
            },
        )
        .await;

        match rx_b.recv().await.unwrap() {
            TaskEvent::ThoughtAdded { thought } => assert_eq!(thought, "for b"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = TaskEventBus::new();
        let id = TaskId::new();
        bus.open(id).await;

        bus.publish(
            id,
            TaskEvent::ThoughtAdded {
                thought: "nobody listening".to_string(),
            },
        )
        .await;

        assert_eq!(bus.published_count(), 1);
    }
}
