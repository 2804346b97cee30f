//! Task record store
//!
//! Sole owner of task state. Stages never hold their own copy of a record;
//! they submit deltas, which are validated against the current stage and
//! applied atomically under the store's write lock. A snapshot returned by
//! `get` always reflects a consistent prior state.

use crate::event::{RunOutcome, TaskEvent};
use crate::stage::{FailureReason, TaskStage};
use crate::task::{AnalysisResult, GeneratedScript, LogEntry, TaskId, TaskRecord};
use biopilot_foundation::{Error, Result};
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// An atomic, validated mutation of one task's state
#[derive(Debug, Clone)]
pub enum TaskDelta {
    /// Append a reasoning step (Planning only)
    AddThought(String),

    /// Set the generated script and move to `AwaitingRun` (Planning only)
    SetScript(GeneratedScript),

    /// Append a run log line (Running only)
    AppendLog(LogEntry),

    /// Set the structured result and move to `Completed` (Running only)
    SetResult(AnalysisResult),

    /// Explicit stage transition. Only `Running` and `Failed` are valid
    /// targets; `AwaitingRun` and `Completed` are reached through
    /// `SetScript` / `SetResult` so their payload invariants hold in every
    /// observable snapshot.
    SetStage(TaskStage),
}

/// Owns the mutable state of every in-flight and completed task
pub struct TaskStore {
    /// All records by ID
    tasks: RwLock<HashMap<TaskId, TaskRecord>>,
}

impl TaskStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Create a record for a new request, in the `Planning` stage
    pub async fn create(
        &self,
        request: impl Into<String>,
        working_directory: impl Into<String>,
    ) -> TaskId {
        let record = TaskRecord::new(request, working_directory);
        let task_id = record.id;

        let mut tasks = self.tasks.write().await;
        tasks.insert(task_id, record);

        debug!(task = %task_id, "Created task record");
        task_id
    }

    /// Get a consistent snapshot of a record
    pub async fn get(&self, task_id: TaskId) -> Option<TaskRecord> {
        let tasks = self.tasks.read().await;
        tasks.get(&task_id).cloned()
    }

    /// Number of records held
    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    /// Whether the store holds no records
    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }

    /// Apply a delta. Returns the events describing the accepted mutation,
    /// in the order they must be published. A rejected delta
    /// (`Error::InvalidTransition`) mutates nothing.
    pub async fn apply(&self, task_id: TaskId, delta: TaskDelta) -> Result<Vec<TaskEvent>> {
        let mut tasks = self.tasks.write().await;
        let record = tasks
            .get_mut(&task_id)
            .ok_or_else(|| Error::NotFound(format!("Task {} not found", task_id)))?;

        match delta {
            TaskDelta::AddThought(thought) => {
                if record.stage != TaskStage::Planning {
                    return Err(Error::invalid_transition(format!(
                        "AddThought requires Planning, task {} is {}",
                        task_id, record.stage
                    )));
                }
                record.thoughts.push(thought.clone());
                Ok(vec![TaskEvent::ThoughtAdded { thought }])
            }

            TaskDelta::SetScript(script) => {
                if record.stage != TaskStage::Planning {
                    return Err(Error::invalid_transition(format!(
                        "SetScript requires Planning, task {} is {}",
                        task_id, record.stage
                    )));
                }
                if record.script.is_some() {
                    return Err(Error::invalid_transition(format!(
                        "Task {} already has a script",
                        task_id
                    )));
                }
                record.script = Some(script.clone());
                record.stage = TaskStage::AwaitingRun;
                Ok(vec![
                    TaskEvent::PlanningFinished { script },
                    TaskEvent::StageChanged {
                        stage: TaskStage::AwaitingRun,
                    },
                ])
            }

            TaskDelta::AppendLog(entry) => {
                if record.stage != TaskStage::Running {
                    return Err(Error::invalid_transition(format!(
                        "AppendLog requires Running, task {} is {}",
                        task_id, record.stage
                    )));
                }
                record.logs.push(entry.clone());
                Ok(vec![TaskEvent::LogAppended { entry }])
            }

            TaskDelta::SetResult(result) => {
                if record.stage != TaskStage::Running {
                    return Err(Error::invalid_transition(format!(
                        "SetResult requires Running, task {} is {}",
                        task_id, record.stage
                    )));
                }
                if record.result.is_some() {
                    return Err(Error::invalid_transition(format!(
                        "Task {} already has a result",
                        task_id
                    )));
                }
                record.result = Some(result.clone());
                record.stage = TaskStage::Completed;
                record.completed_at = Some(Utc::now());
                Ok(vec![
                    TaskEvent::StageChanged {
                        stage: TaskStage::Completed,
                    },
                    TaskEvent::RunFinished {
                        outcome: RunOutcome::Completed(result),
                    },
                ])
            }

            TaskDelta::SetStage(next) => {
                match &next {
                    TaskStage::Running | TaskStage::Failed(_) => {}
                    other => {
                        return Err(Error::invalid_transition(format!(
                            "SetStage may not target {}; use SetScript/SetResult",
                            other
                        )));
                    }
                }
                if !record.stage.can_transition(&next) {
                    return Err(Error::invalid_transition(format!(
                        "Task {} cannot move {} -> {}",
                        task_id, record.stage, next
                    )));
                }

                record.stage = next.clone();
                match next {
                    TaskStage::Running => {
                        record.started_at = Some(Utc::now());
                        Ok(vec![TaskEvent::StageChanged {
                            stage: TaskStage::Running,
                        }])
                    }
                    TaskStage::Failed(reason) => {
                        record.completed_at = Some(Utc::now());
                        Ok(vec![
                            TaskEvent::StageChanged {
                                stage: TaskStage::Failed(reason.clone()),
                            },
                            TaskEvent::RunFinished {
                                outcome: RunOutcome::Failed(reason),
                            },
                        ])
                    }
                    _ => unreachable!("target validated above"),
                }
            }
        }
    }

    /// Force a task to `Failed(reason)`. Succeeds quietly (with no events)
    /// when the task is already terminal.
    pub async fn fail(&self, task_id: TaskId, reason: FailureReason) -> Result<Vec<TaskEvent>> {
        match self
            .apply(task_id, TaskDelta::SetStage(TaskStage::Failed(reason)))
            .await
        {
            Ok(events) => Ok(events),
            Err(err) if err.is_rejection() => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}
