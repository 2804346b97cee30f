//! Task stage machine

use serde::{Deserialize, Serialize};

/// Why a task ended in `Failed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// Cancelled while a stage was in flight
    Interrupted,

    /// The execution transport failed; its detail is attached
    Collaborator(String),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::Interrupted => write!(f, "interrupted"),
            FailureReason::Collaborator(detail) => write!(f, "collaborator error: {}", detail),
        }
    }
}

/// Lifecycle stages of a task
///
/// `Planning -> AwaitingRun -> Running -> Completed | Failed`; `Failed` is
/// reachable from any non-terminal stage. No transition skips a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TaskStage {
    /// The planner is emitting reasoning steps
    Planning,

    /// Script generated, waiting for an explicit run command
    AwaitingRun,

    /// The remote run is streaming logs
    Running,

    /// Run finished with a result
    Completed,

    /// Stage failure or cancellation
    Failed(FailureReason),
}

impl TaskStage {
    /// Check if this is a terminal stage (cannot transition further)
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStage::Completed | TaskStage::Failed(_))
    }

    /// Check if the run is in flight
    pub fn is_running(&self) -> bool {
        matches!(self, TaskStage::Running)
    }

    /// Check if a direct transition to `next` is legal
    pub fn can_transition(&self, next: &TaskStage) -> bool {
        match (self, next) {
            (TaskStage::Planning, TaskStage::AwaitingRun) => true,
            (TaskStage::AwaitingRun, TaskStage::Running) => true,
            (TaskStage::Running, TaskStage::Completed) => true,
            (from, TaskStage::Failed(_)) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Get display name for the stage
    pub fn display_name(&self) -> &'static str {
        match self {
            TaskStage::Planning => "Planning",
            TaskStage::AwaitingRun => "AwaitingRun",
            TaskStage::Running => "Running",
            TaskStage::Completed => "Completed",
            TaskStage::Failed(_) => "Failed",
        }
    }

    /// Get a symbol for the stage (for text UIs)
    pub fn symbol(&self) -> &'static str {
        match self {
            TaskStage::Planning => "◌",
            TaskStage::AwaitingRun => "◎",
            TaskStage::Running => "⟳",
            TaskStage::Completed => "✓",
            TaskStage::Failed(_) => "✗",
        }
    }
}

impl std::fmt::Display for TaskStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_path() {
        assert!(TaskStage::Planning.can_transition(&TaskStage::AwaitingRun));
        assert!(TaskStage::AwaitingRun.can_transition(&TaskStage::Running));
        assert!(TaskStage::Running.can_transition(&TaskStage::Completed));
    }

    #[test]
    fn test_no_stage_skipping() {
        assert!(!TaskStage::Planning.can_transition(&TaskStage::Running));
        assert!(!TaskStage::Planning.can_transition(&TaskStage::Completed));
        assert!(!TaskStage::AwaitingRun.can_transition(&TaskStage::Completed));
        assert!(!TaskStage::Running.can_transition(&TaskStage::AwaitingRun));
    }

    #[test]
    fn test_failed_reachable_from_any_non_terminal() {
        let failed = TaskStage::Failed(FailureReason::Interrupted);
        assert!(TaskStage::Planning.can_transition(&failed));
        assert!(TaskStage::AwaitingRun.can_transition(&failed));
        assert!(TaskStage::Running.can_transition(&failed));
    }

    #[test]
    fn test_terminal_stages_are_sinks() {
        let failed = TaskStage::Failed(FailureReason::Interrupted);
        assert!(!TaskStage::Completed.can_transition(&failed));
        assert!(!failed.can_transition(&TaskStage::Running));
        assert!(!failed.can_transition(&TaskStage::Failed(FailureReason::Collaborator(
            "again".to_string()
        ))));
    }

    #[test]
    fn test_failure_reason_display() {
        assert_eq!(FailureReason::Interrupted.to_string(), "interrupted");
        assert_eq!(
            FailureReason::Collaborator("timeout".to_string()).to_string(),
            "collaborator error: timeout"
        );
    }
}
