//! Task record and types

use crate::stage::TaskStage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Generate a new random TaskId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Script produced by the planning stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedScript {
    /// Script language (e.g. "bash")
    pub language: String,

    /// Full script body
    pub content: String,
}

impl GeneratedScript {
    pub fn bash(content: impl Into<String>) -> Self {
        Self {
            language: "bash".to_string(),
            content: content.into(),
        }
    }
}

/// Log level for remote run output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Routine progress
    Info,
    /// A step finished well
    Success,
    /// Recoverable problem
    Warn,
    /// Failure output
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Success => "success",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, LogLevel::Error)
    }
}

/// A single remote run log line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Timestamp
    pub timestamp: DateTime<Utc>,

    /// Log level
    pub level: LogLevel,

    /// Log content
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Success, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warn, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }
}

/// Chart shape of an analysis result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Bar,
    Pie,
}

/// One named value in a result series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub name: String,
    pub value: f64,
}

impl SeriesPoint {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Structured output of a completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Display title
    pub title: String,

    /// Chart shape
    pub kind: ResultKind,

    /// Named values, in display order
    pub series: Vec<SeriesPoint>,
}

/// Full lifecycle record of one request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Unique task identifier
    pub id: TaskId,

    /// Original natural-language request
    pub request: String,

    /// Working directory the request targets (template parameter only)
    pub working_directory: String,

    /// Current lifecycle stage
    pub stage: TaskStage,

    /// Reasoning steps, appended during `Planning`, frozen afterward
    pub thoughts: Vec<String>,

    /// Generated script, set once at the `Planning -> AwaitingRun` transition
    pub script: Option<GeneratedScript>,

    /// Remote run output, appended during `Running`, frozen afterward
    pub logs: Vec<LogEntry>,

    /// Structured result, present iff `stage == Completed`
    pub result: Option<AnalysisResult>,

    /// When the task was created
    pub created_at: DateTime<Utc>,

    /// When the run started
    pub started_at: Option<DateTime<Utc>>,

    /// When the task reached a terminal stage
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    /// Create a new record in the `Planning` stage
    pub fn new(request: impl Into<String>, working_directory: impl Into<String>) -> Self {
        Self {
            id: TaskId::new(),
            request: request.into(),
            working_directory: working_directory.into(),
            stage: TaskStage::Planning,
            thoughts: Vec::new(),
            script: None,
            logs: Vec::new(),
            result: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Check if the task can still make progress
    pub fn is_active(&self) -> bool {
        !self.stage.is_terminal()
    }
}
