//! Execution transport abstraction
//!
//! The remote execution environment is a collaborator behind this trait; the
//! core never touches a filesystem or a process. A production transport would
//! relay a real remote job; the default implementation synthesizes telemetry.

use crate::task::{AnalysisResult, GeneratedScript, LogLevel, TaskId};
use async_trait::async_trait;
use biopilot_foundation::Result;
use tokio::sync::mpsc;

/// One message from a remote run
#[derive(Debug, Clone, PartialEq)]
pub enum TransportFrame {
    /// A telemetry log line
    Log { level: LogLevel, message: String },

    /// Terminal frame: the run's structured result. Nothing follows it.
    Completed(AnalysisResult),
}

/// Execution transport - implement to add new remote backends
#[async_trait]
pub trait ExecutionTransport: Send + Sync {
    /// Submit a script for execution. The returned stream yields log frames
    /// in emission order, then exactly one `Completed` frame. Dropping the
    /// receiver abandons the run.
    async fn submit_run(
        &self,
        task_id: TaskId,
        script: &GeneratedScript,
    ) -> Result<mpsc::Receiver<TransportFrame>>;

    /// Get transport name
    fn name(&self) -> &'static str;

    /// Check if the transport is reachable
    fn is_available(&self) -> bool {
        true
    }
}
