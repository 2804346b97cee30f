//! Execution stage
//!
//! Drives a transport-provided frame stream into log and result deltas.
//! The orchestrator applies the `Running` transition before spawning this
//! stage; the store's validation of that transition is what enforces
//! at-most-one-active-run.

mod simulated;
mod transport;

pub use simulated::{SimulatedTransport, SimulatedTransportConfig};
pub use transport::{ExecutionTransport, TransportFrame};

use crate::context::StageContext;
use crate::stage::FailureReason;
use crate::store::TaskDelta;
use crate::task::{LogEntry, TaskId};
use std::sync::Arc;
use tracing::{debug, warn};

/// Drives a task from `Running` to a terminal stage
pub struct ExecutionStage {
    transport: Arc<dyn ExecutionTransport>,
}

impl ExecutionStage {
    pub fn new(transport: Arc<dyn ExecutionTransport>) -> Self {
        Self { transport }
    }

    /// Get the transport behind this stage
    pub fn transport(&self) -> &Arc<dyn ExecutionTransport> {
        &self.transport
    }

    /// Run to completion. Expects the task to be `Running` with a script.
    /// Every failure path leaves the task in a terminal stage; this never
    /// returns an error to the spawner.
    pub async fn run(&self, ctx: &StageContext, task_id: TaskId) {
        let Some(snapshot) = ctx.snapshot(task_id).await else {
            warn!(task = %task_id, "Execution started for unknown task");
            return;
        };

        let Some(script) = snapshot.script else {
            // Running without a script cannot happen through the store's
            // transitions; treat it as a broken collaborator handoff.
            ctx.fail(
                task_id,
                FailureReason::Collaborator("no script to execute".to_string()),
            )
            .await;
            return;
        };

        let mut frames = match self.transport.submit_run(task_id, &script).await {
            Ok(rx) => rx,
            Err(err) => {
                ctx.fail(task_id, FailureReason::Collaborator(err.to_string()))
                    .await;
                return;
            }
        };

        while let Some(frame) = frames.recv().await {
            if ctx.is_cancelled() {
                debug!(task = %task_id, "Execution observed cancellation");
                ctx.fail(task_id, FailureReason::Interrupted).await;
                return;
            }

            match frame {
                TransportFrame::Log { level, message } => {
                    let entry = LogEntry::new(level, message);
                    if let Err(err) = ctx.apply(task_id, TaskDelta::AppendLog(entry)).await {
                        debug!(task = %task_id, error = %err, "Execution aborted");
                        ctx.fail(task_id, FailureReason::Interrupted).await;
                        return;
                    }
                }
                TransportFrame::Completed(result) => {
                    if let Err(err) = ctx.apply(task_id, TaskDelta::SetResult(result)).await {
                        debug!(task = %task_id, error = %err, "Result emission rejected");
                        ctx.fail(task_id, FailureReason::Interrupted).await;
                    }
                    return;
                }
            }
        }

        // Stream ended without a terminal frame
        ctx.fail(
            task_id,
            FailureReason::Collaborator("transport stream ended before a result".to_string()),
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::TaskEventBus;
    use crate::stage::TaskStage;
    use crate::store::TaskStore;
    use crate::task::GeneratedScript;
    use async_trait::async_trait;
    use biopilot_foundation::{Error, Result};
    use std::sync::atomic::AtomicBool;
    use tokio::sync::mpsc;

    async fn running_task() -> (StageContext, Arc<TaskStore>, TaskId) {
        let store = Arc::new(TaskStore::new());
        let bus = Arc::new(TaskEventBus::new());
        let flag = Arc::new(AtomicBool::new(false));
        let ctx = StageContext::new(Arc::clone(&store), bus, flag);

        let id = store.create("process batch", "Z:/lab1").await;
        store
            .apply(id, TaskDelta::SetScript(GeneratedScript::bash("obi import")))
            .await
            .unwrap();
        store
            .apply(id, TaskDelta::SetStage(TaskStage::Running))
            .await
            .unwrap();

        (ctx, store, id)
    }

    #[tokio::test]
    async fn test_full_replay_completes_task() {
        let (ctx, store, id) = running_task().await;
        let stage = ExecutionStage::new(Arc::new(SimulatedTransport::new(
            SimulatedTransportConfig::instant(),
        )));

        stage.run(&ctx, id).await;

        let record = store.get(id).await.unwrap();
        assert_eq!(record.stage, TaskStage::Completed);
        assert_eq!(record.logs.len(), SimulatedTransport::entry_count());
        assert!(!record.result.unwrap().series.is_empty());
    }

    /// Transport whose stream ends without a terminal frame
    struct TruncatedTransport;

    #[async_trait]
    impl ExecutionTransport for TruncatedTransport {
        async fn submit_run(
            &self,
            _task_id: TaskId,
            _script: &GeneratedScript,
        ) -> Result<mpsc::Receiver<TransportFrame>> {
            let (tx, rx) = mpsc::channel(4);
            tokio::spawn(async move {
                let _ = tx
                    .send(TransportFrame::Log {
                        level: crate::task::LogLevel::Info,
                        message: "connection established".to_string(),
                    })
                    .await;
                // Then the connection drops.
            });
            Ok(rx)
        }

        fn name(&self) -> &'static str {
            "truncated"
        }
    }

    #[tokio::test]
    async fn test_truncated_stream_fails_with_collaborator_reason() {
        let (ctx, store, id) = running_task().await;
        let stage = ExecutionStage::new(Arc::new(TruncatedTransport));

        stage.run(&ctx, id).await;

        let record = store.get(id).await.unwrap();
        match record.stage {
            TaskStage::Failed(FailureReason::Collaborator(detail)) => {
                assert!(detail.contains("before a result"));
            }
            other => panic!("expected collaborator failure, got {:?}", other),
        }
        assert_eq!(record.logs.len(), 1);
        assert!(record.result.is_none());
    }

    /// Transport that cannot accept the run at all
    struct UnreachableTransport;

    #[async_trait]
    impl ExecutionTransport for UnreachableTransport {
        async fn submit_run(
            &self,
            _task_id: TaskId,
            _script: &GeneratedScript,
        ) -> Result<mpsc::Receiver<TransportFrame>> {
            Err(Error::collaborator("muscle-node", "connection refused"))
        }

        fn name(&self) -> &'static str {
            "unreachable"
        }

        fn is_available(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_submit_failure_fails_task() {
        let (ctx, store, id) = running_task().await;
        let stage = ExecutionStage::new(Arc::new(UnreachableTransport));

        stage.run(&ctx, id).await;

        let record = store.get(id).await.unwrap();
        assert!(matches!(
            record.stage,
            TaskStage::Failed(FailureReason::Collaborator(_))
        ));
        assert!(record.logs.is_empty());
    }
}
