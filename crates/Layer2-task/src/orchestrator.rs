//! Orchestrator - submit / run / cancel
//!
//! Composes store, bus and stages: `submit` creates the record and spawns
//! planning; `run` arbitrates the single allowed execution; `cancel` forces a
//! terminal stage and signals in-flight loops through the task's flag.
//!
//! ## Usage
//!
//! ```ignore
//! let orchestrator = Orchestrator::new(
//!     OrchestratorConfig::default(),
//!     Arc::new(SimulatedTransport::default()),
//! );
//!
//! let id = orchestrator.submit("process sample batch", "Z:/lab1").await;
//! let mut events = orchestrator.subscribe(id).await.unwrap();
//!
//! // ... once planning finishes:
//! orchestrator.run(id).await?;
//! ```

use crate::context::StageContext;
use crate::event::{EventBusConfig, TaskEvent, TaskEventBus};
use crate::executor::{ExecutionStage, ExecutionTransport};
use crate::planner::{PlannerConfig, PlanningStage};
use crate::stage::{FailureReason, TaskStage};
use crate::store::{TaskDelta, TaskStore};
use crate::task::{TaskId, TaskRecord};
use biopilot_foundation::{Error, PilotConfig, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

/// Orchestrator settings
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    /// Planning stage settings
    pub planner: PlannerConfig,

    /// Event bus settings
    pub bus: EventBusConfig,
}

impl OrchestratorConfig {
    pub fn from_pilot_config(config: &PilotConfig) -> Self {
        Self {
            planner: PlannerConfig::from_settings(&config.planner),
            bus: EventBusConfig {
                channel_capacity: config.bus.channel_capacity,
            },
        }
    }
}

/// Drives requests through planning, execution and cancellation
pub struct Orchestrator {
    /// Task state owner
    store: Arc<TaskStore>,

    /// Per-task event fan-out
    bus: Arc<TaskEventBus>,

    /// Planning stage driver
    planner: PlanningStage,

    /// Remote execution collaborator
    transport: Arc<dyn ExecutionTransport>,

    /// Per-task cancellation flags
    flags: RwLock<HashMap<TaskId, Arc<AtomicBool>>>,
}

impl Orchestrator {
    /// Create an orchestrator over the given transport
    pub fn new(config: OrchestratorConfig, transport: Arc<dyn ExecutionTransport>) -> Self {
        Self {
            store: Arc::new(TaskStore::new()),
            bus: Arc::new(TaskEventBus::with_config(config.bus)),
            planner: PlanningStage::new(config.planner),
            transport,
            flags: RwLock::new(HashMap::new()),
        }
    }

    /// Task store access
    pub fn store(&self) -> Arc<TaskStore> {
        Arc::clone(&self.store)
    }

    /// Event bus access
    pub fn bus(&self) -> Arc<TaskEventBus> {
        Arc::clone(&self.bus)
    }

    /// Accept a new request: create its record, open its event channel and
    /// start planning. Returns the task id immediately; progress arrives on
    /// the event stream.
    pub async fn submit(
        &self,
        request: impl Into<String>,
        working_directory: impl Into<String>,
    ) -> TaskId {
        let task_id = self.store.create(request, working_directory).await;
        self.bus.open(task_id).await;

        let flag = Arc::new(AtomicBool::new(false));
        {
            let mut flags = self.flags.write().await;
            flags.insert(task_id, Arc::clone(&flag));
        }

        let planner = self.planner.clone();
        let ctx = self.context_for(flag);
        tokio::spawn(async move {
            planner.run(&ctx, task_id).await;
        });

        info!(task = %task_id, "Submitted request");
        task_id
    }

    /// Start the task's one allowed run. The store's `AwaitingRun -> Running`
    /// transition is the arbiter: a task that is planning, already running or
    /// terminal yields `Error::InvalidState` and nothing changes, so a caller
    /// may safely re-issue the command.
    pub async fn run(&self, task_id: TaskId) -> Result<()> {
        let events = match self
            .store
            .apply(task_id, TaskDelta::SetStage(TaskStage::Running))
            .await
        {
            Ok(events) => events,
            Err(Error::InvalidTransition(_)) => {
                return Err(Error::invalid_state(format!(
                    "Task {} is not awaiting a run",
                    task_id
                )));
            }
            Err(err) => return Err(err),
        };
        self.bus.publish_all(task_id, events).await;

        let flag = self.flag_for(task_id).await?;
        let stage = ExecutionStage::new(Arc::clone(&self.transport));
        let ctx = self.context_for(flag);
        tokio::spawn(async move {
            stage.run(&ctx, task_id).await;
        });

        info!(task = %task_id, "Run started");
        Ok(())
    }

    /// Cancel a task: raise its flag, then force `Failed(Interrupted)`.
    /// In-flight stage loops observe the flag at their next suspension point;
    /// their late deltas are rejected by the store and swallowed. Cancelling
    /// an already-terminal task is a no-op.
    pub async fn cancel(&self, task_id: TaskId) -> Result<()> {
        let flag = self.flag_for(task_id).await?;
        flag.store(true, Ordering::SeqCst);

        let events = self
            .store
            .fail(task_id, FailureReason::Interrupted)
            .await?;
        if events.is_empty() {
            debug!(task = %task_id, "Cancel on terminal task ignored");
        } else {
            self.bus.publish_all(task_id, events).await;
            info!(task = %task_id, "Cancelled task");
        }
        Ok(())
    }

    /// Consistent snapshot of a task record
    pub async fn get(&self, task_id: TaskId) -> Option<TaskRecord> {
        self.store.get(task_id).await
    }

    /// Subscribe to a task's event stream (see `TaskEventBus::subscribe`)
    pub async fn subscribe(&self, task_id: TaskId) -> Option<broadcast::Receiver<TaskEvent>> {
        self.bus.subscribe(task_id).await
    }

    async fn flag_for(&self, task_id: TaskId) -> Result<Arc<AtomicBool>> {
        let flags = self.flags.read().await;
        flags
            .get(&task_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Task {} not found", task_id)))
    }

    fn context_for(&self, flag: Arc<AtomicBool>) -> StageContext {
        StageContext::new(Arc::clone(&self.store), Arc::clone(&self.bus), flag)
    }
}
