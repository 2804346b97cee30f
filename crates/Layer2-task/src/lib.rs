//! # biopilot-task
//!
//! Task orchestration core for BioPilot. A request is driven through an
//! ordered sequence of asynchronous stages - planning, script generation,
//! execution, result availability - with per-task state owned by a single
//! store, incremental events fanned out per task, and cooperative
//! cancellation with an at-most-one-active-run guarantee.
//!
//! ## Components
//!
//! - [`store::TaskStore`] - owns every task record; validated delta mutation
//! - [`event::TaskEventBus`] - ordered per-task publish/subscribe
//! - [`planner::PlanningStage`] - reasoning trace + script synthesis
//! - [`executor::ExecutionStage`] - drives a transport run into log/result deltas
//! - [`orchestrator::Orchestrator`] - submit / run / cancel glue

pub use biopilot_foundation::{Error, Result};

pub mod context;
pub mod event;
pub mod executor;
pub mod orchestrator;
pub mod planner;
pub mod stage;
pub mod store;
pub mod task;

// Task model
pub use stage::{FailureReason, TaskStage};
pub use task::{
    AnalysisResult, GeneratedScript, LogEntry, LogLevel, ResultKind, SeriesPoint, TaskId,
    TaskRecord,
};

// Store
pub use store::{TaskDelta, TaskStore};

// Events
pub use event::{EventBusConfig, RunOutcome, TaskEvent, TaskEventBus};

// Stages
pub use context::StageContext;
pub use executor::{
    ExecutionStage, ExecutionTransport, SimulatedTransport, SimulatedTransportConfig,
    TransportFrame,
};
pub use planner::{PlannerConfig, PlanningStage};

// Orchestration
pub use orchestrator::{Orchestrator, OrchestratorConfig};
