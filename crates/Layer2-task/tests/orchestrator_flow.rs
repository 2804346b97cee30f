//! End-to-end orchestration flows
//!
//! Drives full task lifecycles through the public orchestrator surface and
//! checks the contracts an observer can rely on: stage ordering, event
//! ordering, run arbitration and cancellation.

use biopilot_task::{
    Error, EventBusConfig, FailureReason, Orchestrator, OrchestratorConfig, PlannerConfig,
    PlanningStage, RunOutcome, SimulatedTransport, SimulatedTransportConfig, TaskEvent, TaskId,
    TaskStage,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

fn fast_orchestrator() -> Orchestrator {
    // Wide enough that a subscriber attached right after submit() is in
    // place before the first thought, short enough to keep the suite quick.
    let config = OrchestratorConfig {
        planner: PlannerConfig {
            step_delay: Duration::from_millis(20),
        },
        bus: EventBusConfig::default(),
    };
    Orchestrator::new(
        config,
        Arc::new(SimulatedTransport::new(SimulatedTransportConfig::instant())),
    )
}

/// Collect events until the stream closes; panics if it never does
async fn drain(mut rx: broadcast::Receiver<TaskEvent>) -> Vec<TaskEvent> {
    let mut events = Vec::new();
    loop {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Ok(event)) => events.push(event),
            Ok(Err(broadcast::error::RecvError::Closed)) => return events,
            Ok(Err(err)) => panic!("event stream lagged: {:?}", err),
            Err(_) => panic!("event stream stalled"),
        }
    }
}

/// Wait until the task reaches the given stage (bounded)
async fn wait_for_stage(orchestrator: &Orchestrator, id: TaskId, stage: &TaskStage) {
    for _ in 0..1000 {
        if let Some(record) = orchestrator.get(id).await {
            if &record.stage == stage {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("task {} never reached {}", id, stage);
}

#[tokio::test]
async fn full_lifecycle_submit_plan_run_complete() {
    let orchestrator = fast_orchestrator();

    let id = orchestrator.submit("process sample batch", "Z:/lab1").await;
    let rx = orchestrator.subscribe(id).await.unwrap();

    wait_for_stage(&orchestrator, id, &TaskStage::AwaitingRun).await;

    // Planning contract
    let record = orchestrator.get(id).await.unwrap();
    assert!(!record.thoughts.is_empty());
    assert_eq!(record.stage, TaskStage::AwaitingRun);
    let script = record.script.expect("planning must produce a script");
    assert_eq!(script.language, "bash");
    assert!(script.content.contains("Z:/lab1"));

    orchestrator.run(id).await.unwrap();
    let events = drain(rx).await;

    // Execution contract
    let record = orchestrator.get(id).await.unwrap();
    assert_eq!(record.stage, TaskStage::Completed);
    assert_eq!(record.logs.len(), SimulatedTransport::entry_count());
    let result = record.result.expect("completed task must carry a result");
    assert!(!result.series.is_empty());
    assert!(record.started_at.is_some());
    assert!(record.completed_at.is_some());

    // Event stream shape: every thought, the script, each stage move, every
    // log line, then exactly one terminal event - in that order.
    let expected_thoughts =
        PlanningStage::thought_sequence("process sample batch", "Z:/lab1").len();
    let thoughts = events
        .iter()
        .filter(|e| matches!(e, TaskEvent::ThoughtAdded { .. }))
        .count();
    assert_eq!(thoughts, expected_thoughts);

    let logs = events
        .iter()
        .filter(|e| matches!(e, TaskEvent::LogAppended { .. }))
        .count();
    assert_eq!(logs, SimulatedTransport::entry_count());

    let last = events.last().unwrap();
    assert!(
        matches!(
            last,
            TaskEvent::RunFinished {
                outcome: RunOutcome::Completed(_)
            }
        ),
        "stream must end with the terminal event, got {:?}",
        last
    );
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, TaskEvent::RunFinished { .. }))
            .count(),
        1
    );

    // Delta application order is the delivery order: thoughts precede
    // PlanningFinished, which precedes every log line.
    let planning_finished_at = events
        .iter()
        .position(|e| matches!(e, TaskEvent::PlanningFinished { .. }))
        .unwrap();
    let last_thought_at = events
        .iter()
        .rposition(|e| matches!(e, TaskEvent::ThoughtAdded { .. }))
        .unwrap();
    let first_log_at = events
        .iter()
        .position(|e| matches!(e, TaskEvent::LogAppended { .. }))
        .unwrap();
    assert!(last_thought_at < planning_finished_at);
    assert!(planning_finished_at < first_log_at);
}

#[tokio::test]
async fn thought_events_arrive_in_record_order() {
    let orchestrator = fast_orchestrator();
    let id = orchestrator.submit("order check", "Z:/lab1").await;
    let mut rx = orchestrator.subscribe(id).await.unwrap();

    let mut streamed = Vec::new();
    loop {
        match rx.recv().await.unwrap() {
            TaskEvent::ThoughtAdded { thought } => streamed.push(thought),
            TaskEvent::PlanningFinished { .. } => break,
            _ => {}
        }
    }

    let record = orchestrator.get(id).await.unwrap();
    assert_eq!(streamed, record.thoughts);
}

#[tokio::test]
async fn run_while_planning_is_rejected_unchanged() {
    let orchestrator = fast_orchestrator();
    let id = orchestrator.submit("process sample batch", "Z:/lab1").await;

    let before = orchestrator.get(id).await.unwrap();
    if before.stage != TaskStage::Planning {
        // Planner outpaced us; the double-run test below covers arbitration.
        return;
    }

    let err = orchestrator.run(id).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));

    let after = orchestrator.get(id).await.unwrap();
    assert!(after.started_at.is_none());
    assert!(after.logs.is_empty());
}

#[tokio::test]
async fn second_run_is_rejected_with_no_extra_deltas() {
    let orchestrator = fast_orchestrator();
    let id = orchestrator.submit("process sample batch", "Z:/lab1").await;
    let rx = orchestrator.subscribe(id).await.unwrap();

    wait_for_stage(&orchestrator, id, &TaskStage::AwaitingRun).await;

    orchestrator.run(id).await.unwrap();
    let second = orchestrator.run(id).await;
    assert!(matches!(second, Err(Error::InvalidState(_))));

    let events = drain(rx).await;

    // Exactly one Running transition and one terminal event: the rejected
    // call produced zero deltas.
    let running_moves = events
        .iter()
        .filter(|e| {
            matches!(
                e,
                TaskEvent::StageChanged {
                    stage: TaskStage::Running
                }
            )
        })
        .count();
    assert_eq!(running_moves, 1);

    let record = orchestrator.get(id).await.unwrap();
    assert_eq!(record.stage, TaskStage::Completed);
    assert_eq!(record.logs.len(), SimulatedTransport::entry_count());
}

#[tokio::test]
async fn run_after_completion_is_rejected() {
    let orchestrator = fast_orchestrator();
    let id = orchestrator.submit("process sample batch", "Z:/lab1").await;

    wait_for_stage(&orchestrator, id, &TaskStage::AwaitingRun).await;
    orchestrator.run(id).await.unwrap();
    wait_for_stage(&orchestrator, id, &TaskStage::Completed).await;

    let err = orchestrator.run(id).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
}

#[tokio::test]
async fn cancel_mid_planning_stops_thought_emission() {
    // A wide inter-step delay keeps the planner between emissions while we
    // cancel, and gives it time to observe the flag afterwards.
    let config = OrchestratorConfig {
        planner: PlannerConfig {
            step_delay: Duration::from_millis(30),
        },
        bus: EventBusConfig::default(),
    };
    let orchestrator = Orchestrator::new(
        config,
        Arc::new(SimulatedTransport::new(SimulatedTransportConfig::instant())),
    );

    let id = orchestrator.submit("process sample batch", "Z:/lab1").await;
    let rx = orchestrator.subscribe(id).await.unwrap();

    tokio::time::sleep(Duration::from_millis(45)).await;
    orchestrator.cancel(id).await.unwrap();

    let events = drain(rx).await;
    assert!(matches!(
        events.last().unwrap(),
        TaskEvent::RunFinished {
            outcome: RunOutcome::Failed(FailureReason::Interrupted)
        }
    ));

    let record = orchestrator.get(id).await.unwrap();
    assert_eq!(record.stage, TaskStage::Failed(FailureReason::Interrupted));
    let frozen = record.thoughts.len();

    // The planner loop must wind down without appending anything further.
    tokio::time::sleep(Duration::from_millis(120)).await;
    let record = orchestrator.get(id).await.unwrap();
    assert_eq!(record.thoughts.len(), frozen);
    assert!(record.script.is_none());
}

#[tokio::test]
async fn concurrent_tasks_progress_independently() {
    let orchestrator = fast_orchestrator();

    let a = orchestrator.submit("batch A", "Z:/lab1").await;
    let b = orchestrator.submit("batch B", "Z:/lab2").await;

    wait_for_stage(&orchestrator, a, &TaskStage::AwaitingRun).await;
    wait_for_stage(&orchestrator, b, &TaskStage::AwaitingRun).await;

    orchestrator.run(a).await.unwrap();
    orchestrator.run(b).await.unwrap();

    wait_for_stage(&orchestrator, a, &TaskStage::Completed).await;
    wait_for_stage(&orchestrator, b, &TaskStage::Completed).await;

    let record_a = orchestrator.get(a).await.unwrap();
    let record_b = orchestrator.get(b).await.unwrap();
    assert!(record_a.script.unwrap().content.contains("Z:/lab1"));
    assert!(record_b.script.unwrap().content.contains("Z:/lab2"));
}

#[tokio::test]
async fn late_subscriber_sees_only_later_events() {
    let orchestrator = fast_orchestrator();
    let id = orchestrator.submit("process sample batch", "Z:/lab1").await;

    wait_for_stage(&orchestrator, id, &TaskStage::AwaitingRun).await;

    // Subscribing after planning: no thought backlog, only run events.
    let rx = orchestrator.subscribe(id).await.unwrap();
    orchestrator.run(id).await.unwrap();

    let events = drain(rx).await;
    assert!(events
        .iter()
        .all(|e| !matches!(e, TaskEvent::ThoughtAdded { .. })));
    assert!(matches!(
        events.last().unwrap(),
        TaskEvent::RunFinished { .. }
    ));
}
