//! BioPilot CLI - Main entry point
//!
//! One observer over the task event stream: submits a request, prints the
//! reasoning trace, the generated script and the live run log as they arrive,
//! and exits when the task reaches a terminal stage.

use anyhow::{bail, Context};
use biopilot_foundation::{PilotConfig, StaticWorkspace, WorkspaceProvider};
use biopilot_task::{
    Orchestrator, OrchestratorConfig, RunOutcome, SimulatedTransport, SimulatedTransportConfig,
    TaskEvent, TaskId, TaskStage,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

/// BioPilot - conversational pipeline assistant for the lab's execution node
#[derive(Parser, Debug)]
#[command(name = "biopilot")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Natural-language request to plan and execute
    request: Option<String>,

    /// Working directory the request targets (defaults to the first
    /// catalog entry)
    #[arg(short, long)]
    workdir: Option<String>,

    /// Configuration file path (overrides the default search)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Generate the script but do not start the run
    #[arg(long)]
    plan_only: bool,

    /// List the workspace directory catalog and exit
    #[arg(long)]
    list_dirs: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let workspace = StaticWorkspace::default();

    if args.list_dirs {
        for dir in workspace.directories() {
            println!("{}  {}", dir.path, dir.name);
        }
        return Ok(());
    }

    let Some(request) = args.request else {
        bail!("no request given (try: biopilot \"process sample batch\")");
    };

    let config = match &args.config {
        Some(path) => PilotConfig::load(path)?,
        None => PilotConfig::load_default_locations(&std::env::current_dir()?)?,
    };
    config.validate()?;

    let workdir = match args.workdir {
        Some(dir) => dir,
        None => {
            workspace
                .default_directory()
                .context("workspace catalog is empty")?
                .path
        }
    };

    let transport = Arc::new(SimulatedTransport::new(
        SimulatedTransportConfig::from_settings(&config.transport),
    ));
    let orchestrator = Orchestrator::new(OrchestratorConfig::from_pilot_config(&config), transport);

    let task_id = orchestrator.submit(&request, &workdir).await;
    let events = orchestrator
        .subscribe(task_id)
        .await
        .context("task stream closed before it started")?;

    println!("task {}  [{}]", task_id, workdir);
    let outcome = observe(&orchestrator, task_id, events, args.plan_only).await?;

    match outcome {
        Some(RunOutcome::Completed(result)) => {
            println!();
            println!("== {} ==", result.title);
            for point in &result.series {
                println!("  {:<8} {:>10.0}", point.name, point.value);
            }
            Ok(())
        }
        Some(RunOutcome::Failed(reason)) => bail!("task failed: {}", reason),
        // Plan-only: stop once the script is on screen
        None => Ok(()),
    }
}

/// Print events as they arrive; returns the terminal outcome, or `None` when
/// stopping at the generated script (--plan-only).
async fn observe(
    orchestrator: &Orchestrator,
    task_id: TaskId,
    mut events: broadcast::Receiver<TaskEvent>,
    plan_only: bool,
) -> anyhow::Result<Option<RunOutcome>> {
    loop {
        match events.recv().await {
            Ok(TaskEvent::ThoughtAdded { thought }) => {
                println!("  · {}", thought);
            }
            Ok(TaskEvent::PlanningFinished { script }) => {
                println!();
                println!("--- generated {} script ---", script.language);
                print!("{}", script.content);
                println!("---------------------------");

                if plan_only {
                    return Ok(None);
                }
            }
            Ok(TaskEvent::StageChanged { stage }) => {
                println!("{} {}", stage.symbol(), stage);

                // The run command is ours to give once planning settles.
                if stage == TaskStage::AwaitingRun {
                    orchestrator.run(task_id).await?;
                }
            }
            Ok(TaskEvent::LogAppended { entry }) => {
                println!(
                    "  [{}] {:<7} {}",
                    entry.timestamp.format("%H:%M:%S"),
                    entry.level.as_str(),
                    entry.message
                );
            }
            Ok(TaskEvent::RunFinished { outcome }) => {
                return Ok(Some(outcome));
            }
            Err(broadcast::error::RecvError::Closed) => {
                bail!("event stream closed without a terminal event");
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                eprintln!("(warning: observer lagged, {} events skipped)", missed);
            }
        }
    }
}
