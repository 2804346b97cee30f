//! Planning stage
//!
//! A scripted planner: a fixed ordered sequence of reasoning steps,
//! parameterized by the request and working directory, emitted one at a time
//! with a bounded inter-step delay, followed by exactly one generated script.
//! Replacing this with a real planning model only means replacing the step
//! and script producers; the delta/event semantics stay the same.

use crate::context::StageContext;
use crate::stage::FailureReason;
use crate::store::TaskDelta;
use crate::task::{GeneratedScript, TaskId};
use biopilot_foundation::PlannerSettings;
use std::time::Duration;
use tracing::{debug, warn};

/// Planning stage settings
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Delay before each reasoning step
    pub step_delay: Duration,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            step_delay: Duration::from_millis(1200),
        }
    }
}

impl PlannerConfig {
    pub fn from_settings(settings: &PlannerSettings) -> Self {
        Self {
            step_delay: Duration::from_millis(settings.step_delay_ms),
        }
    }
}

/// Drives a task from `Planning` to `AwaitingRun`
#[derive(Debug, Clone)]
pub struct PlanningStage {
    config: PlannerConfig,
}

impl PlanningStage {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    /// The reasoning steps for a request, in emission order
    pub fn thought_sequence(request: &str, working_directory: &str) -> Vec<String> {
        vec![
            format!("Analyzing request intent: \"{}\"", request),
            format!(
                "Scanning {} for paired FASTQ files (pattern 'GZ*')",
                working_directory
            ),
            "Matched 20 read files across 4 samples (JC1..JC4)".to_string(),
            "Retrieved protocol notes: OBITools3 standard metabarcoding workflow".to_string(),
            "Checking execution node capacity: 256GB RAM, 16 threads available".to_string(),
            "Execution plan ready: import -> align -> filter -> stats".to_string(),
            "Drafting shell script for the obi3 environment".to_string(),
        ]
    }

    /// The template-filled script a finished plan produces
    pub fn render_script(working_directory: &str) -> GeneratedScript {
        GeneratedScript::bash(format!(
            r#"#!/usr/bin/env bash
set -euo pipefail

# Target workspace: {dir}
source activate obi3
cd "{dir}"

obi import --fastq-input 'GZ*_R1.fastq.gz' reads/r1
obi import --fastq-input 'GZ*_R2.fastq.gz' reads/r2
obi alignpairedend -R reads/r2 reads/r1 aligned
obi grep -p "sequence['score_norm'] > 0.8" aligned filtered
obi stats -c sample filtered
"#,
            dir = working_directory
        ))
    }

    /// Run the stage to completion. Every failure path leaves the task in a
    /// terminal stage; this never returns an error to the spawner.
    pub async fn run(&self, ctx: &StageContext, task_id: TaskId) {
        let Some(snapshot) = ctx.snapshot(task_id).await else {
            warn!(task = %task_id, "Planning started for unknown task");
            return;
        };

        let thoughts = Self::thought_sequence(&snapshot.request, &snapshot.working_directory);

        for thought in thoughts {
            tokio::time::sleep(self.config.step_delay).await;

            if ctx.is_cancelled() {
                debug!(task = %task_id, "Planning observed cancellation");
                ctx.fail(task_id, FailureReason::Interrupted).await;
                return;
            }

            if let Err(err) = ctx.apply(task_id, TaskDelta::AddThought(thought)).await {
                // Stage advanced underneath us; a partial plan is discarded,
                // never resumed.
                debug!(task = %task_id, error = %err, "Planning aborted");
                ctx.fail(task_id, FailureReason::Interrupted).await;
                return;
            }
        }

        if ctx.is_cancelled() {
            ctx.fail(task_id, FailureReason::Interrupted).await;
            return;
        }

        let script = Self::render_script(&snapshot.working_directory);
        if let Err(err) = ctx.apply(task_id, TaskDelta::SetScript(script)).await {
            debug!(task = %task_id, error = %err, "Script emission rejected");
            ctx.fail(task_id, FailureReason::Interrupted).await;
            return;
        }

        debug!(task = %task_id, "Planning finished");
    }
}
