//! Simulated execution transport
//!
//! Replays the telemetry of a recorded batch run: eight log lines with their
//! original relative pacing, then a per-sample read-count series. Stands in
//! for the remote execution node during development and tests.

use super::transport::{ExecutionTransport, TransportFrame};
use crate::task::{AnalysisResult, GeneratedScript, LogLevel, ResultKind, SeriesPoint, TaskId};
use async_trait::async_trait;
use biopilot_foundation::{Result, TransportSettings};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// One recorded telemetry line: delay relative to the previous line
struct TelemetryStep {
    delay_ms: u64,
    level: LogLevel,
    message: &'static str,
}

/// The recorded batch run, first delay measured from run start
const TELEMETRY: &[TelemetryStep] = &[
    TelemetryStep {
        delay_ms: 500,
        level: LogLevel::Info,
        message: "Connection established to muscle node (192.168.1.50)",
    },
    TelemetryStep {
        delay_ms: 700,
        level: LogLevel::Info,
        message: "Environment activated: obi3",
    },
    TelemetryStep {
        delay_ms: 800,
        level: LogLevel::Info,
        message: "Scanning target directory for pattern 'GZ*'",
    },
    TelemetryStep {
        delay_ms: 1500,
        level: LogLevel::Info,
        message: "Aligning paired ends for sample JC1 (threads: 16)",
    },
    TelemetryStep {
        delay_ms: 1500,
        level: LogLevel::Success,
        message: "Alignment complete: 145,203 reads processed",
    },
    TelemetryStep {
        delay_ms: 500,
        level: LogLevel::Info,
        message: "Filtering low quality reads (score > 0.8)",
    },
    TelemetryStep {
        delay_ms: 1500,
        level: LogLevel::Info,
        message: "Generating per-sample statistics",
    },
    TelemetryStep {
        delay_ms: 1000,
        level: LogLevel::Success,
        message: "Batch processing completed successfully, output saved",
    },
];

/// Simulated transport settings
#[derive(Debug, Clone)]
pub struct SimulatedTransportConfig {
    /// Scale factor applied to the recorded delays (0.0 = immediate)
    pub time_scale: f64,

    /// Frame channel capacity
    pub frame_capacity: usize,
}

impl Default for SimulatedTransportConfig {
    fn default() -> Self {
        Self {
            time_scale: 1.0,
            frame_capacity: 64,
        }
    }
}

impl SimulatedTransportConfig {
    pub fn from_settings(settings: &TransportSettings) -> Self {
        Self {
            time_scale: settings.time_scale,
            frame_capacity: settings.frame_capacity.max(1),
        }
    }

    /// Immediate replay, for tests
    pub fn instant() -> Self {
        Self {
            time_scale: 0.0,
            frame_capacity: 64,
        }
    }
}

/// Transport that replays the recorded run
pub struct SimulatedTransport {
    config: SimulatedTransportConfig,
}

impl SimulatedTransport {
    pub fn new(config: SimulatedTransportConfig) -> Self {
        Self { config }
    }

    /// Number of log lines a full replay emits
    pub fn entry_count() -> usize {
        TELEMETRY.len()
    }

    /// The result a full replay reports
    pub fn expected_result() -> AnalysisResult {
        AnalysisResult {
            title: "Results".to_string(),
            kind: ResultKind::Bar,
            series: vec![
                SeriesPoint::new("JC1", 145203.0),
                SeriesPoint::new("JC2", 132876.0),
                SeriesPoint::new("JC3", 151009.0),
                SeriesPoint::new("JC4", 98344.0),
            ],
        }
    }
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self::new(SimulatedTransportConfig::default())
    }
}

#[async_trait]
impl ExecutionTransport for SimulatedTransport {
    async fn submit_run(
        &self,
        task_id: TaskId,
        script: &GeneratedScript,
    ) -> Result<mpsc::Receiver<TransportFrame>> {
        let (tx, rx) = mpsc::channel(self.config.frame_capacity);
        let time_scale = self.config.time_scale;

        debug!(task = %task_id, language = %script.language, "Simulated run submitted");

        tokio::spawn(async move {
            for step in TELEMETRY {
                tokio::time::sleep(Duration::from_millis(step.delay_ms).mul_f64(time_scale)).await;

                let frame = TransportFrame::Log {
                    level: step.level,
                    message: step.message.to_string(),
                };
                if tx.send(frame).await.is_err() {
                    // Receiver dropped: the run was abandoned
                    debug!(task = %task_id, "Simulated run abandoned");
                    return;
                }
            }

            let _ = tx
                .send(TransportFrame::Completed(SimulatedTransport::expected_result()))
                .await;
        });

        Ok(rx)
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}
