//! Unified configuration
//!
//! Search priority:
//!
//! 1. User-level: `~/.biopilot/biopilot.toml`
//! 2. Project-level: `./biopilot.toml`
//!
//! Project-level settings override user-level ones wholesale (no merging).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Config directory name (user level)
pub const CONFIG_DIR_NAME: &str = ".biopilot";

/// Config file name
pub const CONFIG_FILE: &str = "biopilot.toml";

// ============================================================================
// PilotConfig - unified settings
// ============================================================================

/// BioPilot unified settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PilotConfig {
    /// Planning stage settings
    #[serde(default)]
    pub planner: PlannerSettings,

    /// Execution transport settings
    #[serde(default)]
    pub transport: TransportSettings,

    /// Event bus settings
    #[serde(default)]
    pub bus: BusSettings,
}

/// Planning stage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerSettings {
    /// Delay before each reasoning step, in milliseconds
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            step_delay_ms: default_step_delay_ms(),
        }
    }
}

fn default_step_delay_ms() -> u64 {
    1200
}

/// Execution transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSettings {
    /// Scale factor applied to the simulated telemetry schedule.
    /// 1.0 replays the recorded pacing; 0.0 emits everything immediately.
    #[serde(default = "default_time_scale")]
    pub time_scale: f64,

    /// Frame channel capacity between transport and execution stage
    #[serde(default = "default_frame_capacity")]
    pub frame_capacity: usize,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            time_scale: default_time_scale(),
            frame_capacity: default_frame_capacity(),
        }
    }
}

fn default_time_scale() -> f64 {
    1.0
}

fn default_frame_capacity() -> usize {
    64
}

/// Event bus settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusSettings {
    /// Per-task broadcast channel capacity
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_channel_capacity() -> usize {
    1024
}

impl PilotConfig {
    /// Load from an explicit file path
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PilotConfig = toml::from_str(&content)?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Load from the default search paths, falling back to defaults when no
    /// file exists. A file that exists but fails to parse is an error, not a
    /// silent fallback.
    pub fn load_default_locations(working_dir: &Path) -> Result<Self> {
        for path in Self::search_paths(working_dir) {
            if path.is_file() {
                return Self::load(&path);
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Search paths in ascending priority; the first existing file wins
    /// (project before user).
    fn search_paths(working_dir: &Path) -> Vec<PathBuf> {
        let mut paths = vec![working_dir.join(CONFIG_FILE)];

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(CONFIG_DIR_NAME).join(CONFIG_FILE));
        }

        paths
    }

    /// Validate ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.transport.time_scale < 0.0 {
            return Err(Error::Config(format!(
                "transport.time_scale must be >= 0.0, got {}",
                self.transport.time_scale
            )));
        }
        if self.bus.channel_capacity == 0 {
            return Err(Error::Config(
                "bus.channel_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
