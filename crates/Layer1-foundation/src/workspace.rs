//! Workspace directory catalog
//!
//! The planner consumes a working directory as a template parameter only;
//! no filesystem access happens here. The catalog mirrors the data shares
//! mounted on the lab's analysis node.

use serde::{Deserialize, Serialize};

/// A selectable working directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkDir {
    /// Human-readable label
    pub name: String,

    /// Path as seen from the execution node
    pub path: String,
}

impl WorkDir {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Supplies the directories a request may target
pub trait WorkspaceProvider: Send + Sync {
    /// All selectable directories, in display order
    fn directories(&self) -> Vec<WorkDir>;

    /// The directory preselected for new requests
    fn default_directory(&self) -> Option<WorkDir> {
        self.directories().into_iter().next()
    }
}

/// Static catalog of mounted data shares
#[derive(Debug, Clone)]
pub struct StaticWorkspace {
    dirs: Vec<WorkDir>,
}

impl StaticWorkspace {
    pub fn new(dirs: Vec<WorkDir>) -> Self {
        Self { dirs }
    }
}

impl Default for StaticWorkspace {
    fn default() -> Self {
        Self::new(vec![
            WorkDir::new("Sequencing 2023-11", "Z:/BioData/2023_11"),
            WorkDir::new("Sequencing 2024-03", "Z:/BioData/2024_03"),
            WorkDir::new("Reference DBs", "Z:/BioData/refs"),
        ])
    }
}

impl WorkspaceProvider for StaticWorkspace {
    fn directories(&self) -> Vec<WorkDir> {
        self.dirs.clone()
    }
}
