//! Error types for BioPilot
//!
//! Central error taxonomy shared by every layer.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// BioPilot error type
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // Task lifecycle
    // ========================================================================
    /// A delta was inconsistent with the task's current stage. Local and
    /// non-fatal: the store rejects the mutation and nothing changes.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// An operation was invoked against the wrong stage (e.g. a second `run`
    /// while already running). Reported to the caller, never fatal.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A stage was cancelled while in flight. Terminal for the task.
    #[error("Interrupted")]
    Interrupted,

    /// The execution transport failed. Terminal for the task; the transport's
    /// detail is attached.
    #[error("Collaborator error: {transport} - {message}")]
    Collaborator { transport: String, message: String },

    // ========================================================================
    // General
    // ========================================================================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ========================================================================
    // External error conversions
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    // ========================================================================
    // Misc
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Rejections leave the task untouched; the caller may simply report them.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Error::InvalidTransition(_) | Error::InvalidState(_))
    }

    /// Errors that end the task's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Error::Interrupted | Error::Collaborator { .. })
    }

    /// Collaborator error helper
    pub fn collaborator(transport: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Collaborator {
            transport: transport.into(),
            message: message.into(),
        }
    }

    /// Invalid transition helper
    pub fn invalid_transition(message: impl Into<String>) -> Self {
        Error::InvalidTransition(message.into())
    }

    /// Invalid state helper
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Error::InvalidState(message.into())
    }
}

// ============================================================================
// From impls (extra conversions)
// ============================================================================

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}
