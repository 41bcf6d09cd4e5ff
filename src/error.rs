//! Error taxonomy shared by every component.
//!
//! State-machine violations (`AlreadyRunning`, `NotRunning`, `NoActiveServer`,
//! `Busy`) are always recoverable by retrying in the right order. Process and
//! filesystem failures carry their source so the front end can report them.

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum KeeperError {
    #[error("Server process is already running")]
    AlreadyRunning,

    #[error("Server process is not running")]
    NotRunning,

    #[error("No active server selected")]
    NoActiveServer,

    #[error("Busy: {0}")]
    Busy(String),

    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

pub type Result<T, E = KeeperError> = std::result::Result<T, E>;

impl KeeperError {
    /// Machine readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AlreadyRunning => "ALREADY_RUNNING",
            Self::NotRunning => "NOT_RUNNING",
            Self::NoActiveServer => "NO_ACTIVE_SERVER",
            Self::Busy(_) => "BUSY",
            Self::Spawn { .. } => "SPAWN_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Timeout(_) => "TIMEOUT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the caller can fix the failure by retrying the right sequence.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::AlreadyRunning
                | Self::NotRunning
                | Self::NoActiveServer
                | Self::Busy(_)
                | Self::Timeout(_)
        )
    }

    /// JSON error body for front ends that relay errors verbatim.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "success": false,
            "error": self.to_string(),
            "error_code": self.error_code(),
        })
    }
}
