//! Error types for jarbridge

use std::path::PathBuf;
use thiserror::Error;

/// Result type for jarbridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// jarbridge error types
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Toolchain artifact not found: {}", .0.display())]
    ArtifactNotFound(PathBuf),

    #[error("Artifact fetch failed: {0}")]
    Fetch(String),

    #[error("Artifact write failed: {0}")]
    Write(String),

    #[error("No active session: {0}")]
    NoActiveSession(String),

    #[error("Failed to spawn toolchain process: {0}")]
    Spawn(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
