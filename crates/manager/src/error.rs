//! Manager error types.

use std::path::PathBuf;

/// Errors produced by project management operations.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transfer error: {0}")]
    Transfer(#[from] matrix_transfer::TransferError),

    #[error("{0}")]
    Client(#[from] matrix_client::Error),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] matrix_pipeline::PipelineError),

    #[error("invalid settings in {path}: {reason}")]
    Settings { path: PathBuf, reason: String },

    #[error("server stayed at offset {acknowledged} instead of {expected} after {attempts} attempts")]
    OffsetMismatch {
        expected: u64,
        acknowledged: u64,
        attempts: u32,
    },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("`{command}` failed: {reason}")]
    Command { command: String, reason: String },

    #[error("sample check failed: {0}")]
    Samples(String),

    #[error("invalid project: {0}")]
    Project(String),

    #[error("cancelled")]
    Cancelled,
}
