use std::path::{Path, PathBuf};

/// Errors raised while loading inputs or running a pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A pipeline stage failed.
    #[error("{task} pipeline with model `{model}` failed: {reason}")]
    Failed {
        task: String,
        model: String,
        reason: String,
    },

    #[error("the inputs are empty")]
    EmptyInput,

    #[error("invalid device `{0}`, expected cpu, cuda, cuda:N or an integer")]
    InvalidDevice(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl PipelineError {
    /// Stage failure for `task` run with `model`.
    pub fn failed(task: impl Into<String>, model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            task: task.into(),
            model: model.into(),
            reason: reason.into(),
        }
    }
}

/// Writes `message` to `<dir>/error/error.txt`, where the platform looks
/// for a failed run's explanation.
pub fn write_error(dir: &Path, message: &str) -> std::io::Result<PathBuf> {
    let error_dir = dir.join("error");
    std::fs::create_dir_all(&error_dir)?;
    let path = error_dir.join("error.txt");
    std::fs::write(&path, message)?;
    Ok(path)
}
