//! Local side of a resumable repository upload.
//!
//! - [`archive`] zips a project directory into a single staging archive
//!   (and extracts template archives)
//! - [`chunked`] reads that archive in fixed-size chunks and keeps a
//!   streaming MD5 of the acknowledged bytes
//! - [`history`] persists the server-acknowledged session so a later run
//!   can resume

pub mod archive;
mod chunked;
pub mod history;
mod progress;
mod types;
mod validation;

use std::path::{Path, PathBuf};

pub use archive::{ArchiveSummary, EXCLUDED_DIRS, build_archive, extract_archive, is_excluded};
pub use chunked::{ArchiveDigest, ChunkReader, calculate_file_md5};
pub use history::{ProgressRecord, RecordState};
pub use progress::SpeedCalculator;
pub use types::{Chunk, UploadSession, UploadState};
pub use validation::validate_relative_path;

/// Default chunk size: 1 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Name of the staging directory inside a project.
pub const STAGING_DIR: &str = ".temp";

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("progress record error: {0}")]
    Record(#[from] serde_json::Error),
}

/// Locations of the staging files for one project directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingPaths {
    dir: PathBuf,
}

impl StagingPaths {
    /// Staging layout under `project_dir/.temp`.
    pub fn new(project_dir: &Path) -> Self {
        Self {
            dir: project_dir.join(STAGING_DIR),
        }
    }

    /// The staging directory itself.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<project>/.temp/repo.zip`
    pub fn archive(&self) -> PathBuf {
        self.dir.join("repo.zip")
    }

    /// `<project>/.temp/history.json`
    pub fn history(&self) -> PathBuf {
        self.dir.join("history.json")
    }
}
