//! Local progress record (`.temp/history.json`).
//!
//! The record mirrors the last server acknowledgement: `offset` is always
//! what the server confirmed, never what was merely sent.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::TransferError;

/// On-disk mirror of the last acknowledged upload session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub upload_id: String,
    pub offset: u64,
}

/// Result of looking for a progress record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordState {
    /// No record on disk.
    Missing,
    /// A record exists but cannot be used; the reason is for logging.
    Malformed(String),
    Valid(ProgressRecord),
}

/// Tolerant shape used to tell "missing field" apart from "not JSON".
#[derive(Deserialize)]
struct RawRecord {
    upload_id: Option<String>,
    offset: Option<u64>,
}

impl ProgressRecord {
    /// Reads the record at `path`.
    ///
    /// Unreadable or incomplete records are reported as
    /// [`RecordState::Malformed`] rather than errors; only I/O failures
    /// other than "not found" are returned as `Err`.
    pub fn load(path: &Path) -> Result<RecordState, TransferError> {
        let content = match std::fs::read(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(RecordState::Missing),
            Err(e) => return Err(e.into()),
        };

        let raw: RawRecord = match serde_json::from_slice(&content) {
            Ok(raw) => raw,
            Err(e) => return Ok(RecordState::Malformed(format!("not a valid record: {e}"))),
        };

        match (raw.upload_id.filter(|id| !id.is_empty()), raw.offset) {
            (Some(upload_id), Some(offset)) => {
                Ok(RecordState::Valid(ProgressRecord { upload_id, offset }))
            }
            (None, _) => Ok(RecordState::Malformed("missing upload_id".into())),
            (Some(_), None) => Ok(RecordState::Malformed("missing offset".into())),
        }
    }

    /// Writes the record, replacing any previous one atomically.
    pub fn save(&self, path: &Path) -> Result<(), TransferError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(self)?)?;
        std::fs::rename(&tmp, path)?;
        debug!(path = %path.display(), offset = self.offset, "progress record saved");
        Ok(())
    }

    /// Deletes the record at `path`; a missing record is not an error.
    pub fn remove(path: &Path) -> Result<(), TransferError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
