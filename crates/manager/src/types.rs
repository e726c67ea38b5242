//! Data types for the commit flow.

use std::path::PathBuf;
use std::time::Duration;

/// Backoff applied while the server keeps acknowledging an offset short of
/// the chunk just sent.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Consecutive non-advancing acknowledgements tolerated before failing.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(8),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before re-sending after the given attempt (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }
}

/// Progress event emitted during a commit.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    /// The archive was (re)built.
    ArchiveBuilt { files: usize, size: u64 },
    /// An interrupted session is being continued.
    Resumed { upload_id: String, offset: u64 },
    /// The server acknowledged bytes up to `offset`.
    Acknowledged { offset: u64, total: u64 },
    /// The server is behind; the range from `offset` is sent again.
    Retrying { offset: u64, attempt: u32 },
    /// Finalize succeeded.
    Completed { upload_id: String, md5: String },
}

/// Result of a successful commit.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitOutcome {
    pub upload_id: String,
    /// Hex MD5 of the whole archive.
    pub md5: String,
    pub total_bytes: u64,
    /// Whether an earlier session was continued.
    pub resumed: bool,
    /// Server response to the finalize call.
    pub response: serde_json::Value,
    /// Archive that was uploaded (already deleted on success).
    pub archive: PathBuf,
}
