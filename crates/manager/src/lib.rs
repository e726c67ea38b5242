//! Project management for Matrix model repositories.
//!
//! Everything `matrix-admin` does to a project directory lives here; the
//! binary only parses arguments and renders progress.
//!
//! # Commit
//!
//! 1. **Resume check**: read `.temp/history.json`, ask whether to continue
//! 2. **Archive**: zip the project into `.temp/repo.zip` (fresh runs only)
//! 3. **Upload**: send ranges sequentially, persisting each acknowledgement
//! 4. **Finalize**: submit the MD5 and repository settings, clear staging

pub mod commit;
pub mod docker;
pub mod error;
pub mod lifecycle;
pub mod scaffold;
pub mod settings;
pub mod types;

pub use commit::{CommitConfig, ResumePrompt, Uploader};
pub use docker::{CommandReport, Docker};
pub use error::ManagerError;
pub use lifecycle::{build_remote, delete_repo};
pub use scaffold::{ProjectKind, ProjectOptions, setup_project, update_dockerfile};
pub use settings::{DockerSettings, ProjectSettings, SETTINGS_FILE, TOKEN_ENV};
pub use types::{CommitOutcome, RetryPolicy, UploadEvent};
