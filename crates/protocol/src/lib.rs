//! Wire types for the Matrix model-hosting API.
//!
//! Everything that crosses the HTTP boundary lives here so the client,
//! the uploader and the CLI agree on field names and formats.

pub mod constants;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use constants::{DEFAULT_SERVER_URI, Endpoint};
pub use messages::{ChunkAck, FileInfo, FileUploadResponse, ModelInputs, ModelRequest, TaskResponse};
pub use types::{ContentRange, Framework, InputKind, ParseError, RepoSettings};
