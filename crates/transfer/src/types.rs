use chrono::{DateTime, Utc};
use matrix_protocol::{ChunkAck, ContentRange};
use tracing::warn;

/// A contiguous byte range of the archive being uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Byte offset of the first byte within the archive.
    pub offset: u64,
    /// Raw chunk data.
    pub data: Vec<u8>,
}

impl Chunk {
    /// Number of bytes in the chunk.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Offset one past the last byte of the chunk.
    pub fn end(&self) -> u64 {
        self.offset + self.data.len() as u64
    }

    /// `Content-Range` for this chunk inside an archive of `total` bytes.
    pub fn content_range(&self, total: u64) -> Option<ContentRange> {
        ContentRange::new(self.offset, self.data.len() as u64, total)
    }
}

/// Server-side upload session as last acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadSession {
    /// Opaque id assigned by the server on the first chunk.
    pub upload_id: String,
    /// Bytes acknowledged so far.
    pub offset: u64,
    pub expires: Option<DateTime<Utc>>,
}

impl UploadSession {
    /// Session resumed from a local record; expiry is unknown until the next ack.
    pub fn resumed(upload_id: String, offset: u64) -> Self {
        Self {
            upload_id,
            offset,
            expires: None,
        }
    }
}

impl From<ChunkAck> for UploadSession {
    fn from(ack: ChunkAck) -> Self {
        Self {
            upload_id: ack.upload_id,
            offset: ack.offset,
            expires: ack.expires,
        }
    }
}

/// Lifecycle of one archive transfer.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum UploadState {
    /// No session established yet.
    #[default]
    Fresh,
    /// Session established, more bytes to send.
    InProgress(UploadSession),
    /// Finalize acknowledged.
    Complete,
}

impl UploadState {
    /// Upload id to attach to the next chunk, if a session exists.
    pub fn upload_id(&self) -> Option<&str> {
        match self {
            Self::InProgress(session) => Some(&session.upload_id),
            Self::Fresh | Self::Complete => None,
        }
    }

    /// Bytes the server has acknowledged (0 before the first ack).
    pub fn acknowledged(&self) -> u64 {
        match self {
            Self::InProgress(session) => session.offset,
            Self::Fresh | Self::Complete => 0,
        }
    }

    pub fn session(&self) -> Option<&UploadSession> {
        match self {
            Self::InProgress(session) => Some(session),
            Self::Fresh | Self::Complete => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Applies a chunk acknowledgement.
    ///
    /// The first ack establishes the session. Later acks move the offset;
    /// the session id established first is kept.
    pub fn acknowledge(&mut self, ack: ChunkAck) {
        match self {
            Self::Fresh | Self::Complete => {
                *self = Self::InProgress(ack.into());
            }
            Self::InProgress(session) => {
                if ack.upload_id != session.upload_id {
                    warn!(
                        expected = %session.upload_id,
                        got = %ack.upload_id,
                        "server acknowledged chunk under a different upload id"
                    );
                }
                session.offset = ack.offset;
                if ack.expires.is_some() {
                    session.expires = ack.expires;
                }
            }
        }
    }

    /// Marks the transfer finalized.
    pub fn complete(&mut self) {
        *self = Self::Complete;
    }
}
