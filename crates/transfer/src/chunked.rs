use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use md5::{Digest, Md5};

use crate::types::Chunk;
use crate::{DEFAULT_CHUNK_SIZE, TransferError};

// ---------------------------------------------------------------------------
// Digest helpers
// ---------------------------------------------------------------------------

/// Streaming MD5 over an archive, fed in strict offset order.
#[derive(Clone, Default)]
pub struct ArchiveDigest {
    hasher: Md5,
    bytes: u64,
}

impl ArchiveDigest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `data` to the digest.
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.bytes += data.len() as u64;
    }

    /// Number of bytes hashed so far.
    pub fn bytes_hashed(&self) -> u64 {
        self.bytes
    }

    /// Consumes the digest and returns the lowercase hex encoding.
    pub fn finalize_hex(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

/// Computes the MD5 of an entire file and returns the hex-encoded digest.
pub fn calculate_file_md5(path: &Path) -> Result<String, TransferError> {
    let mut file = std::fs::File::open(path)?;
    let mut digest = ArchiveDigest::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        digest.update(&buf[..n]);
    }
    Ok(digest.finalize_hex())
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// Reads a file in fixed-size chunks, in increasing offset order.
pub struct ChunkReader {
    file: std::fs::File,
    chunk_size: usize,
    offset: u64,
    file_size: u64,
}

impl ChunkReader {
    /// Opens `path` for chunked reading.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] (1 MiB) is used.
    pub fn new(path: &Path, chunk_size: usize) -> Result<Self, TransferError> {
        let file = std::fs::File::open(path)?;
        let file_size = file.metadata()?.len();
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Ok(Self {
            file,
            chunk_size,
            offset: 0,
            file_size,
        })
    }

    /// Seeks to the given byte offset (for resume).
    pub fn seek_to(&mut self, offset: u64) -> Result<(), TransferError> {
        if offset > self.file_size {
            return Err(TransferError::InvalidPath(format!(
                "offset {offset} is past the end of a {} byte file",
                self.file_size
            )));
        }
        self.file.seek(SeekFrom::Start(offset))?;
        self.offset = offset;
        Ok(())
    }

    /// Reads the next chunk. Returns `None` at EOF.
    ///
    /// Every chunk except the last is exactly `chunk_size` bytes.
    pub fn next_chunk(&mut self) -> Result<Option<Chunk>, TransferError> {
        let remaining = self.remaining();
        if remaining == 0 {
            return Ok(None);
        }

        let read_size = remaining.min(self.chunk_size as u64) as usize;
        let mut buf = vec![0u8; read_size];
        let n = read_full(&mut self.file, &mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);

        let chunk = Chunk {
            offset: self.offset,
            data: buf,
        };
        self.offset += n as u64;
        Ok(Some(chunk))
    }

    /// Feeds the bytes from the current offset up to `end` into `digest`
    /// without producing chunks. Leaves the reader positioned at `end`.
    ///
    /// Used on resume so the final digest still covers the whole archive.
    pub fn feed_until(&mut self, end: u64, digest: &mut ArchiveDigest) -> Result<(), TransferError> {
        if end > self.file_size || end < self.offset {
            return Err(TransferError::InvalidPath(format!(
                "cannot hash from {} to {end} in a {} byte file",
                self.offset, self.file_size
            )));
        }
        let mut buf = vec![0u8; self.chunk_size.min(64 * 1024)];
        while self.offset < end {
            let want = ((end - self.offset) as usize).min(buf.len());
            let n = read_full(&mut self.file, &mut buf[..want])?;
            if n == 0 {
                return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
            }
            digest.update(&buf[..n]);
            self.offset += n as u64;
        }
        Ok(())
    }

    /// Current byte offset.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Total file size in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Bytes remaining to read.
    pub fn remaining(&self) -> u64 {
        self.file_size.saturating_sub(self.offset)
    }

    /// Nominal chunk size.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of chunks needed to cover the remaining bytes.
    pub fn chunks_remaining(&self) -> u64 {
        self.remaining().div_ceil(self.chunk_size as u64)
    }
}

/// Reads until `buf` is full or EOF; returns the number of bytes read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(data).unwrap();
        path
    }

    #[test]
    fn md5_of_known_input() {
        let mut digest = ArchiveDigest::new();
        digest.update(b"hello world");
        assert_eq!(digest.bytes_hashed(), 11);
        assert_eq!(digest.finalize_hex(), "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[test]
    fn md5_of_empty_input() {
        assert_eq!(
            ArchiveDigest::new().finalize_hex(),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
    }

    #[test]
    fn incremental_digest_matches_file_digest() {
        let dir = TempDir::new().unwrap();
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let path = create_test_file(dir.path(), "test.bin", &data);

        let mut reader = ChunkReader::new(&path, 999).unwrap();
        let mut digest = ArchiveDigest::new();
        while let Some(chunk) = reader.next_chunk().unwrap() {
            digest.update(&chunk.data);
        }
        assert_eq!(digest.finalize_hex(), calculate_file_md5(&path).unwrap());
    }

    #[test]
    fn short_last_chunk() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "repo.zip", b"PK\x03\x04zipdata");

        let mut reader = ChunkReader::new(&path, 5).unwrap();
        assert_eq!((reader.file_size(), reader.chunks_remaining()), (11, 3));

        let chunks: Vec<_> = std::iter::from_fn(|| reader.next_chunk().unwrap()).collect();
        let ranges: Vec<_> = chunks.iter().map(|c| (c.offset, c.end())).collect();
        assert_eq!(ranges, vec![(0, 5), (5, 10), (10, 11)]);
        assert_eq!(&chunks[2].data, b"a");
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn chunks_cover_file_without_gaps() {
        let dir = TempDir::new().unwrap();
        let size = 2 * 1024 * 1024 + 512 * 1024; // 2.5 MiB
        let path = create_test_file(dir.path(), "big.bin", &vec![7u8; size]);

        let mut reader = ChunkReader::new(&path, DEFAULT_CHUNK_SIZE).unwrap();
        let mut next = 0u64;
        let mut lengths = Vec::new();
        while let Some(chunk) = reader.next_chunk().unwrap() {
            assert_eq!(chunk.offset, next);
            next = chunk.end();
            lengths.push(chunk.len());
        }
        assert_eq!(next, size as u64);
        assert_eq!(lengths, vec![1024 * 1024, 1024 * 1024, 512 * 1024]);
    }

    #[test]
    fn evenly_divisible_file_ends_with_full_chunk() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "even.bin", &[1u8; 12]);

        let mut reader = ChunkReader::new(&path, 4).unwrap();
        let mut lengths = Vec::new();
        while let Some(chunk) = reader.next_chunk().unwrap() {
            lengths.push(chunk.len());
        }
        assert_eq!(lengths, vec![4, 4, 4]);
    }

    #[test]
    fn resume_reads_from_acknowledged_offset() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "repo.zip", b"acknowledged|pending");

        let mut reader = ChunkReader::new(&path, 64).unwrap();
        reader.seek_to(13).unwrap();
        assert_eq!((reader.offset(), reader.remaining()), (13, 7));

        let rest = reader.next_chunk().unwrap().unwrap();
        assert_eq!((rest.offset, rest.data.as_slice()), (13, &b"pending"[..]));
        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn seek_past_end_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"abc");
        let mut reader = ChunkReader::new(&path, 4).unwrap();
        assert!(reader.seek_to(4).is_err());
    }

    #[test]
    fn feed_until_hashes_prefix_and_positions_reader() {
        let dir = TempDir::new().unwrap();
        let data = b"The quick brown fox jumps over the lazy dog";
        let path = create_test_file(dir.path(), "test.txt", data);

        let mut reader = ChunkReader::new(&path, 8).unwrap();
        let mut digest = ArchiveDigest::new();
        reader.feed_until(20, &mut digest).unwrap();
        assert_eq!(reader.offset(), 20);
        assert_eq!(digest.bytes_hashed(), 20);

        let next = reader.next_chunk().unwrap().unwrap();
        assert_eq!(next.offset, 20);
        digest.update(&next.data);
        while let Some(chunk) = reader.next_chunk().unwrap() {
            digest.update(&chunk.data);
        }
        assert_eq!(digest.finalize_hex(), calculate_file_md5(&path).unwrap());
    }

    #[test]
    fn feed_until_rejects_backwards_range() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"0123456789");
        let mut reader = ChunkReader::new(&path, 4).unwrap();
        reader.seek_to(5).unwrap();
        let mut digest = ArchiveDigest::new();
        assert!(reader.feed_until(2, &mut digest).is_err());
        assert!(reader.feed_until(11, &mut digest).is_err());
    }

    #[test]
    fn zero_chunk_size_means_default() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "repo.zip", b"z");
        assert_eq!(ChunkReader::new(&path, 0).unwrap().chunk_size(), DEFAULT_CHUNK_SIZE);
    }
}
