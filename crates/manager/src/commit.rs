//! Resumable repository upload.
//!
//! A commit zips the project into `.temp/repo.zip`, sends it chunk by
//! chunk and finalizes with the archive MD5 and the repository settings.
//! After every acknowledged chunk the session is written to
//! `.temp/history.json`, so an interrupted commit can continue where the
//! server left off.
//!
//! Only one chunk is in flight at a time. The local offset never runs
//! ahead of the server: if an acknowledgement falls short of the chunk
//! just sent, the uploader re-reads from the acknowledged offset and
//! sends again after a backoff delay.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use matrix_client::Client;
use matrix_protocol::{ChunkAck, RepoSettings};
use matrix_transfer::{
    ArchiveDigest, Chunk, ChunkReader, ProgressRecord, RecordState, StagingPaths, TransferError,
    UploadSession, UploadState, build_archive,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ManagerError;
use crate::settings::ProjectSettings;
use crate::types::{CommitOutcome, RetryPolicy, UploadEvent};

/// Decides whether an interrupted upload should be continued.
///
/// Only consulted when a valid progress record and its archive both exist.
pub trait ResumePrompt {
    fn confirm_resume(&mut self, record: &ProgressRecord, archive_size: u64) -> bool;
}

impl<F> ResumePrompt for F
where
    F: FnMut(&ProgressRecord, u64) -> bool,
{
    fn confirm_resume(&mut self, record: &ProgressRecord, archive_size: u64) -> bool {
        self(record, archive_size)
    }
}

/// What a commit needs to know about the project.
#[derive(Debug, Clone)]
pub struct CommitConfig {
    pub project_dir: PathBuf,
    pub repo: RepoSettings,
    pub chunk_size: usize,
    pub retry: RetryPolicy,
}

impl CommitConfig {
    pub fn from_settings(project_dir: &Path, settings: &ProjectSettings) -> Self {
        Self {
            project_dir: project_dir.to_path_buf(),
            repo: settings.repo_settings(),
            chunk_size: settings.upload.chunk_size,
            retry: settings.retry_policy(),
        }
    }
}

/// Where a commit starts from.
enum Start {
    Fresh,
    Resume(ProgressRecord),
}

/// Uploads a project directory as a repository archive.
pub struct Uploader {
    client: Client,
    config: CommitConfig,
    staging: StagingPaths,
    events_tx: mpsc::Sender<UploadEvent>,
    events_rx: Option<mpsc::Receiver<UploadEvent>>,
    cancel: CancellationToken,
}

impl Uploader {
    pub fn new(client: Client, config: CommitConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        Self {
            client,
            staging: StagingPaths::new(&config.project_dir),
            config,
            events_tx,
            events_rx: Some(events_rx),
            cancel: CancellationToken::new(),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx.take()
    }

    /// Returns a cancellation token for this upload.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Staging paths of the project being uploaded.
    pub fn staging(&self) -> &StagingPaths {
        &self.staging
    }

    /// Runs the commit to completion.
    ///
    /// On failure the progress record of the last acknowledged chunk stays
    /// on disk; on success the record and the archive are removed.
    pub async fn commit<P>(&self, prompt: &mut P) -> Result<CommitOutcome, ManagerError>
    where
        P: ResumePrompt + ?Sized,
    {
        self.check_cancelled()?;

        let start = self.choose_start(prompt)?;
        let archive = self.staging.archive();
        let (resumed, mut state) = match start {
            Start::Resume(record) => {
                info!(upload_id = %record.upload_id, offset = record.offset, "resuming upload");
                self.emit(UploadEvent::Resumed {
                    upload_id: record.upload_id.clone(),
                    offset: record.offset,
                });
                (
                    true,
                    UploadState::InProgress(UploadSession::resumed(record.upload_id, record.offset)),
                )
            }
            Start::Fresh => {
                self.rebuild_archive().await?;
                (false, UploadState::Fresh)
            }
        };

        let chunk_size = self.config.chunk_size;
        let path = archive.clone();
        let mut reader = blocking(move || ChunkReader::new(&path, chunk_size)).await?;
        let total = reader.file_size();
        if total == 0 {
            return Err(ManagerError::Protocol("archive is empty".into()));
        }

        // Hash the prefix the server already holds so the final digest
        // still covers the whole archive.
        let mut digest = ArchiveDigest::new();
        let offset = state.acknowledged();
        if offset > 0 {
            (reader, digest) = blocking(move || {
                reader.feed_until(offset, &mut digest)?;
                Ok((reader, digest))
            })
            .await?;
        }

        let mut stalled = 0u32;
        while state.acknowledged() < total {
            self.check_cancelled()?;

            let (r, chunk) = blocking(move || {
                let chunk = reader.next_chunk()?;
                Ok((reader, chunk))
            })
            .await?;
            reader = r;
            let chunk = chunk.ok_or_else(|| {
                ManagerError::Protocol(format!(
                    "archive ended at {} before {total} bytes",
                    reader.offset()
                ))
            })?;

            let ack = self.send_chunk(&chunk, total, state.upload_id()).await?;
            let acked = ack.offset;
            if acked < chunk.offset || acked > chunk.end() {
                return Err(ManagerError::Protocol(format!(
                    "acknowledged offset {acked} outside the chunk {}..{}",
                    chunk.offset,
                    chunk.end()
                )));
            }

            digest.update(&chunk.data[..(acked - chunk.offset) as usize]);
            state.acknowledge(ack);
            self.persist(&state)?;
            info!(offset = acked, total, "chunk acknowledged");
            self.emit(UploadEvent::Acknowledged { offset: acked, total });

            if acked == chunk.end() {
                stalled = 0;
                continue;
            }

            // The server kept less than it was sent.
            if acked == chunk.offset {
                stalled += 1;
                if stalled >= self.config.retry.max_attempts {
                    return Err(ManagerError::OffsetMismatch {
                        expected: chunk.end(),
                        acknowledged: acked,
                        attempts: stalled,
                    });
                }
            } else {
                stalled = 0;
            }
            reader = blocking(move || {
                reader.seek_to(acked)?;
                Ok(reader)
            })
            .await?;

            let attempt = stalled.max(1);
            let delay = self.config.retry.delay_for_attempt(attempt);
            warn!(
                expected = chunk.end(),
                acknowledged = acked,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "server offset behind, re-sending"
            );
            self.emit(UploadEvent::Retrying {
                offset: acked,
                attempt,
            });
            sleep_or_cancel(delay, &self.cancel).await?;
        }

        if digest.bytes_hashed() != total {
            return Err(ManagerError::Protocol(format!(
                "hashed {} of {total} archive bytes",
                digest.bytes_hashed()
            )));
        }
        let upload_id = state
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| ManagerError::Protocol("no upload session established".into()))?;
        let md5 = digest.finalize_hex();

        let response = self
            .cancellable(self.client.finalize_upload(&upload_id, &md5, &self.config.repo))
            .await?;
        state.complete();

        ProgressRecord::remove(&self.staging.history())?;
        remove_if_exists(&archive)?;
        info!(%upload_id, %md5, total, resumed, "commit complete");
        self.emit(UploadEvent::Completed {
            upload_id: upload_id.clone(),
            md5: md5.clone(),
        });

        Ok(CommitOutcome {
            upload_id,
            md5,
            total_bytes: total,
            resumed,
            response,
            archive,
        })
    }

    /// Inspects the staging directory and asks `prompt` when a resume is
    /// possible.
    fn choose_start<P>(&self, prompt: &mut P) -> Result<Start, ManagerError>
    where
        P: ResumePrompt + ?Sized,
    {
        let archive = self.staging.archive();
        let record = match ProgressRecord::load(&self.staging.history())? {
            RecordState::Missing => return Ok(Start::Fresh),
            RecordState::Malformed(reason) => {
                warn!(%reason, "discarding unusable progress record");
                return Ok(Start::Fresh);
            }
            RecordState::Valid(record) => record,
        };

        let archive_size = match std::fs::metadata(&archive) {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => {
                warn!(archive = %archive.display(), "progress record without archive, starting over");
                return Ok(Start::Fresh);
            }
        };
        if record.offset > archive_size {
            warn!(
                offset = record.offset,
                archive_size, "progress record is past the end of the archive, starting over"
            );
            return Ok(Start::Fresh);
        }

        if prompt.confirm_resume(&record, archive_size) {
            Ok(Start::Resume(record))
        } else {
            info!("resume declined, starting over");
            Ok(Start::Fresh)
        }
    }

    async fn rebuild_archive(&self) -> Result<(), ManagerError> {
        ProgressRecord::remove(&self.staging.history())?;
        let archive = self.staging.archive();
        remove_if_exists(&archive)?;

        let source = self.config.project_dir.clone();
        let summary = blocking(move || build_archive(&source, &archive)).await?;
        self.emit(UploadEvent::ArchiveBuilt {
            files: summary.files,
            size: summary.size,
        });
        Ok(())
    }

    async fn send_chunk(
        &self,
        chunk: &Chunk,
        total: u64,
        upload_id: Option<&str>,
    ) -> Result<ChunkAck, ManagerError> {
        let range = chunk.content_range(total).ok_or_else(|| {
            ManagerError::Protocol(format!("no valid range for chunk at {}", chunk.offset))
        })?;
        debug!(%range, "uploading chunk");
        self.cancellable(self.client.upload_chunk(range, chunk.data.clone(), upload_id))
            .await
    }

    fn persist(&self, state: &UploadState) -> Result<(), ManagerError> {
        if let Some(session) = state.session() {
            ProgressRecord {
                upload_id: session.upload_id.clone(),
                offset: session.offset,
            }
            .save(&self.staging.history())?;
        }
        Ok(())
    }

    async fn cancellable<T>(
        &self,
        fut: impl Future<Output = Result<T, matrix_client::Error>>,
    ) -> Result<T, ManagerError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(ManagerError::Cancelled),
            result = fut => result.map_err(Into::into),
        }
    }

    fn check_cancelled(&self) -> Result<(), ManagerError> {
        if self.cancel.is_cancelled() {
            Err(ManagerError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn emit(&self, event: UploadEvent) {
        // Progress is best effort; a slow or absent consumer must not
        // stall the upload.
        let _ = self.events_tx.try_send(event);
    }
}

/// Runs blocking file work off the async executor.
async fn blocking<T, F>(f: F) -> Result<T, ManagerError>
where
    F: FnOnce() -> Result<T, TransferError> + Send + 'static,
    T: Send + 'static,
{
    // Blocking threads do not inherit a scoped subscriber.
    let dispatch = tracing::dispatcher::get_default(|d| d.clone());
    tokio::task::spawn_blocking(move || tracing::dispatcher::with_default(&dispatch, f))
        .await
        .map_err(|e| ManagerError::Io(std::io::Error::other(format!("task join error: {e}"))))?
        .map_err(Into::into)
}

async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> Result<(), ManagerError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(ManagerError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

fn remove_if_exists(path: &Path) -> Result<(), ManagerError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matrix_client::ClientOptions;
    use matrix_client::testing::{MockResponse, MockServer, RecordedRequest};
    use matrix_protocol::{ContentRange, Framework, InputKind};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    const CHUNK: usize = 32 * 1024;

    /// Server side of the upload protocol, with switchable faults.
    #[derive(Default)]
    struct FakeRepo {
        data: Vec<u8>,
        sessions: u32,
        chunk_requests: usize,
        ranges: Vec<ContentRange>,
        upload_ids: Vec<Option<String>>,
        /// 1-based chunk request that gets a 500.
        fail_request: Option<usize>,
        /// Never accept bytes at or beyond this offset.
        stall_at: Option<u64>,
        /// Accept only half of the next chunk that starts past 0.
        short_once: bool,
        /// Acknowledge past the end of what was sent.
        overshoot: bool,
        finalized: Vec<(String, String, String)>,
    }

    impl FakeRepo {
        fn respond(&mut self, req: &RecordedRequest) -> MockResponse {
            match req.path.as_str() {
                "/repo/upload/" => self.chunk(req),
                "/repo/upload/done/" => {
                    self.finalized.push((
                        req.form_field("upload_id").unwrap_or_default(),
                        req.form_field("md5").unwrap_or_default(),
                        req.form_field("settings").unwrap_or_default(),
                    ));
                    MockResponse::json(200, r#"{"status":"registered"}"#)
                }
                _ => MockResponse::json(404, r#"{"detail":"not found"}"#),
            }
        }

        fn chunk(&mut self, req: &RecordedRequest) -> MockResponse {
            self.chunk_requests += 1;
            let range: ContentRange = req.header("content-range").unwrap().parse().unwrap();
            let upload_id = req
                .multipart_field("upload_id")
                .map(|id| String::from_utf8(id).unwrap());
            self.ranges.push(range);
            self.upload_ids.push(upload_id.clone());

            if self.fail_request == Some(self.chunk_requests) {
                return MockResponse::json(500, r#"{"detail":"storage unavailable"}"#);
            }
            if upload_id.is_none() {
                self.sessions += 1;
                self.data.clear();
            }

            let mut body = req.multipart_field("file").unwrap();
            assert_eq!(body.len() as u64, range.len());
            if range.start == self.data.len() as u64 {
                if self.stall_at.is_some_and(|limit| range.start >= limit) {
                    body.clear();
                } else if self.short_once && range.start > 0 {
                    self.short_once = false;
                    body.truncate(body.len() / 2);
                }
                self.data.extend_from_slice(&body);
            }

            let offset = if self.overshoot {
                range.end + 10
            } else {
                self.data.len() as u64
            };
            MockResponse::json(
                200,
                &format!(
                    r#"{{"upload_id":"up-{}","offset":{offset},"expires":"2030-01-01T00:00:00Z"}}"#,
                    self.sessions
                ),
            )
        }
    }

    async fn fake_server(repo: FakeRepo) -> (MockServer, Arc<Mutex<FakeRepo>>) {
        let state = Arc::new(Mutex::new(repo));
        let shared = Arc::clone(&state);
        let server = MockServer::start(move |req| shared.lock().unwrap().respond(req)).await;
        (server, state)
    }

    /// Deterministic bytes that deflate cannot shrink much.
    fn noise(len: usize, seed: u32) -> Vec<u8> {
        let mut x = seed.wrapping_mul(2_654_435_761).max(1);
        (0..len)
            .map(|_| {
                x ^= x << 13;
                x ^= x >> 17;
                x ^= x << 5;
                (x >> 24) as u8
            })
            .collect()
    }

    fn create_project() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::write(root.join("matrix.toml"), "docker_tag = \"demo:latest\"\n").unwrap();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(root.join("src").join("main.rs"), "fn main() {}\n").unwrap();
        std::fs::write(root.join("weights.bin"), noise(150_000, 7)).unwrap();
        std::fs::create_dir_all(root.join("data")).unwrap();
        std::fs::write(root.join("data").join("big.bin"), noise(50_000, 9)).unwrap();
        dir
    }

    fn uploader(server: &MockServer, project: &Path) -> Uploader {
        let client = Client::new(
            ClientOptions::default()
                .with_token("test-token")
                .with_base_url(server.url()),
        )
        .unwrap();
        let config = CommitConfig {
            project_dir: project.to_path_buf(),
            repo: RepoSettings {
                repo_name: "demo:latest".into(),
                framework: Framework::PyTorch,
                title: "Demo".into(),
                input_type: vec![InputKind::Text],
                output_type: vec![],
                price: 0,
            },
            chunk_size: CHUNK,
            retry: RetryPolicy {
                max_attempts: 3,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(4),
                backoff_factor: 2.0,
            },
        };
        Uploader::new(client, config)
    }

    fn md5_of(data: &[u8]) -> String {
        let mut digest = ArchiveDigest::new();
        digest.update(data);
        digest.finalize_hex()
    }

    fn never_asked(_: &ProgressRecord, _: u64) -> bool {
        panic!("resume prompt must not be shown")
    }

    fn assert_contiguous(ranges: &[ContentRange], total: u64) {
        let mut next = 0;
        for r in ranges {
            assert_eq!(r.start, next, "gap or overlap at {r}");
            assert_eq!(r.total, total);
            next = r.end + 1;
        }
        assert_eq!(next, total);
    }

    #[tokio::test]
    async fn fresh_commit_uploads_whole_archive() {
        let project = create_project();
        let (server, repo) = fake_server(FakeRepo::default()).await;
        let mut up = uploader(&server, project.path());
        let mut events = up.take_events().unwrap();

        let outcome = up.commit(&mut never_asked).await.unwrap();

        let repo = repo.lock().unwrap();
        let total = repo.data.len() as u64;
        assert_eq!(outcome.total_bytes, total);
        assert!(!outcome.resumed);
        assert_eq!(outcome.upload_id, "up-1");
        assert_eq!(outcome.md5, md5_of(&repo.data));
        assert_eq!(outcome.response["status"], "registered");
        assert!(repo.data.starts_with(b"PK"));

        // Fixed-size chunks except the last, covering [0, total).
        assert_contiguous(&repo.ranges, total);
        let lens: Vec<u64> = repo.ranges.iter().map(ContentRange::len).collect();
        assert!(lens[..lens.len() - 1].iter().all(|&l| l == CHUNK as u64));
        assert_eq!(lens.len() as u64, total.div_ceil(CHUNK as u64));

        // Only the first chunk goes without a session id.
        assert_eq!(repo.upload_ids[0], None);
        assert!(repo.upload_ids[1..].iter().all(|id| id.as_deref() == Some("up-1")));

        let (id, md5, settings) = &repo.finalized[0];
        assert_eq!(id, "up-1");
        assert_eq!(md5, &outcome.md5);
        let settings: serde_json::Value = serde_json::from_str(settings).unwrap();
        assert_eq!(settings["repo_name"], "demo:latest");

        // Staging files are gone after a successful finalize.
        assert!(!up.staging().history().exists());
        assert!(!up.staging().archive().exists());

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(matches!(seen.first(), Some(UploadEvent::ArchiveBuilt { .. })));
        assert!(matches!(seen.last(), Some(UploadEvent::Completed { upload_id, .. }) if upload_id == "up-1"));
        assert!(seen.contains(&UploadEvent::Acknowledged { offset: total, total }));
    }

    #[tokio::test]
    async fn failed_chunk_keeps_record_and_resume_matches_fresh_digest() {
        let project = create_project();
        let (server, repo) = fake_server(FakeRepo {
            fail_request: Some(2),
            ..Default::default()
        })
        .await;
        let up = uploader(&server, project.path());

        let err = up.commit(&mut never_asked).await.unwrap_err();
        assert!(
            matches!(&err, ManagerError::Client(matrix_client::Error::Api { status: 500, body }) if body.contains("storage unavailable")),
            "{err}"
        );

        // The record holds exactly what the server acknowledged.
        let record = match ProgressRecord::load(&up.staging().history()).unwrap() {
            RecordState::Valid(record) => record,
            other => panic!("unexpected record {other:?}"),
        };
        assert_eq!(record.upload_id, "up-1");
        assert_eq!(record.offset, CHUNK as u64);
        let archive = std::fs::read(up.staging().archive()).unwrap();
        let expected_md5 = md5_of(&archive);

        let mut asked = None;
        let outcome = up
            .commit(&mut |record: &ProgressRecord, size: u64| {
                asked = Some((record.offset, size));
                true
            })
            .await
            .unwrap();
        assert_eq!(asked, Some((CHUNK as u64, archive.len() as u64)));
        assert!(outcome.resumed);
        assert_eq!(outcome.md5, expected_md5);

        let repo = repo.lock().unwrap();
        assert_eq!(repo.data, archive);
        assert_eq!(repo.sessions, 1);
        // Request 2 failed; request 3 retried the same range under the same session.
        assert_eq!(repo.ranges[2].start, CHUNK as u64);
        assert_eq!(repo.upload_ids[2].as_deref(), Some("up-1"));
        assert!(!up.staging().history().exists());
    }

    #[tokio::test]
    async fn declined_resume_rebuilds_and_starts_fresh() {
        let project = create_project();
        let (server, repo) = fake_server(FakeRepo {
            fail_request: Some(2),
            ..Default::default()
        })
        .await;
        let up = uploader(&server, project.path());
        up.commit(&mut never_asked).await.unwrap_err();

        let outcome = up.commit(&mut |_: &ProgressRecord, _: u64| false).await.unwrap();
        assert!(!outcome.resumed);
        assert_eq!(outcome.upload_id, "up-2");

        let repo = repo.lock().unwrap();
        assert_eq!(repo.ranges[2].start, 0);
        assert_eq!(repo.upload_ids[2], None);
        assert_eq!(outcome.md5, md5_of(&repo.data));
    }

    #[tokio::test]
    async fn malformed_record_rebuilds_without_prompt() {
        let project = create_project();
        let (server, repo) = fake_server(FakeRepo::default()).await;
        let up = uploader(&server, project.path());

        std::fs::create_dir_all(up.staging().dir()).unwrap();
        std::fs::write(up.staging().history(), "{not json").unwrap();
        std::fs::write(up.staging().archive(), b"stale archive").unwrap();

        let outcome = up.commit(&mut never_asked).await.unwrap();
        let repo = repo.lock().unwrap();
        assert!(repo.data.starts_with(b"PK"));
        assert_eq!(outcome.md5, md5_of(&repo.data));
    }

    #[tokio::test]
    async fn binary_record_rebuilds_without_prompt() {
        let project = create_project();
        let (server, repo) = fake_server(FakeRepo::default()).await;
        let up = uploader(&server, project.path());

        std::fs::create_dir_all(up.staging().dir()).unwrap();
        std::fs::write(up.staging().history(), b"\xff\xfe{garbage").unwrap();
        std::fs::write(up.staging().archive(), b"stale archive").unwrap();

        let outcome = up.commit(&mut never_asked).await.unwrap();
        assert!(!outcome.resumed);
        assert_eq!(outcome.md5, md5_of(&repo.lock().unwrap().data));
    }

    #[tokio::test]
    async fn record_past_archive_end_is_discarded() {
        let project = create_project();
        let (server, _repo) = fake_server(FakeRepo::default()).await;
        let up = uploader(&server, project.path());

        std::fs::create_dir_all(up.staging().dir()).unwrap();
        std::fs::write(up.staging().archive(), b"tiny").unwrap();
        ProgressRecord {
            upload_id: "old".into(),
            offset: 1_000_000,
        }
        .save(&up.staging().history())
        .unwrap();

        let outcome = up.commit(&mut never_asked).await.unwrap();
        assert_eq!(outcome.upload_id, "up-1");
    }

    #[tokio::test]
    async fn short_ack_resends_from_acknowledged_offset() {
        let project = create_project();
        let (server, repo) = fake_server(FakeRepo {
            short_once: true,
            ..Default::default()
        })
        .await;
        let mut up = uploader(&server, project.path());
        let mut events = up.take_events().unwrap();

        let outcome = up.commit(&mut never_asked).await.unwrap();

        let repo = repo.lock().unwrap();
        assert_eq!(outcome.md5, md5_of(&repo.data));
        assert_eq!(repo.ranges[1].start, CHUNK as u64);
        assert_eq!(repo.ranges[2].start, (CHUNK + CHUNK / 2) as u64);

        let mut retries = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, UploadEvent::Retrying { .. }) {
                retries += 1;
            }
        }
        assert_eq!(retries, 1);
    }

    #[tokio::test]
    async fn stalled_server_fails_after_bounded_retries() {
        let project = create_project();
        let (server, repo) = fake_server(FakeRepo {
            stall_at: Some(CHUNK as u64),
            ..Default::default()
        })
        .await;
        let up = uploader(&server, project.path());

        let err = up.commit(&mut never_asked).await.unwrap_err();
        match err {
            ManagerError::OffsetMismatch {
                expected,
                acknowledged,
                attempts,
            } => {
                assert_eq!(expected, 2 * CHUNK as u64);
                assert_eq!(acknowledged, CHUNK as u64);
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
        // One good chunk plus three non-advancing sends.
        assert_eq!(repo.lock().unwrap().chunk_requests, 4);

        match ProgressRecord::load(&up.staging().history()).unwrap() {
            RecordState::Valid(record) => assert_eq!(record.offset, CHUNK as u64),
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[tokio::test]
    async fn ack_outside_chunk_is_protocol_error() {
        let project = create_project();
        let (server, _repo) = fake_server(FakeRepo {
            overshoot: true,
            ..Default::default()
        })
        .await;
        let up = uploader(&server, project.path());

        let err = up.commit(&mut never_asked).await.unwrap_err();
        assert!(matches!(err, ManagerError::Protocol(_)), "{err}");
        assert!(!up.staging().history().exists());
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let project = create_project();
        let (server, repo) = fake_server(FakeRepo::default()).await;
        let up = uploader(&server, project.path());
        up.cancel_token().cancel();

        assert!(matches!(
            up.commit(&mut never_asked).await,
            Err(ManagerError::Cancelled)
        ));
        assert_eq!(repo.lock().unwrap().chunk_requests, 0);
        assert!(!up.staging().archive().exists());
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_sleep_waits_and_honours_cancel() {
        let token = CancellationToken::new();
        let start = tokio::time::Instant::now();
        sleep_or_cancel(Duration::from_secs(2), &token).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(2));

        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel.cancel();
        });
        let start = tokio::time::Instant::now();
        assert!(matches!(
            sleep_or_cancel(Duration::from_secs(60), &token).await,
            Err(ManagerError::Cancelled)
        ));
        assert!(start.elapsed() < Duration::from_secs(60));
    }

    #[test]
    fn config_from_settings() {
        let settings = ProjectSettings {
            docker_tag: "x:1".into(),
            ..Default::default()
        };
        let config = CommitConfig::from_settings(Path::new("/p"), &settings);
        assert_eq!(config.repo.repo_name, "x:1");
        assert_eq!(config.chunk_size, matrix_transfer::DEFAULT_CHUNK_SIZE);
        assert_eq!(config.retry.max_attempts, 5);
    }
}
