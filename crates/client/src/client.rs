//! Matrix API client.
//!
//! Async HTTP client using `reqwest` with Bearer token authentication.
//! Every request is bounded by the client timeout; callers that need
//! cancellation race the returned futures against their own token.

use std::path::{Path, PathBuf};
use std::time::Duration;

use matrix_protocol::{
    ChunkAck, ContentRange, DEFAULT_SERVER_URI, Endpoint, FileInfo, FileUploadResponse,
    ModelRequest, RepoSettings, TaskResponse,
};
use reqwest::header::{AUTHORIZATION, CONTENT_RANGE, HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use tracing::{debug, info};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Errors from the Matrix client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid API token")]
    InvalidKey,

    #[error("this operation needs an API token")]
    MissingToken,

    #[error("file not found: {0}")]
    MissingFile(PathBuf),

    #[error("wrong URL pattern: {0}")]
    WrongUrlPattern(String),
}

/// Connection settings for [`Client`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub base_url: String,
    /// Bearer token; only the public repository listing works without one.
    pub token: Option<String>,
    /// Upper bound for a whole request, connect to last body byte.
    pub timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SERVER_URI.to_string(),
            token: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ClientOptions {
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into()).filter(|t: &String| !t.is_empty());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Matrix API client.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    authenticated: bool,
}

impl Client {
    /// Creates a new client.
    pub fn new(options: ClientOptions) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &options.token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| Error::InvalidKey)?,
            );
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(options.timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: options.base_url,
            authenticated: options.token.is_some(),
        })
    }

    /// Creates a client for the default server with the given token.
    pub fn with_token(token: &str) -> Result<Self, Error> {
        Self::new(ClientOptions::default().with_token(token))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: Endpoint) -> String {
        endpoint.url(&self.base_url)
    }

    fn require_token(&self) -> Result<(), Error> {
        if self.authenticated {
            Ok(())
        } else {
            Err(Error::MissingToken)
        }
    }

    // -----------------------------------------------------------------------
    // Repository upload
    // -----------------------------------------------------------------------

    /// Sends one archive chunk.
    ///
    /// The first chunk of a session goes without `upload_id`; the server
    /// allocates one and returns it in the acknowledgement.
    pub async fn upload_chunk(
        &self,
        range: ContentRange,
        data: Vec<u8>,
        upload_id: Option<&str>,
    ) -> Result<ChunkAck, Error> {
        self.require_token()?;
        debug!(%range, upload_id, "sending chunk");

        let mut form = Form::new().part("file", Part::bytes(data).file_name("file"));
        if let Some(id) = upload_id {
            form = form.text("upload_id", id.to_string());
        }

        let resp = self
            .http
            .post(self.url(Endpoint::UploadRepo))
            .header(CONTENT_RANGE, range.to_string())
            .multipart(form)
            .send()
            .await?;
        let resp = expect_success(resp).await?;
        Ok(resp.json().await?)
    }

    /// Completes an upload session with the archive checksum and the
    /// repository settings.
    pub async fn finalize_upload(
        &self,
        upload_id: &str,
        md5: &str,
        settings: &RepoSettings,
    ) -> Result<serde_json::Value, Error> {
        self.require_token()?;
        let settings = serde_json::to_string(settings)?;
        let params = [("md5", md5), ("upload_id", upload_id), ("settings", settings.as_str())];

        let resp = self
            .http
            .post(self.url(Endpoint::UploadRepoDone))
            .form(&params)
            .send()
            .await?;
        let resp = expect_success(resp).await?;
        info!(upload_id, md5, "upload finalized");
        read_json(resp).await
    }

    // -----------------------------------------------------------------------
    // Repository lifecycle
    // -----------------------------------------------------------------------

    /// Deletes a repository and its API. Only HTTP 200 counts as success.
    pub async fn delete_repo(&self, repo_name: &str) -> Result<(), Error> {
        self.require_token()?;
        let resp = self
            .http
            .post(self.url(Endpoint::RepoDelete))
            .form(&[("repo_name", repo_name)])
            .send()
            .await?;
        expect_status(resp, StatusCode::OK).await?;
        info!(repo_name, "repository deleted");
        Ok(())
    }

    /// Asks the server to build an uploaded repository.
    pub async fn build_repo(&self, repo_name: &str) -> Result<serde_json::Value, Error> {
        self.require_token()?;
        let resp = self
            .http
            .post(self.url(Endpoint::RepoBuild))
            .form(&[("repo_name", repo_name)])
            .send()
            .await?;
        let resp = expect_status(resp, StatusCode::OK).await?;
        info!(repo_name, "remote build requested");
        read_json(resp).await
    }

    /// Lists public repositories. Works without a token.
    pub async fn list_repos(&self) -> Result<serde_json::Value, Error> {
        let resp = self.http.get(self.url(Endpoint::RepoList)).send().await?;
        let resp = expect_status(resp, StatusCode::OK).await?;
        read_json(resp).await
    }

    // -----------------------------------------------------------------------
    // Model calls
    // -----------------------------------------------------------------------

    /// Uploads input files for a model call and returns their ids, in the
    /// order the server lists them.
    ///
    /// Every path is checked before anything is sent.
    pub async fn upload_files(&self, paths: &[PathBuf]) -> Result<Vec<String>, Error> {
        self.require_token()?;
        if let Some(missing) = paths.iter().find(|p| !p.is_file()) {
            return Err(Error::MissingFile(missing.clone()));
        }

        let mut form = Form::new();
        for path in paths {
            let data = tokio::fs::read(path).await?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "file".into());
            form = form.part("files", Part::bytes(data).file_name(name));
        }

        let resp = self
            .http
            .post(self.url(Endpoint::UploadFiles))
            .multipart(form)
            .send()
            .await?;
        let resp = expect_status(resp, StatusCode::CREATED).await?;
        let body: FileUploadResponse = resp.json().await?;
        debug!(count = body.file_indices.len(), "input files uploaded");
        Ok(body.file_indices)
    }

    /// Calls a hosted model; the returned task id is polled with
    /// [`Client::request_status`].
    pub async fn call(&self, request: &ModelRequest) -> Result<TaskResponse, Error> {
        self.require_token()?;
        let resp = self
            .http
            .post(self.url(Endpoint::ModelRequest))
            .json(request)
            .send()
            .await?;
        let resp = expect_status(resp, StatusCode::OK).await?;
        let task: TaskResponse = resp.json().await?;
        info!(repo = %request.repo_name, task_id = %task.task_id, "model called");
        Ok(task)
    }

    /// Returns the current status of a model call.
    pub async fn request_status(&self, task_id: &str) -> Result<serde_json::Value, Error> {
        self.require_token()?;
        let resp = self
            .http
            .post(self.url(Endpoint::RequestResult))
            .json(&serde_json::json!({ "task_id": task_id }))
            .send()
            .await?;
        let resp = expect_status(resp, StatusCode::OK).await?;
        read_json(resp).await
    }

    /// Downloads a result file into `dest_dir`, named after the file id in
    /// its URL plus an extension derived from the MIME type.
    pub async fn download_file(&self, file: &FileInfo, dest_dir: &Path) -> Result<PathBuf, Error> {
        let file_id = file_id_from_url(&file.url)?;
        let dest = dest_dir.join(format!("{file_id}{}", extension_for_mime(&file.content_type)));

        let resp = self.http.get(&file.url).send().await?;
        let resp = expect_success(resp).await?;
        let bytes = resp.bytes().await?;

        tokio::fs::create_dir_all(dest_dir).await?;
        tokio::fs::write(&dest, &bytes).await?;
        info!(path = %dest.display(), size = bytes.len(), "result downloaded");
        Ok(dest)
    }
}

/// Fails with [`Error::Api`] unless the status is 2xx.
async fn expect_success(resp: Response) -> Result<Response, Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(Error::Api {
        status: status.as_u16(),
        body,
    })
}

/// Fails with [`Error::Api`] unless the status is exactly `expected`.
async fn expect_status(resp: Response, expected: StatusCode) -> Result<Response, Error> {
    let status = resp.status();
    if status == expected {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(Error::Api {
        status: status.as_u16(),
        body,
    })
}

/// Parses a JSON body; an empty body reads as `null`.
async fn read_json(resp: Response) -> Result<serde_json::Value, Error> {
    let bytes = resp.bytes().await?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::Value::Null);
    }
    Ok(serde_json::from_slice(&bytes)?)
}

/// Extracts the file id from a result URL (`output_id` or `file_id` query
/// parameter). The id must be a plain file name.
fn file_id_from_url(url: &str) -> Result<String, Error> {
    let parsed = reqwest::Url::parse(url).map_err(|_| Error::WrongUrlPattern(url.to_string()))?;
    let id = ["output_id", "file_id"]
        .iter()
        .find_map(|key| {
            parsed
                .query_pairs()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.into_owned())
        })
        .filter(|id| {
            !id.is_empty() && id != "." && id != ".." && !id.contains(['/', '\\'])
        })
        .ok_or_else(|| Error::WrongUrlPattern(url.to_string()))?;
    Ok(id)
}

/// Maps a MIME type to a file extension (with the leading dot).
///
/// Unknown types fall back to `.bin`.
pub fn extension_for_mime(mime: &str) -> &'static str {
    let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    match essence.as_str() {
        "image/png" => ".png",
        "image/jpeg" | "image/jpg" => ".jpg",
        "image/gif" => ".gif",
        "image/webp" => ".webp",
        "image/bmp" => ".bmp",
        "image/svg+xml" => ".svg",
        "image/tiff" => ".tiff",
        "video/mp4" => ".mp4",
        "video/webm" => ".webm",
        "video/quicktime" => ".mov",
        "video/x-msvideo" => ".avi",
        "audio/mpeg" => ".mp3",
        "audio/wav" | "audio/x-wav" | "audio/wave" => ".wav",
        "audio/ogg" => ".ogg",
        "audio/flac" => ".flac",
        "text/plain" => ".txt",
        "text/csv" => ".csv",
        "text/html" => ".html",
        "application/json" => ".json",
        "application/pdf" => ".pdf",
        "application/zip" => ".zip",
        _ => ".bin",
    }
}
