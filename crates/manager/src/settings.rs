//! Project settings (`matrix.toml` at the project root).
//!
//! Every field has a default, so a partial file is valid. The API token
//! may be left out of the file and supplied through `MATRIX_TOKEN`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use matrix_client::ClientOptions;
use matrix_protocol::{DEFAULT_SERVER_URI, Framework, InputKind, RepoSettings};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ManagerError;
use crate::types::RetryPolicy;

/// File name of the project settings.
pub const SETTINGS_FILE: &str = "matrix.toml";

/// Environment variable that overrides the token in the settings file.
pub const TOKEN_ENV: &str = "MATRIX_TOKEN";

/// Settings of one model project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSettings {
    /// Image tag; doubles as the repository name on the platform.
    #[serde(default = "default_docker_tag")]
    pub docker_tag: String,

    #[serde(default)]
    pub framework: Framework,

    #[serde(default)]
    pub title: String,

    /// Kinds of input the model accepts; the local test run loads samples
    /// of exactly these kinds.
    #[serde(default = "default_input_types")]
    pub input_types: Vec<InputKind>,

    #[serde(default)]
    pub output_types: Vec<InputKind>,

    #[serde(default)]
    pub price: u32,

    /// Program run inside the container by the local test.
    #[serde(default = "default_entrypoint")]
    pub entrypoint: String,

    /// API token. Prefer `MATRIX_TOKEN` over committing it here.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub upload: UploadSettings,

    #[serde(default)]
    pub docker: DockerSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Upper bound for a single request, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadSettings {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Consecutive non-advancing acknowledgements tolerated per chunk.
    #[serde(default = "default_max_offset_retries")]
    pub max_offset_retries: u32,

    #[serde(default = "default_initial_retry_delay")]
    pub initial_retry_delay_ms: u64,

    #[serde(default = "default_max_retry_delay")]
    pub max_retry_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DockerSettings {
    #[serde(default = "default_docker_program")]
    pub program: String,

    #[serde(default)]
    pub use_sudo: bool,
}

fn default_docker_tag() -> String {
    "test:latest".into()
}

fn default_input_types() -> Vec<InputKind> {
    vec![InputKind::Text]
}

fn default_entrypoint() -> String {
    "model".into()
}

fn default_base_url() -> String {
    DEFAULT_SERVER_URI.into()
}

fn default_request_timeout() -> u64 {
    120
}

fn default_chunk_size() -> usize {
    matrix_transfer::DEFAULT_CHUNK_SIZE
}

fn default_max_offset_retries() -> u32 {
    5
}

fn default_initial_retry_delay() -> u64 {
    250
}

fn default_max_retry_delay() -> u64 {
    8000
}

fn default_docker_program() -> String {
    "docker".into()
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_offset_retries: default_max_offset_retries(),
            initial_retry_delay_ms: default_initial_retry_delay(),
            max_retry_delay_ms: default_max_retry_delay(),
        }
    }
}

impl Default for DockerSettings {
    fn default() -> Self {
        Self {
            program: default_docker_program(),
            use_sudo: false,
        }
    }
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            docker_tag: default_docker_tag(),
            framework: Framework::default(),
            title: String::new(),
            input_types: default_input_types(),
            output_types: Vec::new(),
            price: 0,
            entrypoint: default_entrypoint(),
            token: String::new(),
            server: ServerSettings::default(),
            upload: UploadSettings::default(),
            docker: DockerSettings::default(),
        }
    }
}

impl ProjectSettings {
    /// Path of the settings file inside `project_dir`.
    pub fn path(project_dir: &Path) -> PathBuf {
        project_dir.join(SETTINGS_FILE)
    }

    /// Loads `<project_dir>/matrix.toml` and applies `MATRIX_TOKEN`.
    pub fn load(project_dir: &Path) -> Result<Self, ManagerError> {
        let path = Self::path(project_dir);
        let content = std::fs::read_to_string(&path).map_err(|e| ManagerError::Settings {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let settings = Self::parse(&content, &path)?
            .with_token_override(std::env::var(TOKEN_ENV).ok());
        debug!(path = %path.display(), tag = %settings.docker_tag, "project settings loaded");
        Ok(settings)
    }

    /// Parses and validates settings text; `path` is only used in errors.
    pub fn parse(content: &str, path: &Path) -> Result<Self, ManagerError> {
        let settings: Self = toml::from_str(content).map_err(|e| ManagerError::Settings {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        settings.validate().map_err(|reason| ManagerError::Settings {
            path: path.to_path_buf(),
            reason,
        })?;
        Ok(settings)
    }

    /// Writes the settings to `<project_dir>/matrix.toml`.
    pub fn save(&self, project_dir: &Path) -> Result<(), ManagerError> {
        let path = Self::path(project_dir);
        let content = toml::to_string_pretty(self).map_err(|e| ManagerError::Settings {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        std::fs::write(&path, content)?;
        debug!(path = %path.display(), "project settings saved");
        Ok(())
    }

    /// Replaces the token when `token` is non-empty.
    pub fn with_token_override(mut self, token: Option<String>) -> Self {
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.token = token.trim().to_string();
        }
        self
    }

    fn validate(&self) -> Result<(), String> {
        if self.docker_tag.trim().is_empty() {
            return Err("docker_tag must not be empty".into());
        }
        if self.input_types.is_empty() {
            return Err("input_types must list at least one kind".into());
        }
        if self.entrypoint.trim().is_empty() {
            return Err("entrypoint must not be empty".into());
        }
        if self.upload.chunk_size == 0 {
            return Err("upload.chunk_size must be positive".into());
        }
        if self.server.request_timeout_secs == 0 {
            return Err("server.request_timeout_secs must be positive".into());
        }
        Ok(())
    }

    pub fn token(&self) -> Option<&str> {
        Some(self.token.as_str()).filter(|t| !t.is_empty())
    }

    /// Metadata registered with the repository at finalize.
    pub fn repo_settings(&self) -> RepoSettings {
        RepoSettings {
            repo_name: self.docker_tag.clone(),
            framework: self.framework,
            title: self.title.clone(),
            input_type: self.input_types.clone(),
            output_type: self.output_types.clone(),
            price: self.price,
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        let options = ClientOptions::default()
            .with_base_url(self.server.base_url.clone())
            .with_timeout(Duration::from_secs(self.server.request_timeout_secs));
        match self.token() {
            Some(token) => options.with_token(token),
            None => options,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.upload.max_offset_retries,
            initial_delay: Duration::from_millis(self.upload.initial_retry_delay_ms),
            max_delay: Duration::from_millis(self.upload.max_retry_delay_ms),
            backoff_factor: 2.0,
        }
    }
}
