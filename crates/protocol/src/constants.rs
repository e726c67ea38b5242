use std::fmt;

/// Default API host.
pub const DEFAULT_SERVER_URI: &str = "https://api.matrixai.name";

/// API endpoint identifier.
///
/// Paths are relative to the configured server URI and keep the trailing
/// slash the server routes expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Chunked repository archive upload.
    UploadRepo,
    /// Finalizes a chunked upload with its checksum and settings.
    UploadRepoDone,
    /// Removes a repository and its API.
    RepoDelete,
    /// Requests a server-side build of an uploaded repository.
    RepoBuild,
    /// Lists public repositories.
    RepoList,
    /// Uploads input files for a model call.
    UploadFiles,
    /// Calls a model.
    ModelRequest,
    /// Polls the result of a model call.
    RequestResult,
}

impl Endpoint {
    /// Returns the path component for this endpoint.
    pub fn path(self) -> &'static str {
        match self {
            Self::UploadRepo => "/repo/upload/",
            Self::UploadRepoDone => "/repo/upload/done/",
            Self::RepoDelete => "/repo/delete/",
            Self::RepoBuild => "/repo/build/",
            Self::RepoList => "/repo/list/",
            Self::UploadFiles => "/files/upload/",
            Self::ModelRequest => "/model/request/",
            Self::RequestResult => "/model/result/",
        }
    }

    /// Joins the endpoint path onto `base`, tolerating a trailing slash.
    pub fn url(self, base: &str) -> String {
        format!("{}{}", base.trim_end_matches('/'), self.path())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}
