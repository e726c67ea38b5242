use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Repository upload
// ---------------------------------------------------------------------------

/// Server acknowledgement of an uploaded chunk.
///
/// `offset` is the number of bytes the server has durably received for
/// this upload session; it is the only authority for where to resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkAck {
    pub upload_id: String,
    pub offset: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Model calls
// ---------------------------------------------------------------------------

/// Response to a multi-file input upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileUploadResponse {
    #[serde(deserialize_with = "ids_as_strings")]
    pub file_indices: Vec<String>,
}

/// Inputs for a model call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelInputs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_ids: Vec<String>,
}

/// Request body for calling a hosted model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    /// `author_username/repo_name` of the model to call.
    pub repo_name: String,
    pub inputs: ModelInputs,
}

/// Response to a model call; carries the task id to poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResponse {
    pub task_id: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Downloadable result file, as listed in a finished task's outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    /// MIME type, e.g. `image/png`.
    #[serde(rename = "type")]
    pub content_type: String,
    pub url: String,
}

/// Accepts a list of ids that the server may encode as numbers or strings.
fn ids_as_strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Str(String),
        Num(i64),
    }

    let ids = Vec::<Id>::deserialize(deserializer)?;
    Ok(ids
        .into_iter()
        .map(|id| match id {
            Id::Str(s) => s,
            Id::Num(n) => n.to_string(),
        })
        .collect())
}
