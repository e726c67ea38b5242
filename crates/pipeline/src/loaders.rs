//! Sample loaders.
//!
//! Files are classified by extension. Text is read into memory with line
//! breaks folded into spaces, JSON is parsed, and every other kind is
//! handed over as a path for the model to decode in its own format.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use matrix_protocol::InputKind;
use tracing::debug;

use crate::PipelineError;

/// One loaded input.
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    Text(String),
    Json(serde_json::Value),
    /// Path to a file the pipeline decodes itself.
    File(PathBuf),
}

/// Loaded inputs grouped by kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Samples {
    by_kind: BTreeMap<InputKind, Vec<Sample>>,
}

impl Samples {
    pub fn get(&self, kind: InputKind) -> &[Sample] {
        self.by_kind.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    /// Kinds with at least one sample, in a stable order.
    pub fn kinds(&self) -> Vec<InputKind> {
        self.by_kind.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty()
    }

    /// Total number of samples across all kinds.
    pub fn len(&self) -> usize {
        self.by_kind.values().map(Vec::len).sum()
    }

    pub fn push(&mut self, kind: InputKind, sample: Sample) {
        self.by_kind.entry(kind).or_default().push(sample);
    }

    /// Text samples only.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.get(InputKind::Text).iter().filter_map(|s| match s {
            Sample::Text(t) => Some(t.as_str()),
            _ => None,
        })
    }
}

/// Classifies a file by extension. Unknown or missing extensions are
/// [`InputKind::Generic`].
pub fn classify(path: &Path) -> InputKind {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    match ext.as_deref() {
        Some("txt" | "text" | "md" | "csv" | "tsv" | "html" | "htm") => InputKind::Text,
        Some("png" | "jpg" | "jpeg" | "gif" | "bmp" | "webp" | "tif" | "tiff" | "ico" | "svg") => {
            InputKind::Image
        }
        Some("mp4" | "avi" | "mov" | "mkv" | "webm" | "mpeg" | "mpg") => InputKind::Video,
        Some("wav" | "mp3" | "flac" | "ogg" | "m4a" | "aac") => InputKind::Audio,
        Some("json") => InputKind::Json,
        Some("pdf") => InputKind::Pdf,
        _ => InputKind::Generic,
    }
}

/// Loads every file directly inside `dir` whose kind is in `kinds`.
///
/// Files of a supported kind that was not requested are skipped even when
/// `kinds` contains [`InputKind::Generic`]; generic only picks up files with
/// no dedicated kind. Files are visited in name order.
pub fn load_samples(dir: &Path, kinds: &[InputKind]) -> Result<Samples, PipelineError> {
    let mut entries = std::fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    let mut samples = Samples::default();
    for entry in entries {
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let kind = classify(&path);
        if !kinds.contains(&kind) {
            debug!(path = %path.display(), %kind, "sample kind not requested");
            continue;
        }

        let sample = match kind {
            InputKind::Text => Sample::Text(load_text(&path)?),
            InputKind::Json => Sample::Json(load_json(&path)?),
            _ => Sample::File(path),
        };
        samples.push(kind, sample);
    }

    debug!(dir = %dir.display(), count = samples.len(), "samples loaded");
    Ok(samples)
}

fn load_text(path: &Path) -> Result<String, PipelineError> {
    let content = std::fs::read_to_string(path)?;
    Ok(content.replace("\r\n", " ").replace('\n', " "))
}

fn load_json(path: &Path) -> Result<serde_json::Value, PipelineError> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|source| PipelineError::Json {
        path: path.to_path_buf(),
        source,
    })
}
