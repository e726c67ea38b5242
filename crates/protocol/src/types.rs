use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when parsing a protocol value from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unknown framework `{0}`, expected one of: pt, tf, oth")]
    Framework(String),

    #[error("unknown input type `{0}`")]
    InputKind(String),

    #[error("malformed content range `{0}`")]
    ContentRange(String),
}

/// ML framework a repository is built on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Framework {
    /// PyTorch.
    #[default]
    #[serde(rename = "pt")]
    PyTorch,
    /// TensorFlow.
    #[serde(rename = "tf")]
    TensorFlow,
    /// Anything else.
    #[serde(rename = "oth")]
    Other,
}

impl Framework {
    /// All accepted frameworks, in prompt order.
    pub const ALL: [Framework; 3] = [Self::PyTorch, Self::TensorFlow, Self::Other];

    /// Short wire code (`pt`, `tf`, `oth`).
    pub fn code(self) -> &'static str {
        match self {
            Self::PyTorch => "pt",
            Self::TensorFlow => "tf",
            Self::Other => "oth",
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Framework {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pt" => Ok(Self::PyTorch),
            "tf" => Ok(Self::TensorFlow),
            "oth" => Ok(Self::Other),
            other => Err(ParseError::Framework(other.to_string())),
        }
    }
}

/// Kind of input or output a model handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Text,
    Image,
    Video,
    Audio,
    Json,
    Pdf,
    /// Any file type without a dedicated loader.
    Generic,
}

impl InputKind {
    /// Lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Json => "json",
            Self::Pdf => "pdf",
            Self::Generic => "generic",
        }
    }
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InputKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            "json" => Ok(Self::Json),
            "pdf" => Ok(Self::Pdf),
            "generic" => Ok(Self::Generic),
            _ => Err(ParseError::InputKind(s.to_string())),
        }
    }
}

/// Repository metadata registered with the server when an upload is finalized.
///
/// Serialized to JSON and sent as the `settings` form field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoSettings {
    /// Image tag, e.g. `text2image:latest`.
    pub repo_name: String,
    pub framework: Framework,
    pub title: String,
    pub input_type: Vec<InputKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_type: Vec<InputKind>,
    #[serde(default)]
    pub price: u32,
}

/// Byte range carried in the `Content-Range` header of a chunk upload.
///
/// `end` is inclusive, matching the HTTP header format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

impl ContentRange {
    /// Builds the range for `len` bytes starting at `start`.
    ///
    /// Returns `None` for an empty range, which has no header representation.
    pub fn new(start: u64, len: u64, total: u64) -> Option<Self> {
        if len == 0 {
            return None;
        }
        Some(Self {
            start,
            end: start + len - 1,
            total,
        })
    }

    /// Number of bytes covered by the range.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Always `false`: a constructed range covers at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl fmt::Display for ContentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bytes {}-{}/{}", self.start, self.end, self.total)
    }
}

impl FromStr for ContentRange {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ParseError::ContentRange(s.to_string());

        let rest = s.trim().strip_prefix("bytes ").ok_or_else(malformed)?;
        let (range, total) = rest.split_once('/').ok_or_else(malformed)?;
        let (start, end) = range.split_once('-').ok_or_else(malformed)?;

        let start: u64 = start.parse().map_err(|_| malformed())?;
        let end: u64 = end.parse().map_err(|_| malformed())?;
        let total: u64 = total.parse().map_err(|_| malformed())?;
        if end < start || end >= total {
            return Err(malformed());
        }
        Ok(Self { start, end, total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framework_codes_roundtrip() {
        for fw in Framework::ALL {
            assert_eq!(fw.code().parse::<Framework>().unwrap(), fw);
        }
        assert!("jax".parse::<Framework>().is_err());
    }

    #[test]
    fn framework_serializes_as_code() {
        let json = serde_json::to_string(&Framework::TensorFlow).unwrap();
        assert_eq!(json, r#""tf""#);
    }

    #[test]
    fn input_kind_parse_is_case_insensitive() {
        assert_eq!("Image".parse::<InputKind>().unwrap(), InputKind::Image);
        assert_eq!(" json ".parse::<InputKind>().unwrap(), InputKind::Json);
        assert!("spreadsheet".parse::<InputKind>().is_err());
    }

    #[test]
    fn repo_settings_json_shape() {
        let settings = RepoSettings {
            repo_name: "text2image:latest".into(),
            framework: Framework::PyTorch,
            title: "Text to image".into(),
            input_type: vec![InputKind::Text],
            output_type: vec![InputKind::Image],
            price: 0,
        };
        let value = serde_json::to_value(&settings).unwrap();
        assert_eq!(value["repo_name"], "text2image:latest");
        assert_eq!(value["framework"], "pt");
        assert_eq!(value["input_type"][0], "text");
        assert_eq!(value["output_type"][0], "image");
        assert_eq!(value["price"], 0);
    }

    #[test]
    fn repo_settings_omits_empty_outputs() {
        let settings = RepoSettings {
            repo_name: "r".into(),
            framework: Framework::Other,
            title: "t".into(),
            input_type: vec![InputKind::Audio],
            output_type: Vec::new(),
            price: 3,
        };
        let json = serde_json::to_string(&settings).unwrap();
        assert!(!json.contains("output_type"));
    }

    #[test]
    fn content_range_formats_inclusive_end() {
        let range = ContentRange::new(1024, 512, 4096).unwrap();
        assert_eq!(range.to_string(), "bytes 1024-1535/4096");
        assert_eq!(range.len(), 512);
    }

    #[test]
    fn content_range_empty_is_none() {
        assert!(ContentRange::new(10, 0, 10).is_none());
    }

    #[test]
    fn content_range_parse() {
        let range: ContentRange = "bytes 0-1048575/2621440".parse().unwrap();
        assert_eq!(range.start, 0);
        assert_eq!(range.end, 1_048_575);
        assert_eq!(range.total, 2_621_440);
    }

    #[test]
    fn content_range_parse_rejects_garbage() {
        assert!("0-10/20".parse::<ContentRange>().is_err());
        assert!("bytes 10-5/20".parse::<ContentRange>().is_err());
        assert!("bytes 0-20/20".parse::<ContentRange>().is_err());
        assert!("bytes a-b/c".parse::<ContentRange>().is_err());
    }
}
