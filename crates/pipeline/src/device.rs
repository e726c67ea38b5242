use std::fmt;
use std::str::FromStr;

use crate::PipelineError;

/// Compute device a pipeline runs on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Device {
    #[default]
    Cpu,
    /// CUDA device by ordinal.
    Cuda(u32),
}

impl Device {
    /// Integer form used on the command line: `-1` for CPU, else the ordinal.
    pub fn index(self) -> i64 {
        match self {
            Self::Cpu => -1,
            Self::Cuda(n) => i64::from(n),
        }
    }

    pub fn is_gpu(self) -> bool {
        matches!(self, Self::Cuda(_))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu"),
            Self::Cuda(n) => write!(f, "cuda:{n}"),
        }
    }
}

/// Accepts `cpu` (anywhere in the string), an empty string, an integer
/// (negative means CPU), `cuda` and `cuda:N`.
impl FromStr for Device {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(n) = s.parse::<i64>() {
            return Ok(u32::try_from(n).map_or(Self::Cpu, Self::Cuda));
        }

        let lower = s.to_ascii_lowercase();
        if lower.is_empty() || lower.contains("cpu") {
            return Ok(Self::Cpu);
        }
        match lower.strip_prefix("cuda") {
            Some("") => Ok(Self::Cuda(0)),
            Some(rest) => rest
                .strip_prefix(':')
                .and_then(|n| n.parse().ok())
                .map(Self::Cuda)
                .ok_or_else(|| PipelineError::InvalidDevice(s.to_string())),
            None => Err(PipelineError::InvalidDevice(s.to_string())),
        }
    }
}
