use std::path::PathBuf;

use clap::Parser;
use matrix_protocol::Framework;

use crate::{Device, PipelineError};

/// Command line every pipeline binary accepts. The platform and the local
/// test runner both invoke the entrypoint with these flags.
#[derive(Debug, Clone, PartialEq, Parser)]
#[command(about = "Runs the model pipeline on a directory of inputs")]
pub struct RunArgs {
    /// Directory holding the input files.
    #[arg(long = "input_dir", default_value = "data")]
    pub input_dir: PathBuf,

    /// Directory the results are written to; created if missing.
    #[arg(long = "output_dir", default_value = "results")]
    pub output_dir: PathBuf,

    /// Target device: cpu, cuda, cuda:N or an integer (-1 for cpu).
    #[arg(long, default_value = "cpu", allow_hyphen_values = true)]
    pub device: Device,

    /// `pt`, `tf` or `oth`.
    #[arg(long, default_value = "pt")]
    pub framework: Framework,
}

impl RunArgs {
    /// Parses the process arguments and creates the output directory.
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::parse().prepare()
    }

    /// Creates the output directory.
    pub fn prepare(self) -> Result<Self, PipelineError> {
        std::fs::create_dir_all(&self.output_dir)?;
        Ok(self)
    }
}
