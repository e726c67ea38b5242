//! Building blocks for a Matrix model project.
//!
//! A project implements [`Pipeline`] for its model and runs it from a
//! small binary that parses [`RunArgs`], loads its samples with
//! [`load_samples`] and calls [`execute`].

mod args;
mod device;
mod error;
pub mod loaders;
mod pipeline;

pub use args::RunArgs;
pub use device::Device;
pub use error::{PipelineError, write_error};
pub use loaders::{Sample, Samples, classify, load_samples};
pub use matrix_protocol::{Framework, InputKind};
pub use pipeline::{Params, Pipeline, StageParams, execute};
