use std::path::PathBuf;

use matrix_pipeline::{
    Device, InputKind, Params, Pipeline, PipelineError, RunArgs, Samples, StageParams, execute,
};

/// Input kinds this model accepts. Keep in sync with `input_types` in
/// matrix.toml.
const INPUT_TYPES: &[InputKind] = &[InputKind::Text];

struct Model {
    device: Device,
    output_dir: PathBuf,
}

impl Model {
    fn load(args: &RunArgs) -> Result<Self, PipelineError> {
        // Load weights from /app/weights here.
        Ok(Self {
            device: args.device,
            output_dir: args.output_dir.clone(),
        })
    }
}

impl Pipeline for Model {
    type Prepared = Vec<String>;
    type Raw = Vec<String>;
    type Output = Vec<PathBuf>;

    fn preprocess(&mut self, inputs: &Samples, _params: &Params) -> Result<Vec<String>, PipelineError> {
        Ok(inputs.texts().map(str::to_string).collect())
    }

    fn forward(&mut self, prompts: Vec<String>, _params: &Params) -> Result<Vec<String>, PipelineError> {
        tracing::info!(device = %self.device, prompts = prompts.len(), "forward");
        Ok(prompts.into_iter().map(|p| p.to_uppercase()).collect())
    }

    fn postprocess(&mut self, outputs: Vec<String>, _params: &Params) -> Result<Vec<PathBuf>, PipelineError> {
        let mut written = Vec::with_capacity(outputs.len());
        for (i, text) in outputs.iter().enumerate() {
            let path = self.output_dir.join(format!("{i}.txt"));
            std::fs::write(&path, text)?;
            written.push(path);
        }
        Ok(written)
    }
}

fn main() -> Result<(), PipelineError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = RunArgs::from_env()?;
    let mut model = Model::load(&args)?;
    let written = execute(&mut model, &args, INPUT_TYPES, &StageParams::default())?;
    tracing::info!(files = written.len(), "done");
    Ok(())
}
