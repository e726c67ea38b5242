use matrix_pipeline::{InputKind, PipelineError, RunArgs, load_samples, write_error};

fn run(args: &RunArgs) -> Result<usize, PipelineError> {
    let samples = load_samples(&args.input_dir, &[InputKind::Text])?;
    if samples.is_empty() {
        return Err(PipelineError::EmptyInput);
    }
    let mut written = 0;
    for (i, text) in samples.texts().enumerate() {
        std::fs::write(args.output_dir.join(format!("{i}.txt")), text.chars().rev().collect::<String>())?;
        written += 1;
    }
    Ok(written)
}

fn main() -> Result<(), PipelineError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = RunArgs::from_env()?;
    match run(&args) {
        Ok(written) => {
            tracing::info!(files = written, "done");
            Ok(())
        }
        Err(e) => {
            write_error(&args.output_dir, &e.to_string())?;
            Err(e)
        }
    }
}
