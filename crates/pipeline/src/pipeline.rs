use tracing::{error, info};

use crate::{PipelineError, RunArgs, Samples, load_samples, write_error};
use matrix_protocol::InputKind;

/// Free-form keyword parameters for one pipeline stage.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// Parameters for each stage of [`Pipeline::run`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageParams {
    pub preprocess: Params,
    pub forward: Params,
    pub postprocess: Params,
}

/// A model wrapped as preprocess, forward and postprocess stages.
///
/// Implementations hold their loaded model and whatever the stages need
/// (device, output directory, configuration).
pub trait Pipeline {
    /// Output of [`Pipeline::preprocess`], fed to [`Pipeline::forward`].
    type Prepared;
    /// Output of [`Pipeline::forward`].
    type Raw;
    /// Final result, typically the list of files written.
    type Output;

    fn preprocess(&mut self, inputs: &Samples, params: &Params) -> Result<Self::Prepared, PipelineError>;

    fn forward(&mut self, prepared: Self::Prepared, params: &Params) -> Result<Self::Raw, PipelineError>;

    fn postprocess(&mut self, raw: Self::Raw, params: &Params) -> Result<Self::Output, PipelineError>;

    /// Runs the three stages in order. Empty inputs are rejected before
    /// any stage runs.
    fn run(&mut self, inputs: &Samples, params: &StageParams) -> Result<Self::Output, PipelineError> {
        if inputs.is_empty() {
            return Err(PipelineError::EmptyInput);
        }
        let prepared = self.preprocess(inputs, &params.preprocess)?;
        let raw = self.forward(prepared, &params.forward)?;
        self.postprocess(raw, &params.postprocess)
    }
}

/// Loads the samples named by `args`, runs `pipeline` on them and, on
/// failure, leaves the message in the output directory's error file.
pub fn execute<P: Pipeline>(
    pipeline: &mut P,
    args: &RunArgs,
    kinds: &[InputKind],
    params: &StageParams,
) -> Result<P::Output, PipelineError> {
    let result = load_samples(&args.input_dir, kinds).and_then(|inputs| {
        info!(
            samples = inputs.len(),
            device = %args.device,
            framework = %args.framework,
            "running pipeline"
        );
        pipeline.run(&inputs, params)
    });

    if let Err(e) = &result {
        error!(error = %e, "pipeline failed");
        write_error(&args.output_dir, &e.to_string())?;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Device;
    use matrix_protocol::Framework;
    use tempfile::TempDir;

    /// Upper-cases every text sample and records the stages it went through.
    #[derive(Default)]
    struct Shout {
        calls: Vec<&'static str>,
        fail_forward: bool,
    }

    impl Pipeline for Shout {
        type Prepared = Vec<String>;
        type Raw = Vec<String>;
        type Output = String;

        fn preprocess(&mut self, inputs: &Samples, _: &Params) -> Result<Vec<String>, PipelineError> {
            self.calls.push("preprocess");
            Ok(inputs.texts().map(str::to_string).collect())
        }

        fn forward(&mut self, prepared: Vec<String>, params: &Params) -> Result<Vec<String>, PipelineError> {
            self.calls.push("forward");
            if self.fail_forward {
                return Err(PipelineError::failed("shout", "upper-v1", "model crashed"));
            }
            let suffix = params.get("suffix").and_then(|v| v.as_str()).unwrap_or("");
            Ok(prepared.into_iter().map(|t| t.to_uppercase() + suffix).collect())
        }

        fn postprocess(&mut self, raw: Vec<String>, _: &Params) -> Result<String, PipelineError> {
            self.calls.push("postprocess");
            Ok(raw.join("|"))
        }
    }

    fn text_samples(texts: &[&str]) -> Samples {
        let mut samples = Samples::default();
        for t in texts {
            samples.push(InputKind::Text, crate::Sample::Text(t.to_string()));
        }
        samples
    }

    #[test]
    fn run_chains_stages_in_order() {
        let mut p = Shout::default();
        let mut params = StageParams::default();
        params.forward.insert("suffix".into(), "!".into());

        let out = p.run(&text_samples(&["hi", "there"]), &params).unwrap();
        assert_eq!(out, "HI!|THERE!");
        assert_eq!(p.calls, vec!["preprocess", "forward", "postprocess"]);
    }

    #[test]
    fn run_rejects_empty_inputs() {
        let mut p = Shout::default();
        let result = p.run(&Samples::default(), &StageParams::default());
        assert!(matches!(result, Err(PipelineError::EmptyInput)));
        assert!(p.calls.is_empty());
    }

    #[test]
    fn stage_error_stops_the_run() {
        let mut p = Shout {
            fail_forward: true,
            ..Default::default()
        };
        let result = p.run(&text_samples(&["x"]), &StageParams::default());
        assert!(matches!(result, Err(PipelineError::Failed { .. })));
        assert_eq!(p.calls, vec!["preprocess", "forward"]);
    }

    fn args_for(dir: &TempDir) -> RunArgs {
        RunArgs {
            input_dir: dir.path().join("data"),
            output_dir: dir.path().join("results"),
            device: Device::Cpu,
            framework: Framework::PyTorch,
        }
    }

    #[test]
    fn execute_loads_and_runs() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        std::fs::write(dir.path().join("data").join("p.txt"), "hello").unwrap();

        let mut p = Shout::default();
        let out = execute(&mut p, &args_for(&dir), &[InputKind::Text], &StageParams::default()).unwrap();
        assert_eq!(out, "HELLO");
        assert!(!dir.path().join("results").join("error").exists());
    }

    #[test]
    fn execute_writes_error_file_on_failure() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("data")).unwrap();

        let mut p = Shout::default();
        let result = execute(&mut p, &args_for(&dir), &[InputKind::Text], &StageParams::default());
        assert!(matches!(result, Err(PipelineError::EmptyInput)));

        let written =
            std::fs::read_to_string(dir.path().join("results").join("error").join("error.txt")).unwrap();
        assert_eq!(written, "the inputs are empty");
    }
}
