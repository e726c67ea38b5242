//! Local docker build and container test run.
//!
//! Both shell out to the docker CLI. Its stdout is streamed to the log
//! line by line; stderr is collected and decides success together with
//! the exit status.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use matrix_pipeline::{Device, InputKind, load_samples};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tracing::{info, warn};

use crate::ManagerError;
use crate::settings::{DockerSettings, ProjectSettings};

const SAMPLES_DIR: &str = "samples";
const RESULTS_DIR: &str = "results";
const WEIGHTS_DIR: &str = "weights";

/// Finished docker invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandReport {
    /// Exit code, `None` when killed by a signal.
    pub code: Option<i32>,
    pub stderr: String,
}

impl CommandReport {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Docker CLI runner.
#[derive(Debug, Clone)]
pub struct Docker {
    program: String,
    use_sudo: bool,
}

impl Docker {
    pub fn new(program: impl Into<String>, use_sudo: bool) -> Self {
        Self {
            program: program.into(),
            use_sudo,
        }
    }

    pub fn from_settings(settings: &DockerSettings) -> Self {
        Self::new(settings.program.clone(), settings.use_sudo)
    }

    /// Program and arguments actually executed for `args`.
    fn command_line(&self, args: Vec<String>) -> (String, Vec<String>) {
        if self.use_sudo {
            let mut full = vec![self.program.clone()];
            full.extend(args);
            ("sudo".to_string(), full)
        } else {
            (self.program.clone(), args)
        }
    }

    /// Builds `dir` into an image tagged `tag`.
    ///
    /// Uses the classic builder so progress goes to stdout; any stderr
    /// output fails the build.
    pub async fn build_local(&self, dir: &Path, tag: &str) -> Result<CommandReport, ManagerError> {
        let args = vec![
            "build".to_string(),
            dir.display().to_string(),
            "--tag".to_string(),
            tag.to_string(),
        ];
        let (command, report) = self.run(args, &[("DOCKER_BUILDKIT", "0")]).await?;

        if !report.success() || !report.stderr.is_empty() {
            return Err(ManagerError::Command {
                command,
                reason: failure_reason(&report),
            });
        }
        info!(tag, "image built");
        Ok(report)
    }

    /// Runs the project image against `<dir>/samples`, writing into
    /// `<dir>/results`.
    ///
    /// The samples must cover exactly the declared input types. A run fails
    /// when the container exits non-zero with stderr that is not just
    /// warnings.
    pub async fn test_project(
        &self,
        dir: &Path,
        settings: &ProjectSettings,
        device: Device,
    ) -> Result<CommandReport, ManagerError> {
        let dir = std::path::absolute(dir)?;
        let samples_dir = samples_dir(&dir);
        check_samples(&samples_dir, settings)?;

        let results_dir = dir.join(RESULTS_DIR);
        let weights_dir = dir.join(WEIGHTS_DIR);
        std::fs::create_dir_all(&results_dir)?;
        std::fs::create_dir_all(&weights_dir)?;

        let args = run_args(
            &samples_dir,
            &results_dir,
            &weights_dir,
            settings,
            device,
        );
        let (command, report) = self.run(args, &[]).await?;

        if !report.success() && !report.stderr.is_empty() {
            if !report.stderr.to_lowercase().contains("warning") {
                return Err(ManagerError::Command {
                    command,
                    reason: failure_reason(&report),
                });
            }
            warn!(stderr = %report.stderr.trim(), "test run exited with warnings only");
        }
        info!(results = %results_dir.display(), code = ?report.code, "test run finished");
        Ok(report)
    }

    async fn run(
        &self,
        args: Vec<String>,
        envs: &[(&str, &str)],
    ) -> Result<(String, CommandReport), ManagerError> {
        let (program, args) = self.command_line(args);
        let rendered = std::iter::once(program.as_str())
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        info!(command = %rendered, "running");

        let mut child = tokio::process::Command::new(&program)
            .args(&args)
            .envs(envs.iter().copied())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ManagerError::Command {
                command: rendered.clone(),
                reason: format!("failed to start: {e}"),
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let forward_stdout = async {
            if let Some(out) = stdout {
                let mut lines = BufReader::new(out).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    info!(target: "matrix_manager::docker", "{line}");
                }
            }
        };
        let collect_stderr = async {
            let mut buf = Vec::new();
            if let Some(mut err) = stderr {
                err.read_to_end(&mut buf).await?;
            }
            Ok::<_, std::io::Error>(String::from_utf8_lossy(&buf).into_owned())
        };

        let ((), stderr, status) = tokio::join!(forward_stdout, collect_stderr, child.wait());
        let stderr = stderr.map_err(|e| ManagerError::Command {
            command: rendered.clone(),
            reason: format!("failed to read stderr: {e}"),
        })?;
        let status = status?;

        Ok((
            rendered,
            CommandReport {
                code: status.code(),
                stderr,
            },
        ))
    }
}

fn failure_reason(report: &CommandReport) -> String {
    let code = report
        .code
        .map_or_else(|| "killed by signal".to_string(), |c| format!("exit code {c}"));
    let stderr = report.stderr.trim();
    if stderr.is_empty() {
        code
    } else {
        format!("{code}: {stderr}")
    }
}

/// Loads the samples and compares their kinds with the declared inputs.
fn check_samples(samples_dir: &Path, settings: &ProjectSettings) -> Result<(), ManagerError> {
    let samples = load_samples(samples_dir, &settings.input_types)?;
    if samples.is_empty() {
        return Err(ManagerError::Samples(format!(
            "no samples in {} for automatic testing",
            samples_dir.display()
        )));
    }

    let declared: BTreeSet<_> = settings.input_types.iter().copied().collect();
    let loaded: BTreeSet<_> = samples.kinds().into_iter().collect();
    if declared != loaded {
        let names = |set: &BTreeSet<InputKind>| {
            set.iter()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        return Err(ManagerError::Samples(format!(
            "loaded [{}] but the project declares [{}]",
            names(&loaded),
            names(&declared)
        )));
    }
    Ok(())
}

fn bind_mount(source: &Path, target: &str) -> String {
    format!("type=bind,source={},target={target}", source.display())
}

fn run_args(
    samples_dir: &Path,
    results_dir: &Path,
    weights_dir: &Path,
    settings: &ProjectSettings,
    device: Device,
) -> Vec<String> {
    let mut args = vec!["run".to_string()];
    if device.is_gpu() {
        args.extend(["--gpus".to_string(), "all".to_string()]);
    }
    for (source, target) in [
        (samples_dir, "/app/data/"),
        (results_dir, "/app/results/"),
        (weights_dir, "/app/weights/"),
    ] {
        args.push("--mount".to_string());
        args.push(bind_mount(source, target));
    }
    args.push(settings.docker_tag.clone());
    args.extend(settings.entrypoint.split_whitespace().map(str::to_string));
    args.extend([
        "--input_dir".to_string(),
        "/app/data".to_string(),
        "--output_dir".to_string(),
        "/app/results".to_string(),
        "--device".to_string(),
        device.to_string(),
        "--framework".to_string(),
        settings.framework.to_string(),
    ]);
    args
}

/// Default location of the test inputs inside a project.
pub fn samples_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(SAMPLES_DIR)
}
