use std::path::PathBuf;

use clap::{Parser, Subcommand};
use matrix_manager::ProjectKind;
use matrix_pipeline::{Device, Framework};

/// Manage Matrix model projects and their repositories.
#[derive(Debug, Parser)]
#[command(name = "matrix-admin", version)]
pub struct Cli {
    /// Project directory.
    #[arg(long, short = 'C', global = true, default_value = ".")]
    pub project: PathBuf,

    /// API token; overrides matrix.toml and MATRIX_TOKEN.
    #[arg(long, global = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a new project in the current directory.
    Startproject {
        /// Project name; asked for when omitted.
        name: Option<String>,
        /// `pipeline` or `custom`.
        #[arg(long)]
        kind: Option<ProjectKind>,
        /// `pt`, `tf` or `oth`.
        #[arg(long)]
        framework: Option<Framework>,
    },
    /// Run the project image on its samples.
    Test {
        /// Shorthand for `--device cuda:0`.
        #[arg(long, conflicts_with = "device")]
        gpu: bool,
        /// cpu, cuda, cuda:N or a GPU index.
        #[arg(long, default_value = "cpu", allow_hyphen_values = true)]
        device: Device,
    },
    /// Upload the project as a repository, resuming an interrupted upload.
    Commit {
        /// Resume an interrupted upload without asking.
        #[arg(long, conflicts_with = "fresh")]
        resume: bool,
        /// Always start over.
        #[arg(long)]
        fresh: bool,
    },
    /// Build the repository into an API, or the image locally.
    Build {
        /// Run `docker build` here instead of on the platform.
        #[arg(long)]
        local: bool,
    },
    /// Delete the repository and its API.
    Delete {
        /// Repository to delete; defaults to the project's docker tag.
        #[arg(long)]
        repo: Option<String>,
        /// Do not ask for confirmation.
        #[arg(long, short)]
        yes: bool,
    },
    /// Rewrite the Dockerfile for a framework.
    Dockerfile {
        /// Defaults to the framework in matrix.toml.
        framework: Option<Framework>,
    },
    /// List repositories on the platform.
    Repos,
}

impl Command {
    /// Device selected for `test`.
    pub fn test_device(gpu: bool, device: Device) -> Device {
        if gpu { Device::Cuda(0) } else { device }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_global_project_dir() {
        let cli = Cli::try_parse_from(["matrix-admin", "commit", "-C", "/work/demo", "--resume"]).unwrap();
        assert_eq!(cli.project, PathBuf::from("/work/demo"));
        assert!(matches!(cli.command, Command::Commit { resume: true, fresh: false }));
    }

    #[test]
    fn resume_and_fresh_conflict() {
        assert!(Cli::try_parse_from(["matrix-admin", "commit", "--resume", "--fresh"]).is_err());
    }

    #[test]
    fn startproject_values() {
        let cli = Cli::try_parse_from([
            "matrix-admin",
            "startproject",
            "demo",
            "--kind",
            "custom",
            "--framework",
            "tf",
        ])
        .unwrap();
        match cli.command {
            Command::Startproject { name, kind, framework } => {
                assert_eq!(name.as_deref(), Some("demo"));
                assert_eq!(kind, Some(ProjectKind::Custom));
                assert_eq!(framework, Some(Framework::TensorFlow));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(Cli::try_parse_from(["matrix-admin", "startproject", "--framework", "jax"]).is_err());
    }

    #[test]
    fn test_device_selection() {
        let cli = Cli::try_parse_from(["matrix-admin", "test", "--device", "cuda:1"]).unwrap();
        let Command::Test { gpu, device } = cli.command else {
            panic!("expected test");
        };
        assert_eq!(Command::test_device(gpu, device), Device::Cuda(1));
        assert_eq!(Command::test_device(true, Device::Cpu), Device::Cuda(0));

        assert!(Cli::try_parse_from(["matrix-admin", "test", "--gpu", "--device", "cpu"]).is_err());
    }
}
