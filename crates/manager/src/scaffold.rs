//! New project scaffolding from the embedded templates.

use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use matrix_protocol::Framework;
use matrix_transfer::extract_archive;
use tracing::info;

use crate::ManagerError;
use crate::settings::{ProjectSettings, SETTINGS_FILE};

const PIPELINE_TEMPLATE: &[u8] = include_bytes!("../templates/pipeline.zip");
const CUSTOM_TEMPLATE: &[u8] = include_bytes!("../templates/custom.zip");

const DOCKERFILE_PT: &str = include_str!("../templates/docker/Dockerfile-pt");
const DOCKERFILE_TF: &str = include_str!("../templates/docker/Dockerfile-tf");
const DOCKERFILE_OTH: &str = include_str!("../templates/docker/Dockerfile-oth");

/// Template a new project starts from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProjectKind {
    /// Model implemented through the `Pipeline` trait.
    #[default]
    Pipeline,
    /// Free-form entrypoint.
    Custom,
}

impl ProjectKind {
    fn template(self) -> &'static [u8] {
        match self {
            Self::Pipeline => PIPELINE_TEMPLATE,
            Self::Custom => CUSTOM_TEMPLATE,
        }
    }
}

impl fmt::Display for ProjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pipeline => "pipeline",
            Self::Custom => "custom",
        })
    }
}

impl FromStr for ProjectKind {
    type Err = ManagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pipeline" => Ok(Self::Pipeline),
            "custom" => Ok(Self::Custom),
            other => Err(ManagerError::Project(format!(
                "unknown project kind `{other}` (expected pipeline or custom)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectOptions {
    pub name: String,
    pub kind: ProjectKind,
    pub framework: Framework,
}

/// Dockerfile contents for `framework`.
pub fn dockerfile_for(framework: Framework) -> &'static str {
    match framework {
        Framework::PyTorch => DOCKERFILE_PT,
        Framework::TensorFlow => DOCKERFILE_TF,
        Framework::Other => DOCKERFILE_OTH,
    }
}

/// Overwrites `<dir>/Dockerfile` with the one for `framework`.
pub fn update_dockerfile(dir: &Path, framework: Framework) -> Result<PathBuf, ManagerError> {
    let path = dir.join("Dockerfile");
    std::fs::write(&path, dockerfile_for(framework))?;
    info!(path = %path.display(), %framework, "Dockerfile written");
    Ok(path)
}

fn validate_name(name: &str) -> Result<(), ManagerError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.chars().any(|c| c == '/' || c == '\\' || c.is_whitespace() || c.is_control());
    if invalid {
        return Err(ManagerError::Project(format!("invalid project name `{name}`")));
    }
    Ok(())
}

/// Creates `<cwd>/<name>` from the template for `options.kind`.
///
/// The new project's settings get the docker tag `<name>:latest` and the
/// chosen framework. An existing non-empty directory is left alone.
pub fn setup_project(cwd: &Path, options: &ProjectOptions) -> Result<PathBuf, ManagerError> {
    validate_name(&options.name)?;
    let dir = cwd.join(&options.name);
    if dir.exists() && std::fs::read_dir(&dir)?.next().is_some() {
        return Err(ManagerError::Project(format!(
            "{} already exists and is not empty",
            dir.display()
        )));
    }

    let files = extract_archive(Cursor::new(options.kind.template()), &dir)?;
    update_dockerfile(&dir, options.framework)?;

    let settings_path = dir.join(SETTINGS_FILE);
    let content = std::fs::read_to_string(&settings_path)?;
    let settings = ProjectSettings {
        docker_tag: format!("{}:latest", options.name.to_lowercase()),
        framework: options.framework,
        ..ProjectSettings::parse(&content, &settings_path)?
    };
    settings.save(&dir)?;

    info!(
        dir = %dir.display(),
        kind = %options.kind,
        framework = %options.framework,
        files,
        "project created"
    );
    Ok(dir)
}
