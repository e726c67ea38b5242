use std::io::{BufRead, Write};
use std::path::Path;

use anyhow::{Context, bail};
use matrix_client::Client;
use matrix_manager::{
    CommitConfig, Docker, ProjectKind, ProjectOptions, ProjectSettings, Uploader, build_remote,
    delete_repo, setup_project, update_dockerfile,
};
use matrix_pipeline::Framework;
use matrix_transfer::ProgressRecord;

use crate::cli::{Cli, Command};
use crate::{progress, prompt};

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let project = cli.project.as_path();
    match cli.command {
        Command::Startproject { name, kind, framework } => {
            let stdin = std::io::stdin();
            let options = project_options(&mut stdin.lock(), &mut std::io::stdout(), name, kind, framework)?;
            let dir = setup_project(project, &options)?;
            println!("Project created in {}", dir.display());
        }
        Command::Test { gpu, device } => {
            let settings = ProjectSettings::load(project)?;
            let device = Command::test_device(gpu, device);
            Docker::from_settings(&settings.docker)
                .test_project(project, &settings, device)
                .await?;
            println!("Test run finished, see {}", project.join("results").display());
        }
        Command::Commit { resume, fresh } => commit(project, cli.token, resume, fresh).await?,
        Command::Build { local } => {
            let settings = ProjectSettings::load(project)?;
            if local {
                Docker::from_settings(&settings.docker)
                    .build_local(project, &settings.docker_tag)
                    .await?;
                println!("Built image {}", settings.docker_tag);
            } else {
                let client = client_for(&settings, cli.token)?;
                let response = build_remote(&client, &settings.docker_tag).await?;
                println!("{}", serde_json::to_string_pretty(&response)?);
            }
        }
        Command::Delete { repo, yes } => {
            let settings = ProjectSettings::load(project)?;
            let repo = repo.unwrap_or_else(|| settings.docker_tag.clone());
            let confirmed = yes || {
                let stdin = std::io::stdin();
                prompt::confirm(
                    &mut stdin.lock(),
                    &mut std::io::stdout(),
                    &format!("Delete repository {repo} and its API?"),
                    false,
                )?
            };
            if !confirmed {
                println!("Nothing deleted");
                return Ok(());
            }
            delete_repo(&client_for(&settings, cli.token)?, &repo).await?;
            println!("Deleted {repo}");
        }
        Command::Dockerfile { framework } => {
            let framework = match framework {
                Some(f) => f,
                None => ProjectSettings::load(project)?.framework,
            };
            let path = update_dockerfile(project, framework)?;
            println!("Wrote {} for {framework}", path.display());
        }
        Command::Repos => {
            let client = match ProjectSettings::load(project) {
                Ok(settings) => client_for(&settings, cli.token)?,
                Err(e) => {
                    tracing::debug!(error = %e, "no project settings, using defaults");
                    Client::new(ProjectSettings::default().with_token_override(cli.token).client_options())?
                }
            };
            println!("{}", serde_json::to_string_pretty(&client.list_repos().await?)?);
        }
    }
    Ok(())
}

fn client_for(settings: &ProjectSettings, token: Option<String>) -> anyhow::Result<Client> {
    let settings = settings.clone().with_token_override(token);
    if settings.token().is_none() {
        bail!("no API token: set MATRIX_TOKEN, pass --token or add `token` to matrix.toml");
    }
    Ok(Client::new(settings.client_options())?)
}

/// Fills in whatever `startproject` was not given on the command line.
fn project_options<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    name: Option<String>,
    kind: Option<ProjectKind>,
    framework: Option<Framework>,
) -> anyhow::Result<ProjectOptions> {
    let name = match name {
        Some(name) => name,
        None => prompt::ask(input, output, "Enter a name for your project:")?,
    };
    let kind = match kind {
        Some(kind) => kind,
        None => {
            let pipeline = prompt::confirm(input, output, "Set up a pipeline-based project (no for a custom one)?", true)?;
            if pipeline { ProjectKind::Pipeline } else { ProjectKind::Custom }
        }
    };
    let framework = match framework {
        Some(framework) => framework,
        None => prompt::ask_parsed(input, output, "Framework (pt for PyTorch, tf for TensorFlow, oth for others):")?,
    };
    Ok(ProjectOptions { name, kind, framework })
}

async fn commit(project: &Path, token: Option<String>, resume: bool, fresh: bool) -> anyhow::Result<()> {
    let settings = ProjectSettings::load(project)?;
    let client = client_for(&settings, token)?;
    let mut uploader = Uploader::new(client, CommitConfig::from_settings(project, &settings));

    let reporter = uploader
        .take_events()
        .map(|events| tokio::spawn(progress::report(events, std::io::stderr())));

    let cancel = uploader.cancel_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\ninterrupted, stopping after the current request (ctrl-c again to abort)");
            cancel.cancel();
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(130);
            }
        }
    });

    let mut ask = |record: &ProgressRecord, archive_size: u64| {
        if resume || fresh {
            return resume;
        }
        let stdin = std::io::stdin();
        let question = format!(
            "Found an unfinished upload ({} of {archive_size} bytes sent). Resume it?",
            record.offset
        );
        prompt::confirm(&mut stdin.lock(), &mut std::io::stdout(), &question, true).unwrap_or(false)
    };
    let result = uploader.commit(&mut ask).await;

    interrupt.abort();
    drop(uploader);
    if let Some(reporter) = reporter {
        let _ = reporter.await;
    }

    let outcome = result.with_context(|| {
        format!(
            "commit of {} failed; run commit again to resume",
            project.display()
        )
    })?;
    println!(
        "Committed {} ({} bytes, md5 {}){}",
        settings.docker_tag,
        outcome.total_bytes,
        outcome.md5,
        if outcome.resumed { ", resumed" } else { "" }
    );
    Ok(())
}
