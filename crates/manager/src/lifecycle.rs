//! Repository lifecycle on the platform: delete and remote build.
//!
//! Neither operation touches local state.

use matrix_client::Client;
use tracing::info;

use crate::ManagerError;

/// Deletes the repository `repo_name` and its API.
pub async fn delete_repo(client: &Client, repo_name: &str) -> Result<(), ManagerError> {
    client.delete_repo(repo_name).await?;
    info!(repo_name, "repository removed");
    Ok(())
}

/// Asks the platform to build the uploaded repository into an API.
pub async fn build_remote(client: &Client, repo_name: &str) -> Result<serde_json::Value, ManagerError> {
    let response = client.build_repo(repo_name).await?;
    info!(repo_name, %response, "build requested");
    Ok(response)
}
