use crate::client::ApiClient;
use crate::config::Config;
use crate::types::Result;
use crate::utils::*;
use blend_monitor::api::types::{DeploymentRequest, RollbackRequest, RollbackResponse};
use blend_monitor::db::models::{Deployment, DeploymentStatus};
use colored::*;
use reqwest::Method;

fn status_label(status: DeploymentStatus) -> ColoredString {
    match status {
        DeploymentStatus::Success => status.as_str().green(),
        DeploymentStatus::Failed => status.as_str().red().bold(),
        DeploymentStatus::RolledBack => status.as_str().magenta(),
        DeploymentStatus::Pending | DeploymentStatus::InProgress => status.as_str().yellow(),
    }
}

fn print_deployment(d: &Deployment) {
    println!(
        "  {} {:<12} {:<14} {:<12} by {}",
        d.started_at.format("%Y-%m-%d %H:%M"),
        d.environment.cyan(),
        d.version,
        status_label(d.status),
        d.deployed_by
    );
    let mut extra = vec![format!("id {}", d.id)];
    if let Some(sha) = &d.commit_sha {
        extra.push(format!("commit {}", sha.chars().take(8).collect::<String>()));
    }
    if let Some(of) = d.rollback_of {
        extra.push(format!("rollback of {}", of));
    }
    println!("    {}", extra.join("  ").dimmed());
}

pub async fn handle_history(environment: Option<String>, limit: Option<i64>) -> Result<()> {
    let client = ApiClient::from_config(&Config::load()?)?;
    let mut query = Vec::new();
    if let Some(env) = &environment {
        query.push(("environment", env.clone()));
    }
    if let Some(limit) = limit {
        query.push(("limit", limit.to_string()));
    }

    let spinner = create_spinner("Loading deployment history...");
    let history: Vec<Deployment> = client.get(&["api", "deployments", "history"], &query).await?;
    spinner.finish_and_clear();

    let title = match &environment {
        Some(env) => format!("🚀 Deployments in {}", env),
        None => "🚀 Deployments".to_string(),
    };
    print_header(&title);
    if history.is_empty() {
        print_warning("No deployments recorded");
        return Ok(());
    }
    for d in &history {
        print_deployment(d);
    }
    Ok(())
}

pub async fn handle_deploy(
    environment: String,
    version: String,
    commit: Option<String>,
    status: Option<String>,
) -> Result<()> {
    let client = ApiClient::from_config(&Config::load()?)?;

    let spinner = create_spinner(&format!("Recording {} → {}...", version, environment));
    let deployment: Deployment = client
        .send_authed(
            Method::POST,
            &["api", "deployments"],
            &DeploymentRequest {
                environment: Some(environment),
                version: Some(version),
                commit_sha: commit,
                status,
            },
        )
        .await?;
    spinner.finish_and_clear();

    print_success("Deployment recorded");
    print_deployment(&deployment);
    Ok(())
}

pub async fn handle_rollback(id: String, reason: Option<String>) -> Result<()> {
    let client = ApiClient::from_config(&Config::load()?)?;

    let spinner = create_spinner(&format!("Rolling back {}...", id));
    let response: RollbackResponse = client
        .send_authed(
            Method::POST,
            &["api", "deployments", id.as_str(), "rollback"],
            &RollbackRequest { reason },
        )
        .await?;
    spinner.finish_and_clear();

    print_success(&format!(
        "{} rolled back from {} to {}",
        response.deployment.environment, response.rolled_back.version, response.deployment.version
    ));
    print_deployment(&response.rolled_back);
    print_deployment(&response.deployment);
    Ok(())
}
