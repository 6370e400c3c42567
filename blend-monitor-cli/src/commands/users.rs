use crate::client::ApiClient;
use crate::config::Config;
use crate::types::Result;
use crate::utils::*;
use blend_monitor::api::types::{RoleUpdateRequest, RoleUpdateResponse, UsersResponse};
use colored::*;
use reqwest::Method;

pub async fn handle_users(limit: Option<i64>, offset: Option<i64>) -> Result<()> {
    let client = ApiClient::from_config(&Config::load()?)?;
    let mut query = Vec::new();
    if let Some(limit) = limit {
        query.push(("limit", limit.to_string()));
    }
    if let Some(offset) = offset {
        query.push(("offset", offset.to_string()));
    }

    let spinner = create_spinner("Loading users...");
    let response: UsersResponse = client.get_authed(&["api", "users"], &query).await?;
    spinner.finish_and_clear();

    print_header(&format!("👥 Users ({} of {})", response.users.len(), response.total));
    for user in &response.users {
        let role = match user.role.as_str() {
            "admin" => user.role.red().bold(),
            "developer" => user.role.yellow(),
            _ => user.role.normal(),
        };
        let last_login = user
            .last_login
            .map(|t| t.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "  {:<28} {:<32} {:<10} last login {}",
            user.id.cyan(),
            user.email,
            role,
            last_login.dimmed()
        );
    }
    if response.users.is_empty() {
        print_warning("No users on this page");
    }
    Ok(())
}

pub async fn handle_role(user_id: String, role: String) -> Result<()> {
    let client = ApiClient::from_config(&Config::load()?)?;

    let spinner = create_spinner(&format!("Updating role of {}...", user_id));
    let response: RoleUpdateResponse = client
        .send_authed(
            Method::PUT,
            &["api", "users", user_id.as_str(), "role"],
            &RoleUpdateRequest { role: Some(role) },
        )
        .await?;
    spinner.finish_and_clear();

    print_success(&format!(
        "{} is now {} (was {})",
        response.user_id, response.new_role, response.old_role
    ));
    Ok(())
}
