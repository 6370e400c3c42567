use crate::client::ApiClient;
use crate::config::Config;
use crate::types::Result;
use crate::utils::*;
use blend_monitor::api::types::{HealthReport, HealthStatus};
use colored::*;
use std::io::Write;

fn prompt(question: &str) -> Result<String> {
    print!("{}", question);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(answer.trim().to_string())
}

pub async fn handle_setup() -> Result<()> {
    print_info("Welcome to blendctl setup. Let's point the CLI at your monitor.\n");

    let mut config = Config::load().unwrap_or_default();

    println!("{}", "═".repeat(50).cyan());
    println!("{}", "Step 1: API Endpoint".cyan().bold());
    println!("{}", "═".repeat(50).cyan());

    println!("\nCurrent API URL: {}", config.api_url.cyan());
    let url = prompt("Enter API base URL (or press Enter to keep it): ")?;
    if !url.is_empty() {
        config.api_url = url.trim_end_matches('/').to_string();
        print_success(&format!("API URL set to: {}", config.api_url));
    }

    println!("\n{}", "═".repeat(50).cyan());
    println!("{}", "Step 2: Access Token".cyan().bold());
    println!("{}", "═".repeat(50).cyan());

    println!("\n{}", "A bearer token is needed for users, role, deploy, rollback and usage updates.".yellow());
    println!("   Ask your monitor operator for an entry from AUTH_TOKENS.");
    let token = prompt("\nEnter your API token (or press Enter to skip): ")?;
    if !token.is_empty() {
        config.token = Some(token);
        print_success("API token saved");
    } else if config.token.is_some() {
        print_info("Keeping the existing token");
    } else {
        print_info("Skipped token. Read-only commands will still work.");
    }

    println!("\n{}", "═".repeat(50).cyan());
    println!("{}", "Step 3: Connectivity Check".cyan().bold());
    println!("{}", "═".repeat(50).cyan());

    let spinner = create_spinner("Contacting monitor...");
    let client = ApiClient::from_config(&config)?;
    match client.get::<HealthReport>(&["health"], &[]).await {
        Ok(report) => {
            spinner.finish_and_clear();
            match report.status {
                HealthStatus::Healthy => print_success("Monitor is reachable and healthy"),
                HealthStatus::Degraded => print_warning("Monitor is reachable but degraded (see 'blendctl health')"),
            }
        }
        Err(e) => {
            spinner.finish_and_clear();
            print_warning(&format!("Could not reach {}: {}", config.api_url, e));
            print_info("The configuration is saved anyway; re-run setup once the monitor is up.");
        }
    }

    config.save()?;

    println!("\n{}", "═".repeat(50).green());
    println!("{}", "Setup Complete!".green().bold());
    println!("{}", "═".repeat(50).green());

    println!("\n{}", "Configuration Summary:".cyan().bold());
    println!("  API URL: {}", config.api_url.cyan());
    if config.token.is_some() {
        println!("  Token: {} {}", "✓".green(), "Configured".cyan());
    } else {
        println!("  Token: {} {}", "✗".red(), "Not configured".yellow());
    }

    println!("\n{}", "Next Steps:".cyan().bold());
    println!("  • Package stats: {}", "blendctl stats".cyan());
    println!("  • Refresh from NPM: {}", "blendctl sync".cyan());
    println!("  • Deployment history: {}", "blendctl deployments".cyan());

    println!("\n{}", "Configuration saved to: ~/.blend-monitor/config.toml".green());
    Ok(())
}
