use crate::client::ApiClient;
use crate::config::Config;
use crate::types::Result;
use crate::utils::*;
use blend_monitor::api::types::{ComponentHealth, HealthReport, HealthStatus};
use colored::*;

fn print_component(name: &str, component: &ComponentHealth) {
    if component.ok {
        println!("  {}: {}", name, "ok".green());
    } else {
        let reason = component.error.as_deref().unwrap_or("unreachable");
        println!("  {}: {} {}", name, "down".red().bold(), reason.red());
    }
}

pub async fn handle_health() -> Result<()> {
    let config = Config::load()?;
    let client = ApiClient::from_config(&config)?;

    let spinner = create_spinner(&format!("Checking {}...", client.base_url()));
    let report: HealthReport = client.get(&["health"], &[]).await?;
    spinner.finish_and_clear();

    print_header("🩺 Monitor Health");
    let status = match report.status {
        HealthStatus::Healthy => "healthy".green().bold(),
        HealthStatus::Degraded => "degraded".yellow().bold(),
    };
    println!("  Status: {}", status);
    print_component("Database", &report.database);
    print_component("NPM registry", &report.registry);

    if report.status == HealthStatus::Degraded {
        println!("\n{}", "💡 Reads still fall back to whichever source is up.".yellow());
    }
    Ok(())
}
