use crate::client::{describe_error, ApiClient};
use crate::config::Config;
use crate::types::Result;
use crate::utils::*;
use blend_monitor::api::types::SyncResponse;
use blend_monitor::db::models::{DownloadTrend, PackageStats, VersionInfo};
use blend_monitor::sync::KindReport;
use colored::*;

fn client() -> Result<ApiClient> {
    ApiClient::from_config(&Config::load()?)
}

fn print_source(source: Option<String>) {
    match source.as_deref() {
        Some("cache") => println!("\n{}", "Served from the monitor's cache".dimmed()),
        Some("registry") => println!("\n{}", "Served live from the NPM registry".dimmed()),
        _ => {}
    }
}

pub async fn handle_stats() -> Result<()> {
    let client = client()?;
    let spinner = create_spinner("Fetching package stats...");
    let (stats, source): (PackageStats, _) = client.get_with_source(&["api", "npm", "stats"], &[]).await?;
    spinner.finish_and_clear();

    println!("\n{} {}", "📦".cyan(), stats.name.green().bold());
    println!("{}", "═".repeat(80).cyan());
    println!("  Latest version: {}", stats.version.cyan());
    if let Some(published) = stats.last_published {
        println!("  Published: {}", published.format("%Y-%m-%d %H:%M UTC").to_string().yellow());
    }
    println!("  Dependencies: {}", stats.dependency_count);

    println!("\n{}", "📈 Downloads".cyan().bold());
    println!("  Last day:   {}", format_number(stats.downloads_daily).yellow());
    println!("  Last week:  {}", format_number(stats.downloads_weekly).yellow());
    println!("  Last month: {}", format_number(stats.downloads_monthly).yellow());
    println!("  Total:      {}", format_number(stats.downloads_total).green().bold());

    println!("\n{}", "💾 Size".cyan().bold());
    let size = |s: Option<i64>| s.map(format_bytes).unwrap_or_else(|| "unknown".to_string());
    println!("  Unpacked: {}", size(stats.unpacked_size));
    println!("  Gzipped:  {}", size(stats.gzipped_size));

    print_source(source);
    Ok(())
}

pub async fn handle_versions(limit: usize) -> Result<()> {
    let client = client()?;
    let spinner = create_spinner("Fetching version history...");
    let (versions, source): (Vec<VersionInfo>, _) = client.get_with_source(&["api", "npm", "versions"], &[]).await?;
    spinner.finish_and_clear();

    print_header(&format!("🏷  Versions ({} published)", versions.len()));
    for v in versions.iter().take(limit) {
        let marker = if v.is_breaking { " BREAKING".red().bold().to_string() } else { String::new() };
        println!(
            "  {:<16} {}  {:>10} dl/wk  {}{}",
            v.version.cyan(),
            v.published_at.format("%Y-%m-%d"),
            v.downloads.map(format_number).unwrap_or_else(|| "-".to_string()),
            v.publisher.as_deref().unwrap_or("-").dimmed(),
            marker
        );
    }
    if versions.len() > limit {
        println!("  {}", format!("… {} older versions (use --limit)", versions.len() - limit).dimmed());
    }

    print_source(source);
    Ok(())
}

pub async fn handle_trends(days: Option<u32>) -> Result<()> {
    let client = client()?;
    let query: Vec<(&str, String)> = days.map(|d| ("days", d.to_string())).into_iter().collect();

    let spinner = create_spinner("Fetching download trends...");
    let (trends, source): (Vec<DownloadTrend>, _) = client.get_with_source(&["api", "npm", "trends"], &query).await?;
    spinner.finish_and_clear();

    let total: i64 = trends.iter().map(|t| t.downloads).sum();
    let max = trends.iter().map(|t| t.downloads).max().unwrap_or(0);

    print_header(&format!("📊 Daily downloads ({} days)", trends.len()));
    for t in &trends {
        println!(
            "  {} {:>9} {}",
            t.date.format("%Y-%m-%d"),
            format_number(t.downloads),
            bar(t.downloads, max, 50).cyan()
        );
    }
    println!("{}", "─".repeat(80));
    println!("  Total: {}", format_number(total).green().bold());

    print_source(source);
    Ok(())
}

fn print_kind(name: &str, report: &KindReport) {
    match &report.error {
        None => println!(
            "  {} {:<10} saved {}, updated {}",
            "✓".green(),
            name,
            report.saved,
            report.updated
        ),
        Some(e) => println!("  {} {:<10} {}", "✗".red(), name, e.red()),
    }
}

pub async fn handle_sync() -> Result<()> {
    let client = client()?;
    let spinner = create_spinner("Syncing from the NPM registry...");
    let (status, body) = client.post_raw(&["api", "npm", "sync"]).await?;
    spinner.finish_and_clear();

    let response: SyncResponse = serde_json::from_str(&body).map_err(|_| describe_error(status, &body))?;

    print_header("🔄 NPM Sync");
    print_kind("stats", &response.results.stats);
    print_kind("versions", &response.results.versions);
    print_kind("trends", &response.results.trends);
    println!("\n  Took {} ms", response.duration_ms);

    if response.success {
        print_success("Sync complete");
        Ok(())
    } else {
        Err(format!("Sync finished with errors (HTTP {})", status.as_u16()).into())
    }
}
