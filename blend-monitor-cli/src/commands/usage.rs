use crate::client::ApiClient;
use crate::config::Config;
use crate::types::Result;
use crate::utils::*;
use blend_monitor::alerts::{Metric, Severity, UsageAlert};
use blend_monitor::api::types::UsageReport;
use colored::*;

/// Severity the server raised for `metric`, if any.
fn severity_of(alerts: &[UsageAlert], metric: Metric) -> Option<Severity> {
    alerts.iter().filter(|a| a.metric == metric).map(|a| a.severity).max()
}

fn line(name: &str, used: f64, limit: f64, unit: &str, severity: Option<Severity>) {
    let pct = if limit > 0.0 { used / limit * 100.0 } else { 0.0 };
    let pct_text = format!("{:>5.1}%", pct);
    let pct_text = match severity {
        Some(Severity::Critical) => pct_text.red().bold(),
        Some(Severity::Warning) => pct_text.yellow(),
        None => pct_text.green(),
    };
    println!("  {:<20} {:>12.1} / {:<12.1} {:<4} {}", name, used, limit, unit, pct_text);
}

pub async fn handle_usage() -> Result<()> {
    let client = ApiClient::from_config(&Config::load()?)?;

    let spinner = create_spinner("Loading latest usage snapshot...");
    let report: UsageReport = client.get(&["api", "deployments", "usage"], &[]).await?;
    spinner.finish_and_clear();

    let UsageReport { snapshot, alerts } = report;
    print_header(&format!(
        "💳 Usage as of {}",
        snapshot.recorded_at.format("%Y-%m-%d %H:%M UTC")
    ));
    line(
        "Hosting bandwidth",
        snapshot.hosting_bandwidth_used,
        snapshot.hosting_bandwidth_limit,
        "GB",
        severity_of(&alerts, Metric::HostingBandwidth),
    );
    line(
        "Firestore reads",
        snapshot.firestore_reads_used,
        snapshot.firestore_reads_limit,
        "",
        severity_of(&alerts, Metric::FirestoreReads),
    );
    line(
        "Billing",
        snapshot.billing_current,
        snapshot.billing_budget,
        "USD",
        severity_of(&alerts, Metric::Billing),
    );

    if alerts.is_empty() {
        print_success("All metrics within thresholds");
        return Ok(());
    }

    println!("\n{}", "🚨 Alerts".cyan().bold());
    for alert in &alerts {
        let tag = match alert.severity {
            Severity::Critical => "CRITICAL".red().bold(),
            Severity::Warning => "WARNING".yellow().bold(),
        };
        println!("  {} {}", tag, alert.message);
    }
    Ok(())
}
