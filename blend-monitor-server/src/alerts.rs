//! Threshold classification for hosting and billing usage.

use serde::{Deserialize, Serialize};

use crate::db::models::UsageSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertThresholds {
    /// Bandwidth and read usage above this percentage raise a warning.
    pub usage_warning_pct: f64,
    pub billing_warning_pct: f64,
    pub billing_critical_pct: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            usage_warning_pct: 80.0,
            billing_warning_pct: 75.0,
            billing_critical_pct: 90.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    HostingBandwidth,
    FirestoreReads,
    Billing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageAlert {
    pub metric: Metric,
    pub severity: Severity,
    pub percentage: f64,
    pub message: String,
}

/// Share of `limit` consumed by `used`, or `None` when there is no usable limit.
fn percent(used: f64, limit: f64) -> Option<f64> {
    if limit > 0.0 && used.is_finite() {
        Some(used / limit * 100.0)
    } else {
        None
    }
}

pub fn evaluate(snapshot: &UsageSnapshot, thresholds: &AlertThresholds) -> Vec<UsageAlert> {
    let mut alerts = Vec::new();

    let usage = [
        (Metric::HostingBandwidth, "Hosting bandwidth", snapshot.hosting_bandwidth_used, snapshot.hosting_bandwidth_limit),
        (Metric::FirestoreReads, "Firestore reads", snapshot.firestore_reads_used, snapshot.firestore_reads_limit),
    ];
    for (metric, label, used, limit) in usage {
        if let Some(pct) = percent(used, limit) {
            if pct > thresholds.usage_warning_pct {
                alerts.push(UsageAlert {
                    metric,
                    severity: Severity::Warning,
                    percentage: pct,
                    message: format!("{} usage at {:.1}% of limit", label, pct),
                });
            }
        }
    }

    if let Some(pct) = percent(snapshot.billing_current, snapshot.billing_budget) {
        let severity = if pct > thresholds.billing_critical_pct {
            Some(Severity::Critical)
        } else if pct > thresholds.billing_warning_pct {
            Some(Severity::Warning)
        } else {
            None
        };
        if let Some(severity) = severity {
            alerts.push(UsageAlert {
                metric: Metric::Billing,
                severity,
                percentage: pct,
                message: format!("Billing at {:.1}% of monthly budget", pct),
            });
        }
    }

    alerts
}
