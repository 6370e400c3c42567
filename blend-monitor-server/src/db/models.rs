use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageStats {
    pub name: String,
    pub version: String,
    pub downloads_daily: i64,
    pub downloads_weekly: i64,
    pub downloads_monthly: i64,
    pub downloads_total: i64,
    pub unpacked_size: Option<i64>,
    pub gzipped_size: Option<i64>,
    pub dependency_count: i32,
    pub last_published: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub published_at: DateTime<Utc>,
    pub publisher: Option<String>,
    /// Last-week downloads; `None` when the registry could not report them.
    pub downloads: Option<i64>,
    pub changelog: Option<String>,
    pub size: Option<i64>,
    pub is_breaking: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadTrend {
    pub date: NaiveDate,
    pub downloads: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleChange {
    pub user_id: String,
    pub old_role: String,
    pub new_role: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: i64,
    pub user_id: String,
    pub action: String,
    pub details: serde_json::Value,
    pub performed_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Pending,
    InProgress,
    Success,
    Failed,
    RolledBack,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::InProgress => "in_progress",
            DeploymentStatus::Success => "success",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::RolledBack => "rolled_back",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(DeploymentStatus::Pending),
            "in_progress" => Some(DeploymentStatus::InProgress),
            "success" => Some(DeploymentStatus::Success),
            "failed" => Some(DeploymentStatus::Failed),
            "rolled_back" => Some(DeploymentStatus::RolledBack),
            _ => None,
        }
    }

    /// Statuses that carry a `completed_at` timestamp.
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            DeploymentStatus::Success | DeploymentStatus::Failed | DeploymentStatus::RolledBack
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: Uuid,
    pub environment: String,
    pub version: String,
    pub status: DeploymentStatus,
    pub deployed_by: String,
    pub commit_sha: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub rollback_of: Option<Uuid>,
}

/// Fields supplied by the caller when recording a deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDeployment {
    pub environment: String,
    pub version: String,
    pub status: DeploymentStatus,
    pub deployed_by: String,
    pub commit_sha: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rollback {
    /// The deployment that was marked as rolled back.
    pub rolled_back: Deployment,
    /// The new deployment restoring the previous version.
    pub deployment: Deployment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub hosting_bandwidth_used: f64,
    pub hosting_bandwidth_limit: f64,
    pub firestore_reads_used: f64,
    pub firestore_reads_limit: f64,
    pub billing_current: f64,
    pub billing_budget: f64,
    #[serde(default = "Utc::now")]
    pub recorded_at: DateTime<Utc>,
}
