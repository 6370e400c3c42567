//! Request and response bodies crossing the HTTP boundary. The CLI
//! deserializes the same types.

use serde::{Deserialize, Serialize};

use crate::alerts::UsageAlert;
use crate::db::models::{Deployment, UsageSnapshot, User};
use crate::sync::KindReport;

/// Response header naming the source that served an NPM read.
pub const DATA_SOURCE_HEADER: &str = "x-data-source";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,
}

/// Per-source failure reasons for a read neither source could serve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub database: String,
    pub npm: String,
    pub suggestion: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub database: ComponentHealth,
    pub registry: ComponentHealth,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TrendsQuery {
    /// Lookback window in days; free-form text is sanitized and clamped.
    pub days: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResults {
    pub stats: KindReport,
    pub versions: KindReport,
    pub trends: KindReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResponse {
    pub success: bool,
    pub results: SyncResults,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsersResponse {
    pub success: bool,
    pub users: Vec<User>,
    pub total: i64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RoleUpdateRequest {
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleUpdateResponse {
    pub success: bool,
    pub user_id: String,
    pub old_role: String,
    pub new_role: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HistoryQuery {
    pub environment: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DeploymentRequest {
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub commit_sha: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RollbackRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackResponse {
    pub success: bool,
    pub rolled_back: Deployment,
    pub deployment: Deployment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageReport {
    pub snapshot: UsageSnapshot,
    pub alerts: Vec<UsageAlert>,
}
