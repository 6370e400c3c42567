//! In-memory stand-ins for the database and the registry, used by unit and
//! integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::db::models::*;
use crate::db::{DbError, DeploymentStore, PackageStore, UserStore, WriteCounts};
use crate::deployments::plan_rollback;
use crate::npm::{RegistryError, RegistrySource};

pub const PACKAGE: &str = "@juspay/blend-design-system";

pub fn sample_stats(version: &str) -> PackageStats {
    PackageStats {
        name: PACKAGE.to_string(),
        version: version.to_string(),
        downloads_daily: 120,
        downloads_weekly: 900,
        downloads_monthly: 3600,
        downloads_total: 48000,
        unpacked_size: Some(2_400_000),
        gzipped_size: Some(610_000),
        dependency_count: 12,
        last_published: Some(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()),
    }
}

pub fn sample_versions() -> Vec<VersionInfo> {
    vec![
        VersionInfo {
            version: "1.0.0".to_string(),
            published_at: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            publisher: Some("release-bot".to_string()),
            downloads: Some(700),
            changelog: None,
            size: Some(2_400_000),
            is_breaking: true,
        },
        VersionInfo {
            version: "0.9.0".to_string(),
            published_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            publisher: Some("release-bot".to_string()),
            downloads: Some(200),
            changelog: None,
            size: Some(2_100_000),
            is_breaking: false,
        },
    ]
}

pub fn sample_trends() -> Vec<DownloadTrend> {
    (1..=3)
        .map(|d| DownloadTrend {
            date: NaiveDate::from_ymd_opt(2024, 6, d).unwrap(),
            downloads: 100 * d as i64,
        })
        .collect()
}

pub fn sample_user(id: &str, role: &str) -> User {
    User {
        id: id.to_string(),
        email: format!("{}@example.com", id),
        display_name: Some(id.to_string()),
        role: role.to_string(),
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        last_login: None,
    }
}

#[derive(Default)]
pub struct MemoryStore {
    pub stats: Mutex<HashMap<String, PackageStats>>,
    pub versions: Mutex<HashMap<String, Vec<VersionInfo>>>,
    pub trends: Mutex<HashMap<String, Vec<DownloadTrend>>>,
    pub users: Mutex<Vec<User>>,
    pub audit: Mutex<Vec<AuditLogEntry>>,
    pub deployments: Mutex<Vec<Deployment>>,
    pub usage: Mutex<Vec<UsageSnapshot>>,
    /// Every package read fails with a permanent error.
    pub fail_reads: AtomicBool,
    /// Every package write fails with a permanent error.
    pub fail_writes: AtomicBool,
    /// Number of upcoming `list_users` calls that fail with a dropped connection.
    pub transient_user_failures: AtomicU32,
    pub write_attempts: AtomicU32,
    pub list_user_calls: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stats(self, stats: PackageStats) -> Self {
        self.stats.lock().unwrap().insert(stats.name.clone(), stats);
        self
    }

    pub fn with_users(self, users: Vec<User>) -> Self {
        *self.users.lock().unwrap() = users;
        self
    }

    pub fn with_deployments(self, deployments: Vec<Deployment>) -> Self {
        *self.deployments.lock().unwrap() = deployments;
        self
    }

    pub fn failing_reads(self) -> Self {
        self.fail_reads.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_writes(self) -> Self {
        self.fail_writes.store(true, Ordering::SeqCst);
        self
    }

    pub fn transient_failures(self, count: u32) -> Self {
        self.transient_user_failures.store(count, Ordering::SeqCst);
        self
    }

    fn check_read(&self) -> Result<(), DbError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(DbError::Pool("relation \"package_stats\" is unreadable".to_string()));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), DbError> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DbError::Pool("database is read-only".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PackageStore for MemoryStore {
    async fn ping(&self) -> Result<(), DbError> {
        self.check_read()
    }

    async fn package_stats(&self, package: &str) -> Result<Option<PackageStats>, DbError> {
        self.check_read()?;
        Ok(self.stats.lock().unwrap().get(package).cloned())
    }

    async fn save_package_stats(&self, stats: &PackageStats) -> Result<(), DbError> {
        self.check_write()?;
        self.stats.lock().unwrap().insert(stats.name.clone(), stats.clone());
        Ok(())
    }

    async fn versions(&self, package: &str) -> Result<Vec<VersionInfo>, DbError> {
        self.check_read()?;
        Ok(self.versions.lock().unwrap().get(package).cloned().unwrap_or_default())
    }

    async fn save_versions(&self, package: &str, versions: &[VersionInfo]) -> Result<WriteCounts, DbError> {
        self.check_write()?;
        let mut all = self.versions.lock().unwrap();
        let stored = all.entry(package.to_string()).or_default();
        let mut counts = WriteCounts::default();
        for v in versions {
            match stored.iter_mut().find(|s| s.version == v.version) {
                Some(existing) => {
                    if v.downloads.is_some() {
                        existing.downloads = v.downloads;
                    }
                    counts.updated += 1;
                }
                None => {
                    stored.push(v.clone());
                    counts.saved += 1;
                }
            }
        }
        Ok(counts)
    }

    async fn download_trends(&self, package: &str, _days: i64) -> Result<Vec<DownloadTrend>, DbError> {
        self.check_read()?;
        Ok(self.trends.lock().unwrap().get(package).cloned().unwrap_or_default())
    }

    async fn save_download_trends(&self, package: &str, trends: &[DownloadTrend]) -> Result<WriteCounts, DbError> {
        self.check_write()?;
        let mut all = self.trends.lock().unwrap();
        let stored = all.entry(package.to_string()).or_default();
        let mut counts = WriteCounts::default();
        for t in trends {
            if !stored.iter().any(|s| s.date == t.date) {
                stored.push(t.clone());
                counts.saved += 1;
            }
        }
        Ok(counts)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn list_users(&self, limit: i64, offset: i64) -> Result<(Vec<User>, i64), DbError> {
        self.list_user_calls.fetch_add(1, Ordering::SeqCst);
        let pending = self.transient_user_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.transient_user_failures.store(pending - 1, Ordering::SeqCst);
            return Err(DbError::Unavailable("Connection terminated unexpectedly".to_string()));
        }
        let users = self.users.lock().unwrap();
        let page = users
            .iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();
        Ok((page, users.len() as i64))
    }

    async fn update_user_role(&self, user_id: &str, role: &str, performed_by: &str) -> Result<Option<RoleChange>, DbError> {
        let mut users = self.users.lock().unwrap();
        let Some(user) = users.iter_mut().find(|u| u.id == user_id) else {
            return Ok(None);
        };
        let old_role = std::mem::replace(&mut user.role, role.to_string());

        let mut audit = self.audit.lock().unwrap();
        let id = audit.len() as i64 + 1;
        audit.push(AuditLogEntry {
            id,
            user_id: user_id.to_string(),
            action: "role_changed".to_string(),
            details: json!({ "old_role": old_role, "new_role": role }),
            performed_by: performed_by.to_string(),
            created_at: Utc::now(),
        });

        Ok(Some(RoleChange {
            user_id: user_id.to_string(),
            old_role,
            new_role: role.to_string(),
        }))
    }
}

#[async_trait]
impl DeploymentStore for MemoryStore {
    async fn deployment_history(&self, environment: Option<&str>, limit: i64) -> Result<Vec<Deployment>, DbError> {
        let mut history: Vec<Deployment> = self
            .deployments
            .lock()
            .unwrap()
            .iter()
            .filter(|d| environment.map_or(true, |env| d.environment == env))
            .cloned()
            .collect();
        history.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        history.truncate(limit.max(0) as usize);
        Ok(history)
    }

    async fn record_deployment(&self, deployment: &NewDeployment) -> Result<Deployment, DbError> {
        let now = Utc::now();
        let record = Deployment {
            id: Uuid::new_v4(),
            environment: deployment.environment.clone(),
            version: deployment.version.clone(),
            status: deployment.status,
            deployed_by: deployment.deployed_by.clone(),
            commit_sha: deployment.commit_sha.clone(),
            started_at: now,
            completed_at: deployment.status.is_finished().then_some(now),
            rollback_of: None,
        };
        self.deployments.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn rollback_deployment(&self, id: Uuid, performed_by: &str, _reason: Option<&str>) -> Result<Rollback, DbError> {
        let mut deployments = self.deployments.lock().unwrap();
        let target = deployments
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("deployment {}", id)))?;

        let plan = plan_rollback(&target, &deployments, performed_by)?;

        let now = Utc::now();
        let mut rolled_back = target.clone();
        rolled_back.status = DeploymentStatus::RolledBack;
        rolled_back.completed_at.get_or_insert(now);
        if let Some(stored) = deployments.iter_mut().find(|d| d.id == id) {
            *stored = rolled_back.clone();
        }

        let restored = Deployment {
            id: Uuid::new_v4(),
            environment: plan.environment,
            version: plan.version,
            status: plan.status,
            deployed_by: plan.deployed_by,
            commit_sha: plan.commit_sha,
            started_at: now,
            completed_at: Some(now),
            rollback_of: Some(target.id),
        };
        deployments.push(restored.clone());

        Ok(Rollback {
            rolled_back,
            deployment: restored,
        })
    }

    async fn latest_usage(&self) -> Result<Option<UsageSnapshot>, DbError> {
        Ok(self.usage.lock().unwrap().last().cloned())
    }

    async fn save_usage(&self, snapshot: &UsageSnapshot) -> Result<(), DbError> {
        self.usage.lock().unwrap().push(snapshot.clone());
        Ok(())
    }
}

/// Canned registry responses.
#[derive(Default)]
pub struct StubRegistry {
    pub stats: Option<PackageStats>,
    pub versions: Vec<VersionInfo>,
    pub trends: Vec<DownloadTrend>,
    pub unreachable: bool,
    pub calls: AtomicU32,
}

impl StubRegistry {
    pub fn serving(stats: PackageStats) -> Self {
        Self {
            stats: Some(stats),
            versions: sample_versions(),
            trends: sample_trends(),
            ..Default::default()
        }
    }

    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Default::default()
        }
    }

    fn check(&self) -> Result<(), RegistryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable {
            return Err(RegistryError::Status {
                url: "https://registry.npmjs.org".to_string(),
                status: 503,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RegistrySource for StubRegistry {
    async fn fetch_stats(&self, package: &str) -> Result<PackageStats, RegistryError> {
        self.check()?;
        self.stats.clone().ok_or_else(|| RegistryError::NotFound(package.to_string()))
    }

    async fn fetch_versions(&self, _package: &str) -> Result<Vec<VersionInfo>, RegistryError> {
        self.check()?;
        Ok(self.versions.clone())
    }

    async fn fetch_trends(&self, _package: &str, _days: i64) -> Result<Vec<DownloadTrend>, RegistryError> {
        self.check()?;
        Ok(self.trends.clone())
    }

    async fn ping(&self, _timeout: Duration) -> Result<(), RegistryError> {
        self.check()
    }
}
