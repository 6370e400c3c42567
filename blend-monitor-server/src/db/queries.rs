use async_trait::async_trait;
use chrono::{Duration, Utc};
use deadpool_postgres::Pool;
use serde_json::json;
use tokio_postgres::Row;
use uuid::Uuid;

use super::models::*;
use super::{DbError, DeploymentStore, PackageStore, UserStore, WriteCounts};
use crate::deployments::plan_rollback;

const DEPLOYMENT_COLUMNS: &str =
    "id, environment, version, status, deployed_by, commit_sha, started_at, completed_at, rollback_of";

/// Postgres-backed implementation of every store trait.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

#[async_trait]
impl PackageStore for PgStore {
    async fn ping(&self) -> Result<(), DbError> {
        let client = self.pool.get().await?;
        client.query_one("SELECT 1", &[]).await?;
        Ok(())
    }

    async fn package_stats(&self, package: &str) -> Result<Option<PackageStats>, DbError> {
        let client = self.pool.get().await?;

        let row = client.query_opt(
            "SELECT package_name, version, downloads_daily, downloads_weekly, downloads_monthly,
                    downloads_total, unpacked_size, gzipped_size, dependency_count, last_published
             FROM package_stats
             WHERE package_name = $1",
            &[&package],
        ).await?;

        Ok(row.as_ref().map(row_to_stats))
    }

    async fn save_package_stats(&self, stats: &PackageStats) -> Result<(), DbError> {
        let client = self.pool.get().await?;

        client.execute(
            "INSERT INTO package_stats (package_name, version, downloads_daily, downloads_weekly,
                    downloads_monthly, downloads_total, unpacked_size, gzipped_size,
                    dependency_count, last_published)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (package_name) DO UPDATE SET
                version = EXCLUDED.version,
                downloads_daily = EXCLUDED.downloads_daily,
                downloads_weekly = EXCLUDED.downloads_weekly,
                downloads_monthly = EXCLUDED.downloads_monthly,
                downloads_total = EXCLUDED.downloads_total,
                unpacked_size = EXCLUDED.unpacked_size,
                gzipped_size = EXCLUDED.gzipped_size,
                dependency_count = EXCLUDED.dependency_count,
                last_published = EXCLUDED.last_published,
                updated_at = NOW()",
            &[
                &stats.name,
                &stats.version,
                &stats.downloads_daily,
                &stats.downloads_weekly,
                &stats.downloads_monthly,
                &stats.downloads_total,
                &stats.unpacked_size,
                &stats.gzipped_size,
                &stats.dependency_count,
                &stats.last_published,
            ],
        ).await?;

        Ok(())
    }

    async fn versions(&self, package: &str) -> Result<Vec<VersionInfo>, DbError> {
        let client = self.pool.get().await?;

        let rows = client.query(
            "SELECT version, published_at, publisher, downloads, changelog, size, is_breaking
             FROM package_versions
             WHERE package_name = $1
             ORDER BY published_at DESC",
            &[&package],
        ).await?;

        Ok(rows.iter().map(row_to_version).collect())
    }

    async fn save_versions(&self, package: &str, versions: &[VersionInfo]) -> Result<WriteCounts, DbError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        let mut counts = WriteCounts::default();

        // Version metadata never changes once published; only the download count is refreshed.
        for v in versions {
            let row = tx.query_one(
                "INSERT INTO package_versions (package_name, version, published_at, publisher,
                        downloads, changelog, size, is_breaking)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                 ON CONFLICT (package_name, version) DO UPDATE SET
                    downloads = COALESCE(EXCLUDED.downloads, package_versions.downloads)
                 RETURNING (xmax = 0) AS inserted",
                &[
                    &package,
                    &v.version,
                    &v.published_at,
                    &v.publisher,
                    &v.downloads,
                    &v.changelog,
                    &v.size,
                    &v.is_breaking,
                ],
            ).await?;

            if row.get::<_, bool>(0) {
                counts.saved += 1;
            } else {
                counts.updated += 1;
            }
        }

        tx.commit().await?;
        Ok(counts)
    }

    async fn download_trends(&self, package: &str, days: i64) -> Result<Vec<DownloadTrend>, DbError> {
        let client = self.pool.get().await?;
        let since = Utc::now().date_naive() - Duration::days(days.max(1) - 1);

        let rows = client.query(
            "SELECT day, downloads
             FROM download_trends
             WHERE package_name = $1 AND day >= $2
             ORDER BY day ASC",
            &[&package, &since],
        ).await?;

        Ok(rows.iter().map(|row| DownloadTrend {
            date: row.get(0),
            downloads: row.get(1),
        }).collect())
    }

    async fn save_download_trends(&self, package: &str, trends: &[DownloadTrend]) -> Result<WriteCounts, DbError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        let mut counts = WriteCounts::default();

        for trend in trends {
            counts.saved += tx.execute(
                "INSERT INTO download_trends (package_name, day, downloads)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (package_name, day) DO NOTHING",
                &[&package, &trend.date, &trend.downloads],
            ).await?;
        }

        tx.commit().await?;
        Ok(counts)
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn list_users(&self, limit: i64, offset: i64) -> Result<(Vec<User>, i64), DbError> {
        let client = self.pool.get().await?;

        let rows = client.query(
            "SELECT id, email, display_name, role, created_at, last_login
             FROM users
             ORDER BY created_at DESC, id ASC
             LIMIT $1 OFFSET $2",
            &[&limit, &offset],
        ).await?;

        let total: i64 = client.query_one("SELECT COUNT(*) FROM users", &[]).await?.get(0);

        Ok((rows.iter().map(row_to_user).collect(), total))
    }

    async fn update_user_role(&self, user_id: &str, role: &str, performed_by: &str) -> Result<Option<RoleChange>, DbError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let old_role: String = match tx.query_opt(
            "SELECT role FROM users WHERE id = $1 FOR UPDATE",
            &[&user_id],
        ).await? {
            Some(row) => row.get(0),
            None => return Ok(None),
        };

        tx.execute("UPDATE users SET role = $2 WHERE id = $1", &[&user_id, &role]).await?;

        let details = json!({ "old_role": old_role, "new_role": role });
        tx.execute(
            "INSERT INTO audit_logs (user_id, action, details, performed_by)
             VALUES ($1, 'role_changed', $2, $3)",
            &[&user_id, &details, &performed_by],
        ).await?;

        tx.commit().await?;

        Ok(Some(RoleChange {
            user_id: user_id.to_string(),
            old_role,
            new_role: role.to_string(),
        }))
    }
}

#[async_trait]
impl DeploymentStore for PgStore {
    async fn deployment_history(&self, environment: Option<&str>, limit: i64) -> Result<Vec<Deployment>, DbError> {
        let client = self.pool.get().await?;

        let rows = client.query(
            &format!(
                "SELECT {} FROM deployments
                 WHERE ($1::text IS NULL OR environment = $1)
                 ORDER BY started_at DESC
                 LIMIT $2",
                DEPLOYMENT_COLUMNS
            ),
            &[&environment, &limit],
        ).await?;

        Ok(rows.iter().map(row_to_deployment).collect())
    }

    async fn record_deployment(&self, deployment: &NewDeployment) -> Result<Deployment, DbError> {
        let client = self.pool.get().await?;
        let row = insert_deployment(&**client, deployment, None).await?;
        Ok(row_to_deployment(&row))
    }

    async fn rollback_deployment(&self, id: Uuid, performed_by: &str, reason: Option<&str>) -> Result<Rollback, DbError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let target = match tx.query_opt(
            &format!("SELECT {} FROM deployments WHERE id = $1 FOR UPDATE", DEPLOYMENT_COLUMNS),
            &[&id],
        ).await? {
            Some(row) => row_to_deployment(&row),
            None => return Err(DbError::NotFound(format!("deployment {}", id))),
        };

        let previous: Vec<Deployment> = tx.query(
            &format!(
                "SELECT {} FROM deployments
                 WHERE environment = $1 AND status = 'success' AND started_at < $2 AND id <> $3
                 ORDER BY started_at DESC
                 LIMIT 1",
                DEPLOYMENT_COLUMNS
            ),
            &[&target.environment, &target.started_at, &target.id],
        ).await?.iter().map(row_to_deployment).collect();

        let plan = plan_rollback(&target, &previous, performed_by)?;

        let rolled_back = tx.query_one(
            &format!(
                "UPDATE deployments
                 SET status = 'rolled_back', completed_at = COALESCE(completed_at, NOW())
                 WHERE id = $1
                 RETURNING {}",
                DEPLOYMENT_COLUMNS
            ),
            &[&target.id],
        ).await?;

        let restored = insert_deployment(&*tx, &plan, Some(target.id)).await?;

        let details = json!({
            "deployment_id": target.id,
            "environment": target.environment,
            "from_version": target.version,
            "to_version": plan.version,
            "reason": reason,
        });
        tx.execute(
            "INSERT INTO audit_logs (user_id, action, details, performed_by)
             VALUES ($1, 'deployment_rolled_back', $2, $1)",
            &[&performed_by, &details],
        ).await?;

        tx.commit().await?;

        Ok(Rollback {
            rolled_back: row_to_deployment(&rolled_back),
            deployment: row_to_deployment(&restored),
        })
    }

    async fn latest_usage(&self) -> Result<Option<UsageSnapshot>, DbError> {
        let client = self.pool.get().await?;

        let row = client.query_opt(
            "SELECT hosting_bandwidth_used, hosting_bandwidth_limit, firestore_reads_used,
                    firestore_reads_limit, billing_current, billing_budget, recorded_at
             FROM usage_snapshots
             ORDER BY recorded_at DESC, id DESC
             LIMIT 1",
            &[],
        ).await?;

        Ok(row.map(|row| UsageSnapshot {
            hosting_bandwidth_used: row.get(0),
            hosting_bandwidth_limit: row.get(1),
            firestore_reads_used: row.get(2),
            firestore_reads_limit: row.get(3),
            billing_current: row.get(4),
            billing_budget: row.get(5),
            recorded_at: row.get(6),
        }))
    }

    async fn save_usage(&self, snapshot: &UsageSnapshot) -> Result<(), DbError> {
        let client = self.pool.get().await?;

        client.execute(
            "INSERT INTO usage_snapshots (hosting_bandwidth_used, hosting_bandwidth_limit,
                    firestore_reads_used, firestore_reads_limit, billing_current,
                    billing_budget, recorded_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
            &[
                &snapshot.hosting_bandwidth_used,
                &snapshot.hosting_bandwidth_limit,
                &snapshot.firestore_reads_used,
                &snapshot.firestore_reads_limit,
                &snapshot.billing_current,
                &snapshot.billing_budget,
                &snapshot.recorded_at,
            ],
        ).await?;

        Ok(())
    }
}

async fn insert_deployment<C: tokio_postgres::GenericClient>(
    client: &C,
    deployment: &NewDeployment,
    rollback_of: Option<Uuid>,
) -> Result<Row, DbError> {
    let finished = deployment.status.is_finished();

    let row = client.query_one(
        &format!(
            "INSERT INTO deployments (id, environment, version, status, deployed_by, commit_sha,
                    started_at, completed_at, rollback_of)
             VALUES ($1, $2, $3, $4, $5, $6, NOW(), CASE WHEN $7 THEN NOW() END, $8)
             RETURNING {}",
            DEPLOYMENT_COLUMNS
        ),
        &[
            &Uuid::new_v4(),
            &deployment.environment,
            &deployment.version,
            &deployment.status.as_str(),
            &deployment.deployed_by,
            &deployment.commit_sha,
            &finished,
            &rollback_of,
        ],
    ).await?;

    Ok(row)
}

fn row_to_stats(row: &Row) -> PackageStats {
    PackageStats {
        name: row.get(0),
        version: row.get(1),
        downloads_daily: row.get(2),
        downloads_weekly: row.get(3),
        downloads_monthly: row.get(4),
        downloads_total: row.get(5),
        unpacked_size: row.get(6),
        gzipped_size: row.get(7),
        dependency_count: row.get(8),
        last_published: row.get(9),
    }
}

fn row_to_version(row: &Row) -> VersionInfo {
    VersionInfo {
        version: row.get(0),
        published_at: row.get(1),
        publisher: row.get(2),
        downloads: row.get(3),
        changelog: row.get(4),
        size: row.get(5),
        is_breaking: row.get(6),
    }
}

fn row_to_user(row: &Row) -> User {
    User {
        id: row.get(0),
        email: row.get(1),
        display_name: row.get(2),
        role: row.get(3),
        created_at: row.get(4),
        last_login: row.get(5),
    }
}

fn row_to_deployment(row: &Row) -> Deployment {
    let status: String = row.get(3);
    Deployment {
        id: row.get(0),
        environment: row.get(1),
        version: row.get(2),
        // The table's CHECK constraint keeps this in the known set.
        status: DeploymentStatus::parse(&status).unwrap_or(DeploymentStatus::Failed),
        deployed_by: row.get(4),
        commit_sha: row.get(5),
        started_at: row.get(6),
        completed_at: row.get(7),
        rollback_of: row.get(8),
    }
}
