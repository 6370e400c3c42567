pub mod models;
pub mod queries;

use std::io;

use async_trait::async_trait;
use deadpool_postgres::{Pool, PoolError, Runtime};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use thiserror::Error;
use tokio_postgres::NoTls;
use uuid::Uuid;

use models::*;

pub use queries::PgStore;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("database unavailable: {0}")]
    Unavailable(String),

    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("query failed: {0}")]
    Query(#[from] tokio_postgres::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),
}

impl From<PoolError> for DbError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Timeout(kind) => DbError::Unavailable(format!("timed out waiting for connection ({:?})", kind)),
            PoolError::Backend(e) => DbError::Query(e),
            other => DbError::Pool(other.to_string()),
        }
    }
}

impl DbError {
    /// Whether the failure is a dropped or unreachable connection that a
    /// fresh attempt may get past.
    pub fn is_transient(&self) -> bool {
        match self {
            DbError::Unavailable(_) => true,
            DbError::Query(e) => is_transient_pg(e),
            DbError::Pool(_) | DbError::NotFound(_) | DbError::Conflict(_) => false,
        }
    }
}

fn is_transient_pg(err: &tokio_postgres::Error) -> bool {
    if err.is_closed() {
        return true;
    }
    if let Some(state) = err.code() {
        // Class 08 is "connection exception"; 57P01..57P03 are server shutdown/startup.
        let code = state.code();
        return code.starts_with("08") || matches!(code, "57P01" | "57P02" | "57P03");
    }
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        if let Some(io_err) = inner.downcast_ref::<io::Error>() {
            return matches!(
                io_err.kind(),
                io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::UnexpectedEof
            );
        }
        source = inner.source();
    }
    false
}

/// Rows written by a bulk save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WriteCounts {
    pub saved: u64,
    pub updated: u64,
}

#[async_trait]
pub trait PackageStore: Send + Sync {
    async fn ping(&self) -> Result<(), DbError>;
    async fn package_stats(&self, package: &str) -> Result<Option<PackageStats>, DbError>;
    async fn save_package_stats(&self, stats: &PackageStats) -> Result<(), DbError>;
    async fn versions(&self, package: &str) -> Result<Vec<VersionInfo>, DbError>;
    async fn save_versions(&self, package: &str, versions: &[VersionInfo]) -> Result<WriteCounts, DbError>;
    async fn download_trends(&self, package: &str, days: i64) -> Result<Vec<DownloadTrend>, DbError>;
    async fn save_download_trends(&self, package: &str, trends: &[DownloadTrend]) -> Result<WriteCounts, DbError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Returns one page of users plus the total user count.
    async fn list_users(&self, limit: i64, offset: i64) -> Result<(Vec<User>, i64), DbError>;
    /// Changes a user's role and writes an audit entry. `None` when the user does not exist.
    async fn update_user_role(&self, user_id: &str, role: &str, performed_by: &str) -> Result<Option<RoleChange>, DbError>;
}

#[async_trait]
pub trait DeploymentStore: Send + Sync {
    async fn deployment_history(&self, environment: Option<&str>, limit: i64) -> Result<Vec<Deployment>, DbError>;
    async fn record_deployment(&self, deployment: &NewDeployment) -> Result<Deployment, DbError>;
    async fn rollback_deployment(&self, id: Uuid, performed_by: &str, reason: Option<&str>) -> Result<Rollback, DbError>;
    async fn latest_usage(&self) -> Result<Option<UsageSnapshot>, DbError>;
    async fn save_usage(&self, snapshot: &UsageSnapshot) -> Result<(), DbError>;
}

/// Everything the API needs from persistence.
pub trait Store: PackageStore + UserStore + DeploymentStore {}

impl<T: PackageStore + UserStore + DeploymentStore> Store for T {}

pub async fn create_pool(database_url: &str, tls: bool) -> Result<Pool, Box<dyn std::error::Error + Send + Sync>> {
    let mut cfg = deadpool_postgres::Config::new();
    cfg.url = Some(database_url.to_string());
    let pool = if tls {
        let tls_connector = TlsConnector::builder().build()?;
        cfg.create_pool(Some(Runtime::Tokio1), MakeTlsConnector::new(tls_connector))?
    } else {
        cfg.create_pool(Some(Runtime::Tokio1), NoTls)?
    };
    Ok(pool)
}

pub async fn run_migrations(pool: &Pool) -> Result<(), DbError> {
    let client = pool.get().await?;

    let migration_sql = include_str!("../../migrations/001_init.sql");

    client.batch_execute(migration_sql).await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_is_transient() {
        assert!(DbError::Unavailable("connection refused".into()).is_transient());
    }

    #[test]
    fn logical_errors_are_permanent() {
        assert!(!DbError::NotFound("user".into()).is_transient());
        assert!(!DbError::Conflict("already rolled back".into()).is_transient());
        assert!(!DbError::Pool("closed".into()).is_transient());
    }
}
