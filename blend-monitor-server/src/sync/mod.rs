//! Cache-then-registry resolution for package data.
//!
//! Every read first asks the database. A miss (no row, no rows, or a failed
//! query) falls through to the registry, and a registry hit is written back
//! to the database on a best-effort basis. The database is only a cache:
//! its failures never fail a request on their own.

mod outcome;

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::models::{DownloadTrend, PackageStats, VersionInfo};
use crate::db::PackageStore;
use crate::npm::RegistrySource;

pub use outcome::{first_available, SourceOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Cache,
    Registry,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Cache => "cache",
            Provenance::Registry => "registry",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    Stats,
    Versions,
    Trends,
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataKind::Stats => "package stats",
            DataKind::Versions => "version history",
            DataKind::Trends => "download trends",
        })
    }
}

/// Data together with the source that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Served<T> {
    pub data: T,
    pub source: Provenance,
}

/// Neither the database nor the registry could serve a request.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind} unavailable (database: {database}; npm: {npm})")]
pub struct SourcesUnavailable {
    pub kind: DataKind,
    pub database: String,
    pub npm: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KindReport {
    pub saved: u64,
    pub updated: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub stats: KindReport,
    pub versions: KindReport,
    pub trends: KindReport,
    pub duration_ms: u64,
}

impl SyncReport {
    pub fn is_complete(&self) -> bool {
        [&self.stats, &self.versions, &self.trends].iter().all(|k| k.error.is_none())
    }

    pub fn is_total_failure(&self) -> bool {
        [&self.stats, &self.versions, &self.trends].iter().all(|k| k.error.is_some())
    }
}

pub struct SyncHandler<'a, S: ?Sized, R: ?Sized> {
    store: &'a S,
    registry: &'a R,
    package: &'a str,
}

impl<'a, S, R> SyncHandler<'a, S, R>
where
    S: PackageStore + ?Sized,
    R: RegistrySource + ?Sized,
{
    pub fn new(store: &'a S, registry: &'a R, package: &'a str) -> Self {
        Self { store, registry, package }
    }

    pub async fn stats(&self) -> Result<Served<PackageStats>, SourcesUnavailable> {
        let (store, registry, package) = (self.store, self.registry, self.package);
        let served = first_available(
            DataKind::Stats,
            move || async move { SourceOutcome::from_option(store.package_stats(package).await) },
            move || async move { SourceOutcome::from_value(registry.fetch_stats(package).await) },
        )
        .await?;

        if served.source == Provenance::Registry {
            if let Err(e) = self.store.save_package_stats(&served.data).await {
                tracing::warn!("Write-back of package stats for {} failed: {}", self.package, e);
            }
        }
        self.log_served(DataKind::Stats, served.source);
        Ok(served)
    }

    pub async fn versions(&self) -> Result<Served<Vec<VersionInfo>>, SourcesUnavailable> {
        let (store, registry, package) = (self.store, self.registry, self.package);
        let served = first_available(
            DataKind::Versions,
            move || async move { SourceOutcome::from_items(store.versions(package).await) },
            move || async move { SourceOutcome::from_items(registry.fetch_versions(package).await) },
        )
        .await?;

        if served.source == Provenance::Registry {
            if let Err(e) = self.store.save_versions(self.package, &served.data).await {
                tracing::warn!("Write-back of versions for {} failed: {}", self.package, e);
            }
        }
        self.log_served(DataKind::Versions, served.source);
        Ok(served)
    }

    pub async fn trends(&self, days: i64) -> Result<Served<Vec<DownloadTrend>>, SourcesUnavailable> {
        let (store, registry, package) = (self.store, self.registry, self.package);
        let served = first_available(
            DataKind::Trends,
            move || async move { SourceOutcome::from_items(store.download_trends(package, days).await) },
            move || async move { SourceOutcome::from_items(registry.fetch_trends(package, days).await) },
        )
        .await?;

        if served.source == Provenance::Registry {
            if let Err(e) = self.store.save_download_trends(self.package, &served.data).await {
                tracing::warn!("Write-back of download trends for {} failed: {}", self.package, e);
            }
        }
        self.log_served(DataKind::Trends, served.source);
        Ok(served)
    }

    /// Refreshes every kind from the registry and writes it through. Kinds
    /// are independent: one failing does not stop the others.
    pub async fn full_sync(&self, trend_days: i64) -> SyncReport {
        let started = Instant::now();
        tracing::info!("Starting full NPM sync for {}", self.package);

        let stats = match self.registry.fetch_stats(self.package).await {
            Ok(stats) => match self.store.save_package_stats(&stats).await {
                Ok(()) => KindReport { saved: 1, ..Default::default() },
                Err(e) => failed_kind("database", e),
            },
            Err(e) => failed_kind("npm", e),
        };

        let versions = match self.registry.fetch_versions(self.package).await {
            Ok(versions) => match self.store.save_versions(self.package, &versions).await {
                Ok(counts) => KindReport { saved: counts.saved, updated: counts.updated, error: None },
                Err(e) => failed_kind("database", e),
            },
            Err(e) => failed_kind("npm", e),
        };

        let trends = match self.registry.fetch_trends(self.package, trend_days).await {
            Ok(trends) => match self.store.save_download_trends(self.package, &trends).await {
                Ok(counts) => KindReport { saved: counts.saved, updated: 0, error: None },
                Err(e) => failed_kind("database", e),
            },
            Err(e) => failed_kind("npm", e),
        };

        let report = SyncReport {
            stats,
            versions,
            trends,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        if report.is_complete() {
            tracing::info!(
                "NPM sync for {} finished in {}ms: {} versions saved, {} updated, {} trend days saved",
                self.package, report.duration_ms, report.versions.saved, report.versions.updated, report.trends.saved
            );
        } else {
            tracing::warn!("NPM sync for {} finished with errors in {}ms", self.package, report.duration_ms);
        }
        report
    }

    fn log_served(&self, kind: DataKind, source: Provenance) {
        tracing::info!("Served {} for {} from {}", kind, self.package, source);
    }
}

fn failed_kind(source: &str, err: impl fmt::Display) -> KindReport {
    KindReport {
        error: Some(format!("{}: {}", source, err)),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests;
