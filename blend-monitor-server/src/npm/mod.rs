pub mod client;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::db::models::{DownloadTrend, PackageStats, VersionInfo};

pub use client::NpmRegistryClient;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("package {0} not found in registry")]
    NotFound(String),

    #[error("malformed response from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("registry returned no usable data for {0}")]
    Empty(String),
}

/// Live source of package data.
#[async_trait]
pub trait RegistrySource: Send + Sync {
    async fn fetch_stats(&self, package: &str) -> Result<PackageStats, RegistryError>;
    async fn fetch_versions(&self, package: &str) -> Result<Vec<VersionInfo>, RegistryError>;
    async fn fetch_trends(&self, package: &str, days: i64) -> Result<Vec<DownloadTrend>, RegistryError>;
    async fn ping(&self, timeout: Duration) -> Result<(), RegistryError>;
}
