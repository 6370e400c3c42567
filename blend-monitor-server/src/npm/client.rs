use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use reqwest::{header, Client, StatusCode};
use serde::de::DeserializeOwned;

use super::types::*;
use super::{RegistryError, RegistrySource};
use crate::db::models::{DownloadTrend, PackageStats, VersionInfo};

/// The downloads API refuses ranges longer than 18 months.
const MAX_RANGE_DAYS: i64 = 540;

/// First day the downloads API has data for.
fn stats_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2015, 1, 10).unwrap_or(NaiveDate::MIN)
}

/// Splits `start..=end` into consecutive inclusive windows the downloads API
/// accepts.
pub fn range_windows(start: NaiveDate, end: NaiveDate) -> Vec<(NaiveDate, NaiveDate)> {
    let mut windows = Vec::new();
    let mut from = start;
    while from <= end {
        let to = (from + ChronoDuration::days(MAX_RANGE_DAYS - 1)).min(end);
        windows.push((from, to));
        from = to + ChronoDuration::days(1);
    }
    windows
}

/// HTTP client for the public NPM registry and downloads API.
#[derive(Debug, Clone)]
pub struct NpmRegistryClient {
    client: Client,
    registry_url: String,
    downloads_url: String,
}

impl NpmRegistryClient {
    pub fn new(registry_url: &str, downloads_url: &str) -> Result<Self, RegistryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(concat!("blend-monitor/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RegistryError::Http {
                url: registry_url.to_string(),
                source: e,
            })?;

        Ok(Self {
            client,
            registry_url: registry_url.trim_end_matches('/').to_string(),
            downloads_url: downloads_url.trim_end_matches('/').to_string(),
        })
    }

    /// Scoped names keep their `@` but escape the slash for registry paths.
    pub fn encode_package_name(name: &str) -> String {
        if name.starts_with('@') {
            name.replacen('/', "%2f", 1)
        } else {
            name.to_string()
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, package: &str) -> Result<T, RegistryError> {
        let response = self.client.get(url).send().await.map_err(|e| RegistryError::Http {
            url: url.to_string(),
            source: e,
        })?;

        match response.status() {
            StatusCode::OK => response.json::<T>().await.map_err(|e| RegistryError::Decode {
                url: url.to_string(),
                reason: e.to_string(),
            }),
            StatusCode::NOT_FOUND => Err(RegistryError::NotFound(package.to_string())),
            status => Err(RegistryError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }),
        }
    }

    pub async fn package_document(&self, package: &str) -> Result<PackageDocument, RegistryError> {
        let url = format!("{}/{}", self.registry_url, Self::encode_package_name(package));
        self.get_json(&url, package).await
    }

    pub async fn download_point(&self, period: &str, package: &str) -> Result<i64, RegistryError> {
        let url = format!("{}/downloads/point/{}/{}", self.downloads_url, period, package);
        let point: DownloadPoint = self.get_json(&url, package).await?;
        Ok(point.downloads)
    }

    pub async fn download_range(&self, start: NaiveDate, end: NaiveDate, package: &str) -> Result<Vec<DownloadTrend>, RegistryError> {
        let url = format!(
            "{}/downloads/range/{}:{}/{}",
            self.downloads_url,
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d"),
            package
        );
        let range: DownloadRange = self.get_json(&url, package).await?;
        Ok(build_trends(range))
    }

    pub async fn version_downloads(&self, package: &str) -> Result<HashMap<String, i64>, RegistryError> {
        let url = format!(
            "{}/versions/{}/last-week",
            self.downloads_url,
            Self::encode_package_name(package)
        );
        let body: VersionDownloads = self.get_json(&url, package).await?;
        Ok(body.downloads)
    }

    /// Size of the published tarball, which is the gzipped package size.
    pub async fn tarball_size(&self, tarball_url: &str) -> Result<Option<i64>, RegistryError> {
        let response = self.client.head(tarball_url).send().await.map_err(|e| RegistryError::Http {
            url: tarball_url.to_string(),
            source: e,
        })?;

        if !response.status().is_success() {
            return Err(RegistryError::Status {
                url: tarball_url.to_string(),
                status: response.status().as_u16(),
            });
        }

        Ok(response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok()))
    }

    /// All-time downloads, summed over as many ranges as the package's age needs.
    pub async fn total_downloads(&self, start: NaiveDate, end: NaiveDate, package: &str) -> Result<i64, RegistryError> {
        let mut total = 0;
        for (from, to) in range_windows(start.max(stats_epoch()), end) {
            let window = self.download_range(from, to, package).await?;
            total += window.iter().map(|t| t.downloads).sum::<i64>();
        }
        Ok(total)
    }

    async fn download_counts(&self, doc: &PackageDocument, package: &str) -> Result<DownloadCounts, RegistryError> {
        let today = Utc::now().date_naive();
        let start = doc
            .created_at()
            .map(|dt| dt.date_naive())
            .unwrap_or(today - ChronoDuration::days(MAX_RANGE_DAYS - 1));

        let (daily, weekly, monthly, total) = tokio::try_join!(
            self.download_point("last-day", package),
            self.download_point("last-week", package),
            self.download_point("last-month", package),
            self.total_downloads(start, today, package),
        )?;

        Ok(DownloadCounts {
            daily,
            weekly,
            monthly,
            total,
        })
    }
}

#[async_trait]
impl RegistrySource for NpmRegistryClient {
    async fn fetch_stats(&self, package: &str) -> Result<PackageStats, RegistryError> {
        let doc = self.package_document(package).await?;
        let counts = self.download_counts(&doc, package).await?;

        let tarball = doc
            .latest_manifest()
            .and_then(|m| m.dist.as_ref())
            .and_then(|d| d.tarball.clone());
        let gzipped_size = match tarball {
            Some(url) => match self.tarball_size(&url).await {
                Ok(size) => size,
                Err(e) => {
                    tracing::debug!("Could not size tarball for {}: {}", package, e);
                    None
                }
            },
            None => None,
        };

        build_stats(&doc, counts, gzipped_size).ok_or_else(|| RegistryError::Empty(package.to_string()))
    }

    async fn fetch_versions(&self, package: &str) -> Result<Vec<VersionInfo>, RegistryError> {
        let doc = self.package_document(package).await?;
        let per_version = match self.version_downloads(package).await {
            Ok(map) => Some(map),
            Err(e) => {
                tracing::warn!("Per-version downloads unavailable for {}: {}", package, e);
                None
            }
        };
        Ok(build_versions(&doc, per_version.as_ref()))
    }

    async fn fetch_trends(&self, package: &str, days: i64) -> Result<Vec<DownloadTrend>, RegistryError> {
        let end = Utc::now().date_naive();
        let start = end - ChronoDuration::days(days.clamp(1, MAX_RANGE_DAYS) - 1);
        self.download_range(start, end, package).await
    }

    async fn ping(&self, timeout: Duration) -> Result<(), RegistryError> {
        let url = format!("{}/-/ping", self.registry_url);
        let response = self
            .client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| RegistryError::Http {
                url: url.clone(),
                source: e,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(RegistryError::Status {
                url,
                status: response.status().as_u16(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_scoped_names() {
        assert_eq!(NpmRegistryClient::encode_package_name("lodash"), "lodash");
        assert_eq!(
            NpmRegistryClient::encode_package_name("@juspay/blend-design-system"),
            "@juspay%2fblend-design-system"
        );
    }

    #[test]
    fn windows_cover_the_range_without_overlap() {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let end = start + ChronoDuration::days(MAX_RANGE_DAYS * 2 + 9);
        let windows = range_windows(start, end);

        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0], (start, start + ChronoDuration::days(MAX_RANGE_DAYS - 1)));
        assert_eq!(windows[1].0, windows[0].1 + ChronoDuration::days(1));
        assert_eq!(windows[2].1, end);
        let days: i64 = windows.iter().map(|(a, b)| (*b - *a).num_days() + 1).sum();
        assert_eq!(days, (end - start).num_days() + 1);
    }

    #[test]
    fn single_day_and_empty_ranges() {
        let day = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert_eq!(range_windows(day, day), vec![(day, day)]);
        assert!(range_windows(day, day - ChronoDuration::days(1)).is_empty());
    }

    #[test]
    fn trims_trailing_slashes() {
        let client = NpmRegistryClient::new("https://registry.npmjs.org/", "https://api.npmjs.org/").unwrap();
        assert_eq!(client.registry_url, "https://registry.npmjs.org");
        assert_eq!(client.downloads_url, "https://api.npmjs.org");
    }
}
