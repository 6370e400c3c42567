//! Registry and downloads-API response shapes, and their conversion into
//! the monitor's own records.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use semver::Version;
use serde::Deserialize;

use crate::db::models::{DownloadTrend, PackageStats, VersionInfo};

#[derive(Debug, Clone, Deserialize)]
pub struct PackageDocument {
    pub name: String,
    #[serde(rename = "dist-tags", default)]
    pub dist_tags: HashMap<String, String>,
    #[serde(default)]
    pub versions: HashMap<String, VersionManifest>,
    #[serde(default)]
    pub time: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VersionManifest {
    pub version: String,
    #[serde(default)]
    pub dependencies: HashMap<String, String>,
    #[serde(default)]
    pub dist: Option<Dist>,
    #[serde(rename = "_npmUser", default)]
    pub npm_user: Option<NpmUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Dist {
    pub tarball: Option<String>,
    #[serde(rename = "unpackedSize")]
    pub unpacked_size: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NpmUser {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadPoint {
    pub downloads: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadRange {
    #[serde(default)]
    pub downloads: Vec<DownloadDay>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadDay {
    pub day: NaiveDate,
    pub downloads: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VersionDownloads {
    #[serde(default)]
    pub downloads: HashMap<String, i64>,
}

/// Download counters gathered from the downloads API.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DownloadCounts {
    pub daily: i64,
    pub weekly: i64,
    pub monthly: i64,
    pub total: i64,
}

impl PackageDocument {
    pub fn latest_version(&self) -> Option<&str> {
        self.dist_tags.get("latest").map(String::as_str)
    }

    pub fn latest_manifest(&self) -> Option<&VersionManifest> {
        self.latest_version().and_then(|v| self.versions.get(v))
    }

    pub fn published_at(&self, version: &str) -> Option<DateTime<Utc>> {
        self.time
            .get(version)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.published_at("created")
    }
}

pub fn build_stats(doc: &PackageDocument, downloads: DownloadCounts, gzipped_size: Option<i64>) -> Option<PackageStats> {
    let version = doc.latest_version()?;
    let manifest = doc.latest_manifest();

    Some(PackageStats {
        name: doc.name.clone(),
        version: version.to_string(),
        downloads_daily: downloads.daily,
        downloads_weekly: downloads.weekly,
        downloads_monthly: downloads.monthly,
        downloads_total: downloads.total,
        unpacked_size: manifest.and_then(|m| m.dist.as_ref()).and_then(|d| d.unpacked_size),
        gzipped_size,
        dependency_count: manifest.map(|m| m.dependencies.len() as i32).unwrap_or(0),
        last_published: doc.published_at(version),
    })
}

/// Builds one record per published version, newest first. Versions without
/// a publish time are skipped. Without per-version counts every version's
/// downloads stay unknown; with them, a version the counts omit had none.
pub fn build_versions(doc: &PackageDocument, per_version_downloads: Option<&HashMap<String, i64>>) -> Vec<VersionInfo> {
    let mut versions: Vec<VersionInfo> = doc
        .versions
        .values()
        .filter_map(|manifest| {
            let published_at = doc.published_at(&manifest.version)?;
            Some(VersionInfo {
                version: manifest.version.clone(),
                published_at,
                publisher: manifest.npm_user.as_ref().map(|u| u.name.clone()),
                downloads: per_version_downloads
                    .map(|counts| counts.get(&manifest.version).copied().unwrap_or(0)),
                changelog: None,
                size: manifest.dist.as_ref().and_then(|d| d.unpacked_size),
                is_breaking: false,
            })
        })
        .collect();

    mark_breaking(&mut versions);
    versions.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    versions
}

/// Flags versions that bump the major component over the previous release
/// (or the minor component while still on 0.x).
fn mark_breaking(versions: &mut [VersionInfo]) {
    let mut parsed: Vec<(usize, Version)> = versions
        .iter()
        .enumerate()
        .filter_map(|(i, v)| Version::parse(&v.version).ok().map(|sv| (i, sv)))
        .collect();
    parsed.sort_by(|a, b| a.1.cmp(&b.1));

    for pair in parsed.windows(2) {
        let (prev, (idx, cur)) = (&pair[0].1, &pair[1]);
        let breaking = if prev.major == 0 && cur.major == 0 {
            cur.minor > prev.minor
        } else {
            cur.major > prev.major
        };
        versions[*idx].is_breaking = breaking;
    }
}

pub fn build_trends(range: DownloadRange) -> Vec<DownloadTrend> {
    let mut trends: Vec<DownloadTrend> = range
        .downloads
        .into_iter()
        .map(|d| DownloadTrend {
            date: d.day,
            downloads: d.downloads,
        })
        .collect();
    trends.sort_by_key(|t| t.date);
    trends
}
