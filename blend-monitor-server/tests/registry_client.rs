use std::time::Duration;

use chrono::{Duration as ChronoDuration, SecondsFormat, Utc};
use serde_json::json;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use blend_monitor::db::PackageStore;
use blend_monitor::npm::{NpmRegistryClient, RegistryError, RegistrySource};
use blend_monitor::sync::SyncHandler;
use blend_monitor::testkit::MemoryStore;

const PACKAGE: &str = "blend-lite";

fn days_ago(days: i64) -> String {
    (Utc::now() - ChronoDuration::days(days)).to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn document(server: &MockServer) -> serde_json::Value {
    document_created(server, &days_ago(30))
}

fn document_created(server: &MockServer, created: &str) -> serde_json::Value {
    json!({
        "name": PACKAGE,
        "dist-tags": { "latest": "2.0.0" },
        "versions": {
            "1.4.0": { "version": "1.4.0", "_npmUser": { "name": "ci-bot" } },
            "2.0.0": {
                "version": "2.0.0",
                "dependencies": { "react": "^18" },
                "dist": {
                    "tarball": format!("{}/{}/-/{}-2.0.0.tgz", server.uri(), PACKAGE, PACKAGE),
                    "unpackedSize": 4096
                },
                "_npmUser": { "name": "release-bot" }
            }
        },
        "time": {
            "created": created,
            "1.4.0": "2024-03-01T00:00:00.000Z",
            "2.0.0": "2024-06-01T00:00:00.000Z"
        }
    })
}

async fn mount_point(server: &MockServer, period: &str, downloads: i64) {
    Mock::given(method("GET"))
        .and(path(format!("/downloads/point/{}/{}", period, PACKAGE)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "downloads": downloads })))
        .mount(server)
        .await;
}

async fn mount_range(server: &MockServer) {
    range_mock().mount(server).await;
}

fn range_mock() -> Mock {
    Mock::given(method("GET"))
        .and(path_regex(format!(r"^/downloads/range/\d{{4}}-\d{{2}}-\d{{2}}:\d{{4}}-\d{{2}}-\d{{2}}/{}$", PACKAGE)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "downloads": [
                { "day": "2024-06-02", "downloads": 40 },
                { "day": "2024-06-01", "downloads": 25 }
            ]
        })))
}

async fn mount_document(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!("/{}", PACKAGE)))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn client(server: &MockServer) -> NpmRegistryClient {
    NpmRegistryClient::new(&server.uri(), &server.uri()).unwrap()
}

#[tokio::test]
async fn test_fetch_stats_combines_document_and_downloads() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/{}", PACKAGE)))
        .respond_with(ResponseTemplate::new(200).set_body_json(document(&server)))
        .mount(&server)
        .await;
    mount_point(&server, "last-day", 10).await;
    mount_point(&server, "last-week", 70).await;
    mount_point(&server, "last-month", 300).await;
    mount_range(&server).await;

    let stats = client(&server).fetch_stats(PACKAGE).await.unwrap();

    assert_eq!(stats.name, PACKAGE);
    assert_eq!(stats.version, "2.0.0");
    assert_eq!(stats.downloads_daily, 10);
    assert_eq!(stats.downloads_weekly, 70);
    assert_eq!(stats.downloads_monthly, 300);
    assert_eq!(stats.downloads_total, 65);
    assert_eq!(stats.unpacked_size, Some(4096));
    assert_eq!(stats.dependency_count, 1);
    // The tarball HEAD is not mocked, so the size stays unknown.
    assert_eq!(stats.gzipped_size, None);
}

#[tokio::test]
async fn test_total_downloads_span_packages_older_than_one_range() {
    let server = MockServer::start().await;
    mount_document(&server, document_created(&server, &days_ago(600))).await;
    mount_point(&server, "last-day", 10).await;
    mount_point(&server, "last-week", 70).await;
    mount_point(&server, "last-month", 300).await;
    // 601 days need two ranges; each answers 65.
    range_mock().expect(2).mount(&server).await;

    let stats = client(&server).fetch_stats(PACKAGE).await.unwrap();

    assert_eq!(stats.downloads_total, 130);
}

#[tokio::test]
async fn test_failed_version_downloads_keep_stored_counts() {
    let server = MockServer::start().await;
    mount_document(&server, document(&server)).await;
    Mock::given(method("GET"))
        .and(path(format!("/versions/{}/last-week", PACKAGE)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "package": PACKAGE,
            "downloads": { "2.0.0": 700, "1.4.0": 30 }
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/versions/{}/last-week", PACKAGE)))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let registry = client(&server);
    let store = MemoryStore::new();
    let handler = SyncHandler::new(&store, &registry, PACKAGE);

    let first = handler.full_sync(7).await;
    assert_eq!(first.versions.saved, 2);
    let second = handler.full_sync(7).await;
    assert!(second.versions.error.is_none());
    assert_eq!(second.versions.updated, 2);

    let stored = store.versions(PACKAGE).await.unwrap();
    let latest = stored.iter().find(|v| v.version == "2.0.0").unwrap();
    assert_eq!(latest.downloads, Some(700));
    let older = stored.iter().find(|v| v.version == "1.4.0").unwrap();
    assert_eq!(older.downloads, Some(30));
}

#[tokio::test]
async fn test_fetch_versions_without_per_version_downloads() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/{}", PACKAGE)))
        .respond_with(ResponseTemplate::new(200).set_body_json(document(&server)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/versions/{}/last-week", PACKAGE)))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let versions = client(&server).fetch_versions(PACKAGE).await.unwrap();

    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0].version, "2.0.0");
    assert!(versions[0].is_breaking);
    assert_eq!(versions[0].publisher.as_deref(), Some("release-bot"));
    assert!(versions.iter().all(|v| v.downloads.is_none()));
}

#[tokio::test]
async fn test_fetch_trends_sorted_by_day() {
    let server = MockServer::start().await;
    mount_range(&server).await;

    let trends = client(&server).fetch_trends(PACKAGE, 7).await.unwrap();

    assert_eq!(trends.len(), 2);
    assert!(trends[0].date < trends[1].date);
    assert_eq!(trends[1].downloads, 40);
}

#[tokio::test]
async fn test_missing_package_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/{}", PACKAGE)))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = client(&server).fetch_versions(PACKAGE).await.unwrap_err();
    assert!(matches!(err, RegistryError::NotFound(name) if name == PACKAGE));
}

#[tokio::test]
async fn test_server_errors_keep_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/{}", PACKAGE)))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client(&server).fetch_stats(PACKAGE).await.unwrap_err();
    assert!(matches!(err, RegistryError::Status { status: 503, .. }));
}

#[tokio::test]
async fn test_malformed_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/{}", PACKAGE)))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = client(&server).fetch_versions(PACKAGE).await.unwrap_err();
    assert!(matches!(err, RegistryError::Decode { .. }));
}

#[tokio::test]
async fn test_ping() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/-/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    assert!(client(&server).ping(Duration::from_secs(5)).await.is_ok());
}

#[tokio::test]
async fn test_ping_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/-/ping"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let err = client(&server).ping(Duration::from_millis(100)).await.unwrap_err();
    assert!(matches!(err, RegistryError::Http { .. }));
}
