use std::sync::atomic::Ordering;

use super::*;
use crate::testkit::*;

#[tokio::test]
async fn cached_stats_are_served_verbatim() {
    let cached = sample_stats("1.0.0");
    let store = MemoryStore::new().with_stats(cached.clone());
    let registry = StubRegistry::serving(sample_stats("2.0.0"));

    let served = SyncHandler::new(&store, &registry, PACKAGE).stats().await.unwrap();

    assert_eq!(served.source, Provenance::Cache);
    assert_eq!(served.data, cached);
    assert_eq!(registry.calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.write_attempts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_cache_falls_back_and_writes_back() {
    let store = MemoryStore::new();
    let live = sample_stats("2.0.0");
    let registry = StubRegistry::serving(live.clone());

    let served = SyncHandler::new(&store, &registry, PACKAGE).stats().await.unwrap();

    assert_eq!(served.source, Provenance::Registry);
    assert_eq!(served.data, live);
    assert_eq!(store.stats.lock().unwrap().get(PACKAGE), Some(&live));
}

#[tokio::test]
async fn database_error_falls_back_to_registry() {
    let store = MemoryStore::new().failing_reads();
    let live = sample_stats("2.0.0");
    let registry = StubRegistry::serving(live.clone());

    let served = SyncHandler::new(&store, &registry, PACKAGE).stats().await.unwrap();

    assert_eq!(served.data, live);
    assert_eq!(store.write_attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_write_back_does_not_change_result() {
    let store = MemoryStore::new().failing_reads().failing_writes();
    let live = sample_stats("2.0.0");
    let registry = StubRegistry::serving(live.clone());

    let served = SyncHandler::new(&store, &registry, PACKAGE).stats().await.unwrap();

    assert_eq!(served.source, Provenance::Registry);
    assert_eq!(served.data, live);
    assert_eq!(store.write_attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn both_sources_failing_names_each_reason() {
    let store = MemoryStore::new().failing_reads();
    let registry = StubRegistry::unreachable();

    let err = SyncHandler::new(&store, &registry, PACKAGE).stats().await.unwrap_err();

    assert_eq!(err.kind, DataKind::Stats);
    assert!(err.database.contains("unreadable"), "{}", err.database);
    assert!(err.npm.contains("503"), "{}", err.npm);
}

#[tokio::test]
async fn empty_cache_and_unreachable_registry() {
    let store = MemoryStore::new();
    let registry = StubRegistry::unreachable();

    let err = SyncHandler::new(&store, &registry, PACKAGE).versions().await.unwrap_err();

    assert_eq!(err.kind, DataKind::Versions);
    assert_eq!(err.database, "no cached data");
}

#[tokio::test]
async fn empty_registry_list_is_a_miss() {
    let store = MemoryStore::new();
    let registry = StubRegistry {
        stats: Some(sample_stats("1.0.0")),
        ..Default::default()
    };

    let err = SyncHandler::new(&store, &registry, PACKAGE).trends(30).await.unwrap_err();

    assert_eq!(err.npm, "registry returned no data");
}

#[tokio::test]
async fn versions_fall_back_and_populate_cache() {
    let store = MemoryStore::new();
    let registry = StubRegistry::serving(sample_stats("1.0.0"));
    let handler = SyncHandler::new(&store, &registry, PACKAGE);

    let first = handler.versions().await.unwrap();
    let second = handler.versions().await.unwrap();

    assert_eq!(first.source, Provenance::Registry);
    assert_eq!(second.source, Provenance::Cache);
    assert_eq!(first.data, second.data);
    assert_eq!(registry.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn full_sync_reports_counts_per_kind() {
    let store = MemoryStore::new();
    let registry = StubRegistry::serving(sample_stats("1.0.0"));
    let handler = SyncHandler::new(&store, &registry, PACKAGE);

    let first = handler.full_sync(30).await;
    assert!(first.is_complete());
    assert_eq!(first.stats.saved, 1);
    assert_eq!(first.versions.saved, 2);
    assert_eq!(first.trends.saved, 3);

    let second = handler.full_sync(30).await;
    assert_eq!(second.versions.saved, 0);
    assert_eq!(second.versions.updated, 2);
    assert_eq!(second.trends.saved, 0);
}

#[tokio::test]
async fn full_sync_records_failures_without_aborting() {
    let store = MemoryStore::new().failing_writes();
    let registry = StubRegistry::serving(sample_stats("1.0.0"));

    let report = SyncHandler::new(&store, &registry, PACKAGE).full_sync(30).await;

    assert!(!report.is_complete());
    assert!(report.is_total_failure());
    assert!(report.versions.error.as_deref().unwrap().starts_with("database:"));
    assert_eq!(store.write_attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn full_sync_with_unreachable_registry() {
    let store = MemoryStore::new();
    let registry = StubRegistry::unreachable();

    let report = SyncHandler::new(&store, &registry, PACKAGE).full_sync(30).await;

    assert!(report.is_total_failure());
    assert!(report.stats.error.as_deref().unwrap().starts_with("npm:"));
}
