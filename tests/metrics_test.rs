//! Tests for metrics integration.
//!
//! Uses `metrics_util::debugging::DebuggingRecorder` to capture and assert
//! on emitted metrics without needing a real exporter. Only request-path
//! counters are asserted: background tasks may run on other threads,
//! outside the local recorder.

use std::sync::Arc;

use async_trait::async_trait;
use metrics_util::MetricKind;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};

use tilegate::{
    CacheManager, CacheStorage, Fetcher, MemoryStorage, PartitionKind, PartitionNames, Request,
    RequestInterceptor, RequestKey, Response, Result, Tilegate, TilegateError, telemetry,
};

// ============================================================================
// Mocks
// ============================================================================

struct OfflineFetcher;

#[async_trait]
impl Fetcher for OfflineFetcher {
    fn name(&self) -> &str {
        "offline"
    }

    async fn fetch(&self, _request: &Request) -> Result<Response> {
        Err(TilegateError::Http("offline".into()))
    }
}

// ============================================================================
// Snapshot type alias for readability
// ============================================================================

type SnapshotVec = Vec<(
    metrics_util::CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
)>;

// ============================================================================
// Helpers
// ============================================================================

/// Sum all counter values matching a name and, optionally, one label.
fn counter_total(snapshot: &SnapshotVec, name: &str, label: Option<(&str, &str)>) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| key.kind() == MetricKind::Counter && key.key().name() == name)
        .filter(|(key, _, _, _)| {
            label.is_none_or(|(k, v)| {
                key.key()
                    .labels()
                    .any(|l| l.key() == k && l.value() == v)
            })
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

fn offline_gate() -> Tilegate {
    Tilegate::builder()
        .origin("https://app.example/")
        .storage(Arc::new(MemoryStorage::new()))
        .fetcher(Arc::new(OfflineFetcher))
        .build()
        .unwrap()
}

// ============================================================================
// Tests
// ============================================================================

/// Runs async code within a local recorder scope on the multi-thread runtime.
///
/// `block_in_place` ensures the sync `with_local_recorder` closure stays
/// on the current thread while `block_on` drives the inner async work.
#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn placeholder_tile_records_fallback() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    let result = metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let gate = offline_gate();
                gate.fetch(&Request::get("https://a.tile.openstreetmap.org/1/1/1.png")?)
                    .await
            })
        })
    });
    assert!(result.is_ok());

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(counter_total(&snapshot, telemetry::FALLBACK_TILES_TOTAL, None), 1);
    assert_eq!(
        counter_total(&snapshot, telemetry::REQUESTS_TOTAL, Some(("source", "fallback"))),
        1
    );
    assert_eq!(
        counter_total(&snapshot, telemetry::CACHE_MISSES_TOTAL, Some(("partition", "tile"))),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn failed_request_records_error_source() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    let result = metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let gate = offline_gate();
                gate.fetch(&Request::with_method("POST", "https://x.supabase.co/auth")?)
                    .await
            })
        })
    });
    assert!(result.is_err());

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(
        counter_total(&snapshot, telemetry::REQUESTS_TOTAL, Some(("class", "identity"))),
        1
    );
    assert_eq!(
        counter_total(&snapshot, telemetry::REQUESTS_TOTAL, Some(("source", "error"))),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn cache_hit_is_counted_per_partition() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let gate = offline_gate();
                let request = Request::get("https://app.example/").unwrap();
                gate.cache()
                    .store(PartitionKind::Shell, &request.key(), &Response::ok("<html>"))
                    .await;
                gate.fetch(&request).await.unwrap();
            })
        })
    });

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(
        counter_total(&snapshot, telemetry::CACHE_HITS_TOTAL, Some(("partition", "shell"))),
        1
    );
    assert_eq!(
        counter_total(&snapshot, telemetry::REQUESTS_TOTAL, Some(("source", "cache"))),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn maintenance_and_sweep_are_counted() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let storage = Arc::new(MemoryStorage::new());
                storage.open("app-tiles-v0").await.unwrap();
                let cache = CacheManager::new(storage, PartitionNames::versioned("app", "v1"));
                for i in 0..10 {
                    let key = RequestKey::get(
                        &url::Url::parse(&format!("https://t.example/1/1/{i}.png")).unwrap(),
                    );
                    cache.store(PartitionKind::Tile, &key, &Response::ok("x")).await;
                }
                let policy = tilegate::TileCachePolicy::network_preferred().max_entries(5);
                cache.maintain_tiles(&policy, 0).await.unwrap();
                cache.sweep_stale().await.unwrap();
            })
        })
    });

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(
        counter_total(&snapshot, telemetry::TILE_EVICTIONS_TOTAL, Some(("reason", "capacity"))),
        2
    );
    assert_eq!(counter_total(&snapshot, telemetry::PARTITIONS_SWEPT_TOTAL, None), 1);
}

/// Memory storage that refuses to delete entries.
struct UndeletableStorage(MemoryStorage);

#[async_trait]
impl CacheStorage for UndeletableStorage {
    fn name(&self) -> &str {
        "undeletable"
    }

    async fn partition_names(&self) -> Result<Vec<String>> {
        self.0.partition_names().await
    }

    async fn open(&self, partition: &str) -> Result<()> {
        self.0.open(partition).await
    }

    async fn delete_partition(&self, partition: &str) -> Result<bool> {
        self.0.delete_partition(partition).await
    }

    async fn get(&self, partition: &str, key: &RequestKey) -> Result<Option<Response>> {
        self.0.get(partition, key).await
    }

    async fn put(&self, partition: &str, key: &RequestKey, response: &Response) -> Result<()> {
        self.0.put(partition, key, response).await
    }

    async fn delete(&self, _partition: &str, _key: &RequestKey) -> Result<bool> {
        Err(TilegateError::Storage("read-only".into()))
    }

    async fn keys(&self, partition: &str) -> Result<Vec<RequestKey>> {
        self.0.keys(partition).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn skipped_maintenance_entries_are_counted() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    let report = metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let storage = Arc::new(UndeletableStorage(MemoryStorage::new()));
                let cache = CacheManager::new(storage, PartitionNames::versioned("app", "v1"));
                for i in 0..10 {
                    let key = RequestKey::get(
                        &url::Url::parse(&format!("https://t.example/1/1/{i}.png")).unwrap(),
                    );
                    cache.store(PartitionKind::Tile, &key, &Response::ok("x")).await;
                }
                let policy = tilegate::TileCachePolicy::network_preferred().max_entries(5);
                cache.maintain_tiles(&policy, 0).await
            })
        })
    });

    let report = report.unwrap();
    assert_eq!(report.evicted, 0);
    assert_eq!(report.failed, 2);

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(
        counter_total(&snapshot, telemetry::STORAGE_ERRORS_TOTAL, Some(("op", "delete"))),
        2
    );
    assert_eq!(counter_total(&snapshot, telemetry::TILE_EVICTIONS_TOTAL, None), 0);
}
