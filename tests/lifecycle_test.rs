//! Integration tests for install and activation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use tilegate::{
    CacheStorage, ClassifierConfig, Fetcher, HostHooks, LifecycleState, MemoryStorage,
    PartitionKind, Request, RequestInterceptor, RequestKey, Response, Result, Tilegate,
    TilegateError,
};

const ORIGIN: &str = "https://app.example/";

// ============================================================================
// Mocks
// ============================================================================

/// Serves fixed responses; anything else is a connection failure.
struct FixedFetcher {
    responses: HashMap<String, Response>,
    calls: AtomicU32,
}

impl FixedFetcher {
    fn new(responses: &[(&str, Response)]) -> Self {
        Self {
            responses: responses
                .iter()
                .map(|(url, response)| (url.to_string(), response.clone()))
                .collect(),
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Fetcher for FixedFetcher {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn fetch(&self, request: &Request) -> Result<Response> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .get(request.url.as_str())
            .cloned()
            .ok_or_else(|| TilegateError::Http("connection refused".into()))
    }
}

#[derive(Default)]
struct RecordingHooks {
    controlled: bool,
    skipped_waiting: AtomicBool,
    claimed: AtomicBool,
}

#[async_trait]
impl HostHooks for RecordingHooks {
    async fn skip_waiting(&self) {
        self.skipped_waiting.store(true, Ordering::SeqCst);
    }

    async fn claim_clients(&self) {
        self.claimed.store(true, Ordering::SeqCst);
    }

    fn has_controller(&self) -> bool {
        self.controlled
    }
}

fn key(url: &str) -> RequestKey {
    Request::get(url).unwrap().key()
}

fn shell_fetcher() -> FixedFetcher {
    FixedFetcher::new(&[
        ("https://app.example/", Response::ok("<html>")),
        ("https://app.example/manifest.json", Response::ok("{}")),
        ("https://app.example/favicon.svg", Response::new(404, "")),
    ])
}

// ============================================================================
// Install
// ============================================================================

#[tokio::test]
async fn install_caches_what_it_can() {
    let storage = Arc::new(MemoryStorage::new());
    let hooks = Arc::new(RecordingHooks::default());
    let gate = Tilegate::builder()
        .origin(ORIGIN)
        .release("app", "v2")
        .storage(storage.clone())
        .fetcher(Arc::new(shell_fetcher()))
        .hooks(hooks.clone())
        .build()
        .unwrap();

    let report = gate.install().await.unwrap();

    assert_eq!(report.cached.len(), 2);
    // favicon (404) and icon (unreachable) both fail independently
    assert_eq!(report.failed.len(), 2);
    assert!(!report.update_available);
    assert!(hooks.skipped_waiting.load(Ordering::SeqCst));
    assert_eq!(gate.state(), LifecycleState::Installed);

    let root = storage.get("app-shell-v2", &key(ORIGIN)).await.unwrap();
    assert_eq!(root.unwrap().body.as_ref(), b"<html>");
}

#[tokio::test]
async fn install_with_everything_offline_still_completes() {
    let gate = Tilegate::builder()
        .origin(ORIGIN)
        .storage(Arc::new(MemoryStorage::new()))
        .fetcher(Arc::new(FixedFetcher::new(&[])))
        .build()
        .unwrap();

    let report = gate.install().await.unwrap();
    assert!(report.cached.is_empty());
    assert_eq!(report.failed.len(), 4);
    assert!(gate.cache().open(PartitionKind::Shell).await.unwrap().is_empty().await.unwrap());
}

#[tokio::test]
async fn install_skips_absolute_manifest_entries() {
    let fetcher = Arc::new(FixedFetcher::new(&[(
        "https://app.example/",
        Response::ok("<html>"),
    )]));
    let gate = Tilegate::builder()
        .origin(ORIGIN)
        .storage(Arc::new(MemoryStorage::new()))
        .fetcher(fetcher.clone())
        .classifier(
            ClassifierConfig::new().shell_assets(["/", "https://cdn.example/leaflet.css"]),
        )
        .build()
        .unwrap();

    let report = gate.install().await.unwrap();
    assert_eq!(report.cached, vec!["https://app.example/"]);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn install_flags_update_when_controlled() {
    let hooks = Arc::new(RecordingHooks {
        controlled: true,
        ..Default::default()
    });
    let gate = Tilegate::builder()
        .origin(ORIGIN)
        .storage(Arc::new(MemoryStorage::new()))
        .fetcher(Arc::new(shell_fetcher()))
        .hooks(hooks)
        .build()
        .unwrap();

    assert!(gate.install().await.unwrap().update_available);
}

// ============================================================================
// Activate
// ============================================================================

#[tokio::test]
async fn activate_sweeps_previous_release_and_claims() {
    let storage = Arc::new(MemoryStorage::new());
    for name in ["app-shell-v1", "app-data-v1", "app-tiles-v1"] {
        storage.open(name).await.unwrap();
    }
    let hooks = Arc::new(RecordingHooks::default());
    let gate = Tilegate::builder()
        .origin(ORIGIN)
        .release("app", "v2")
        .storage(storage.clone())
        .fetcher(Arc::new(shell_fetcher()))
        .hooks(hooks.clone())
        .build()
        .unwrap();

    let mut states = gate.subscribe();
    gate.install().await.unwrap();
    let report = gate.activate().await;

    assert_eq!(report.deleted.len(), 3);
    assert!(hooks.claimed.load(Ordering::SeqCst));
    assert_eq!(*states.borrow_and_update(), LifecycleState::Active);
    assert_eq!(storage.partition_names().await.unwrap(), vec!["app-shell-v2"]);
}

#[tokio::test]
async fn served_shell_works_offline_after_install() {
    let gate = Tilegate::builder()
        .origin(ORIGIN)
        .storage(Arc::new(MemoryStorage::new()))
        .fetcher(Arc::new(shell_fetcher()))
        .build()
        .unwrap();
    gate.install().await.unwrap();
    gate.activate().await;

    let request = gate.request("GET", "/some/deep/link").unwrap().navigate();
    let served = gate.fetch(&request).await.unwrap();
    assert_eq!(served.response.body.as_ref(), b"<html>");
}
