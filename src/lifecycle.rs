//! Install and activate.
//!
//! A release moves through `installing -> installed -> activating -> active`.
//! Install pre-caches the shell manifest; activate deletes partitions left
//! over from earlier releases and takes over open clients.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::Result;
use crate::cache::{CacheManager, SweepReport};
use crate::classify::Classifier;
use crate::network::Fetcher;
use crate::types::{PartitionKind, Request};

/// Where a release is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LifecycleState {
    /// Not installed yet.
    #[default]
    Idle,
    Installing,
    Installed,
    Activating,
    Active,
}

/// Callbacks into the hosting environment.
///
/// All methods default to no-ops so hosts implement only what they have.
#[async_trait]
pub trait HostHooks: Send + Sync {
    /// Ask to replace the running instance without waiting for its clients.
    async fn skip_waiting(&self) {}

    /// Take control of every open client immediately.
    async fn claim_clients(&self) {}

    /// Whether an earlier release currently controls clients. When true,
    /// a completed install means an update is waiting.
    fn has_controller(&self) -> bool {
        false
    }
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl HostHooks for NoopHooks {}

/// Outcome of [`LifecycleManager::install`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    /// Manifest URLs now in the shell partition.
    pub cached: Vec<String>,
    /// Manifest URLs that could not be cached, with the reason.
    pub failed: Vec<(String, String)>,
    /// An earlier release was in control when install finished.
    pub update_available: bool,
}

/// Drives install and activation for one release.
pub struct LifecycleManager {
    cache: CacheManager,
    fetcher: Arc<dyn Fetcher>,
    classifier: Arc<Classifier>,
    hooks: Arc<dyn HostHooks>,
    state: watch::Sender<LifecycleState>,
}

impl LifecycleManager {
    pub fn new(
        cache: CacheManager,
        fetcher: Arc<dyn Fetcher>,
        classifier: Arc<Classifier>,
        hooks: Arc<dyn HostHooks>,
    ) -> Self {
        let (state, _) = watch::channel(LifecycleState::Idle);
        Self {
            cache,
            fetcher,
            classifier,
            hooks,
            state,
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Pre-cache the shell manifest, then signal readiness.
    ///
    /// Each manifest entry is fetched and stored independently; a failure
    /// on one is logged and recorded in the report. Only a failure to open
    /// the shell partition fails the install.
    pub async fn install(&self) -> Result<InstallReport> {
        self.state.send_replace(LifecycleState::Installing);
        let shell = self.cache.open(PartitionKind::Shell).await?;

        let fetches = self.classifier.shell_urls().into_iter().map(|url| {
            let request = Request::new("GET", url);
            async move {
                let outcome = self.fetcher.fetch(&request).await;
                (request, outcome)
            }
        });

        let mut report = InstallReport::default();
        for (request, outcome) in join_all(fetches).await {
            let url = request.url.to_string();
            let response = match outcome {
                Ok(response) if response.is_ok() => response,
                Ok(response) => {
                    warn!(url = %url, status = response.status, "failed to cache shell asset");
                    report.failed.push((url, format!("HTTP {}", response.status)));
                    continue;
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "failed to cache shell asset");
                    report.failed.push((url, e.to_string()));
                    continue;
                }
            };
            match shell.put(&request.key(), &response).await {
                Ok(()) => report.cached.push(url),
                Err(e) => {
                    warn!(url = %url, error = %e, "failed to store shell asset");
                    report.failed.push((url, e.to_string()));
                }
            }
        }

        report.update_available = self.hooks.has_controller();
        self.state.send_replace(LifecycleState::Installed);
        info!(
            cached = report.cached.len(),
            failed = report.failed.len(),
            update_available = report.update_available,
            "installed"
        );
        self.hooks.skip_waiting().await;
        Ok(report)
    }

    /// Delete stale partitions, then claim clients.
    ///
    /// Never fails: if partitions cannot even be listed, activation goes
    /// ahead and the next activation retries the sweep.
    pub async fn activate(&self) -> SweepReport {
        self.state.send_replace(LifecycleState::Activating);
        let report = match self.cache.sweep_stale().await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "could not list partitions for sweep");
                SweepReport::default()
            }
        };
        self.hooks.claim_clients().await;
        self.state.send_replace(LifecycleState::Active);
        info!(deleted = report.deleted.len(), "activated");
        report
    }
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("state", &self.state())
            .finish()
    }
}
