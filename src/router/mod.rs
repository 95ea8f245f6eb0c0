//! Request routing.
//!
//! [`FetchRouter::handle`] classifies a request and runs exactly one
//! strategy for it:
//!
//! | Class | Strategy |
//! |---|---|
//! | tile | profile-dependent, see [`TileProfile`](crate::TileProfile) |
//! | bulk-data | stale-while-revalidate into the data partition |
//! | identity | network first; GETs fall back to the data partition |
//! | shell, other | cache first; failed navigations get the root document |
//!
//! Cache writes that do not gate the response (tile write-through,
//! revalidation, identity write-through) run as background tasks.
//! [`FetchRouter::settle`] waits for them.

mod strategy;

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use metrics::counter;
use tokio::task::JoinSet;
use tracing::warn;

use crate::Result;
use crate::cache::{CacheManager, MaintenanceSampler, TileCachePolicy};
use crate::classify::Classifier;
use crate::network::Fetcher;
use crate::telemetry;
use crate::types::{Request, Response, TrafficClass};

/// Where a routed response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Fresh from the network.
    Network,
    /// A cached entry, fresh or stale.
    Cache,
    /// A substitute: the placeholder tile or the cached root document.
    Fallback,
    /// Forwarded without touching the cache.
    Passthrough,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Network => "network",
            ResponseSource::Cache => "cache",
            ResponseSource::Fallback => "fallback",
            ResponseSource::Passthrough => "passthrough",
        }
    }
}

/// A routed response plus how it was produced.
#[derive(Debug, Clone)]
pub struct Served {
    pub response: Response,
    pub source: ResponseSource,
    pub class: TrafficClass,
}

/// Routes intercepted requests to their caching strategy.
#[derive(Clone)]
pub struct FetchRouter {
    inner: Arc<RouterInner>,
}

pub(crate) struct RouterInner {
    classifier: Arc<Classifier>,
    cache: CacheManager,
    fetcher: Arc<dyn Fetcher>,
    policy: TileCachePolicy,
    sampler: MaintenanceSampler,
    background: Mutex<JoinSet<()>>,
}

impl FetchRouter {
    /// Build a router whose maintenance sampler uses the policy's rate.
    pub fn new(
        classifier: Arc<Classifier>,
        cache: CacheManager,
        fetcher: Arc<dyn Fetcher>,
        policy: TileCachePolicy,
    ) -> Self {
        let sampler = MaintenanceSampler::new(policy.maintenance_rate);
        Self::with_sampler(classifier, cache, fetcher, policy, sampler)
    }

    /// Build a router with an explicit maintenance sampler.
    pub fn with_sampler(
        classifier: Arc<Classifier>,
        cache: CacheManager,
        fetcher: Arc<dyn Fetcher>,
        policy: TileCachePolicy,
        sampler: MaintenanceSampler,
    ) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                classifier,
                cache,
                fetcher,
                policy,
                sampler,
                background: Mutex::new(JoinSet::new()),
            }),
        }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.inner.classifier
    }

    pub fn cache(&self) -> &CacheManager {
        &self.inner.cache
    }

    pub fn policy(&self) -> &TileCachePolicy {
        &self.inner.policy
    }

    /// Produce exactly one response for `request`.
    ///
    /// Tile requests under the offline-durable profile never fail. Other
    /// classes return `Err` only when the network failed and no cached
    /// substitute applies.
    pub async fn handle(&self, request: &Request) -> Result<Served> {
        let class = self.inner.classifier.classify_request(request);
        let result = match class {
            TrafficClass::Tile => self.inner.tile(request).await,
            TrafficClass::BulkData => self.inner.bulk_data(request).await,
            TrafficClass::Identity => self.inner.identity(request).await,
            TrafficClass::Shell | TrafficClass::Other => self.inner.shell(request).await,
        };

        let source = match &result {
            Ok((_, source)) => source.as_str(),
            Err(_) => "error",
        };
        counter!(
            telemetry::REQUESTS_TOTAL,
            "class" => class.as_str(),
            "source" => source
        )
        .increment(1);

        let (response, source) = result?;
        Ok(Served {
            response,
            source,
            class,
        })
    }

    /// Wait for every background task spawned so far, including tasks
    /// spawned while waiting.
    pub async fn settle(&self) {
        self.inner.settle().await
    }
}

impl RouterInner {
    /// Run `task` off the response path.
    pub(crate) fn spawn_background<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self
            .background
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Reap finished tasks so the set does not grow without bound.
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }

    async fn settle(&self) {
        loop {
            let mut tasks = std::mem::take(
                &mut *self
                    .background
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner),
            );
            if tasks.is_empty() {
                return;
            }
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    warn!(error = %e, "background cache task failed");
                }
            }
        }
    }
}

impl std::fmt::Debug for FetchRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchRouter")
            .field("cache", &self.inner.cache)
            .field("fetcher", &self.inner.fetcher.name())
            .field("policy", &self.inner.policy)
            .finish()
    }
}
