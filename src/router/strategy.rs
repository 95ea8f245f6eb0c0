//! Per-class caching strategies.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, error, warn};

use super::{ResponseSource, RouterInner};
use crate::cache::TileProfile;
use crate::cache::policy::now_millis;
use crate::telemetry;
use crate::types::{PartitionKind, Request, RequestKey, Response};
use crate::{Result, TilegateError};

type Routed = Result<(Response, ResponseSource)>;

impl RouterInner {
    pub(super) async fn tile(self: &Arc<Self>, request: &Request) -> Routed {
        if !request.is_get() {
            return self.passthrough(request).await;
        }
        match self.policy.profile {
            TileProfile::OfflineDurable => self.tile_offline_durable(request).await,
            TileProfile::NetworkPreferred => self.tile_network_preferred(request).await,
        }
    }

    /// Fresh cache, else network, else stale cache, else placeholder.
    async fn tile_offline_durable(self: &Arc<Self>, request: &Request) -> Routed {
        let key = request.key();
        let cached = self.cache.lookup(PartitionKind::Tile, &key).await;
        let now = now_millis();

        if let Some(entry) = &cached
            && self.policy.is_fresh(entry, now)
        {
            return Ok((entry.clone(), ResponseSource::Cache));
        }

        match self.fetcher.fetch(request).await {
            Ok(response) if response.status == 200 => {
                self.write_tile(key, &response, now);
                return Ok((response, ResponseSource::Network));
            }
            Ok(response) => {
                debug!(url = %request.url, status = response.status, "tile fetch returned non-200");
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "tile fetch failed");
            }
        }

        if let Some(stale) = cached {
            return Ok((stale, ResponseSource::Cache));
        }
        counter!(telemetry::FALLBACK_TILES_TOTAL).increment(1);
        Ok((Response::transparent_tile(), ResponseSource::Fallback))
    }

    /// Network within a deadline, else cache, else the network error.
    ///
    /// A non-200 answer counts as a failure and surfaces as
    /// [`TilegateError::Status`] when nothing is cached.
    async fn tile_network_preferred(self: &Arc<Self>, request: &Request) -> Routed {
        let key = request.key();
        let cached = self.cache.lookup(PartitionKind::Tile, &key).await;

        // The fetch runs on its own task: on timeout the handle is dropped
        // and the task finishes unobserved.
        let fetcher = Arc::clone(&self.fetcher);
        let upstream = request.clone();
        let handle = tokio::spawn(async move { fetcher.fetch(&upstream).await });
        let deadline = self.policy.network_timeout;
        let outcome = match tokio::time::timeout(deadline, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(TilegateError::Http(format!("fetch task failed: {e}"))),
            Err(_) => Err(TilegateError::Timeout(deadline)),
        };

        match outcome {
            Ok(response) if response.status == 200 => {
                self.write_tile(key, &response, now_millis());
                Ok((response, ResponseSource::Network))
            }
            Ok(response) => match cached {
                Some(entry) => Ok((entry, ResponseSource::Cache)),
                None => Err(TilegateError::Status {
                    status: response.status,
                    url: request.url.to_string(),
                }),
            },
            Err(e) if e.is_network() => match cached {
                Some(entry) => {
                    debug!(url = %request.url, error = %e, "serving cached tile");
                    Ok((entry, ResponseSource::Cache))
                }
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    /// Store a tile in the background, then maybe run maintenance.
    fn write_tile(self: &Arc<Self>, key: RequestKey, response: &Response, now_ms: u64) {
        let entry = self.policy.stamp(response, now_ms);
        let this = Arc::clone(self);
        self.spawn_background(async move {
            if !this.cache.store(PartitionKind::Tile, &key, &entry).await {
                return;
            }
            if !this.sampler.should_run() {
                return;
            }
            if let Err(e) = this.cache.maintain_tiles(&this.policy, now_millis()).await {
                counter!(telemetry::STORAGE_ERRORS_TOTAL, "op" => "maintain").increment(1);
                error!(error = %e, "tile maintenance failed");
            }
        });
    }

    /// Stale-while-revalidate against the data partition.
    pub(super) async fn bulk_data(self: &Arc<Self>, request: &Request) -> Routed {
        if !request.is_get() {
            return self.passthrough(request).await;
        }
        let key = request.key();
        let cached = self.cache.lookup(PartitionKind::Data, &key).await;

        let cache = self.cache.clone();
        let fetcher = Arc::clone(&self.fetcher);
        let upstream = request.clone();
        let revalidate = async move {
            let response = fetcher.fetch(&upstream).await?;
            if response.status == 200 {
                cache.store(PartitionKind::Data, &key, &response).await;
            }
            Ok::<_, TilegateError>(response)
        };

        match cached {
            Some(entry) => {
                let url = request.url.clone();
                self.spawn_background(async move {
                    if let Err(e) = revalidate.await {
                        debug!(url = %url, error = %e, "revalidation failed, keeping cached copy");
                    }
                });
                Ok((entry, ResponseSource::Cache))
            }
            None => Ok((revalidate.await?, ResponseSource::Network)),
        }
    }

    /// Network first. Only GETs are cached, and only network errors fall
    /// back to the cache.
    pub(super) async fn identity(self: &Arc<Self>, request: &Request) -> Routed {
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if request.is_get() && response.is_ok() {
                    let cache = self.cache.clone();
                    let key = request.key();
                    let entry = response.clone();
                    self.spawn_background(async move {
                        cache.store(PartitionKind::Data, &key, &entry).await;
                    });
                }
                Ok((response, ResponseSource::Network))
            }
            Err(e) if request.is_get() && e.is_network() => {
                match self.cache.lookup(PartitionKind::Data, &request.key()).await {
                    Some(entry) => {
                        debug!(url = %request.url, error = %e, "identity request served from cache");
                        Ok((entry, ResponseSource::Cache))
                    }
                    None => Err(e),
                }
            }
            Err(e) => {
                warn!(method = %request.method, url = %request.url, error = %e, "identity request failed");
                Err(e)
            }
        }
    }

    /// Cache first across all partitions; write successful GETs to shell.
    pub(super) async fn shell(self: &Arc<Self>, request: &Request) -> Routed {
        if !request.is_get() {
            return self.passthrough(request).await;
        }
        let key = request.key();
        if let Some((_, entry)) = self.cache.match_any(&key).await {
            return Ok((entry, ResponseSource::Cache));
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.status == 200 {
                    self.cache.store(PartitionKind::Shell, &key, &response).await;
                }
                Ok((response, ResponseSource::Network))
            }
            Err(e) if request.is_navigation() && e.is_network() => {
                let root = RequestKey::get(&self.classifier.origin().join("/")?);
                match self.cache.match_any(&root).await {
                    Some((_, document)) => {
                        debug!(url = %request.url, error = %e, "navigation failed, serving cached root");
                        Ok((document, ResponseSource::Fallback))
                    }
                    None => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn passthrough(&self, request: &Request) -> Routed {
        let response = self.fetcher.fetch(request).await?;
        Ok((response, ResponseSource::Passthrough))
    }
}
