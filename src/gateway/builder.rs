//! Builder for configuring Tilegate instances

use std::sync::Arc;

use tracing::debug;

use super::Tilegate;
use crate::Result;
use crate::cache::{CacheManager, MaintenanceSampler, PartitionNames, TileCachePolicy};
use crate::classify::{Classifier, ClassifierConfig};
use crate::config::Config;
use crate::control::ControlChannel;
use crate::lifecycle::{HostHooks, LifecycleManager, NoopHooks};
use crate::network::Fetcher;
use crate::router::FetchRouter;
use crate::storage::CacheStorage;

/// Builder for [`Tilegate`].
///
/// Anything not set explicitly comes from the [`Config`] (itself
/// defaulted), so `Tilegate::builder().build()` works out of the box.
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use tilegate::{Tilegate, MemoryStorage, TileCachePolicy};
/// let gate = Tilegate::builder()
///     .origin("https://maps.example.org/")
///     .release("aerafield", "v2")
///     .storage(Arc::new(MemoryStorage::new()))
///     .tile_policy(TileCachePolicy::network_preferred())
///     .build()?;
/// # Ok::<(), tilegate::TilegateError>(())
/// ```
#[derive(Default)]
pub struct TilegateBuilder {
    config: Config,
    storage: Option<Arc<dyn CacheStorage>>,
    fetcher: Option<Arc<dyn Fetcher>>,
    tile_policy: Option<TileCachePolicy>,
    sampler: Option<MaintenanceSampler>,
    classifier: Option<ClassifierConfig>,
    hooks: Option<Arc<dyn HostHooks>>,
    partition_names: Option<PartitionNames>,
    origin: Option<String>,
}

impl TilegateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `config` for every setting not overridden on the builder.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Storage backend (default: from `[storage]`).
    pub fn storage(mut self, storage: Arc<dyn CacheStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Network transport (default: [`HttpFetcher`](crate::HttpFetcher) from `[network]`).
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn tile_policy(mut self, policy: TileCachePolicy) -> Self {
        self.tile_policy = Some(policy);
        self
    }

    /// Override the maintenance sampler, e.g. [`MaintenanceSampler::always`]
    /// in tests.
    pub fn maintenance_sampler(mut self, sampler: MaintenanceSampler) -> Self {
        self.sampler = Some(sampler);
        self
    }

    pub fn classifier(mut self, config: ClassifierConfig) -> Self {
        self.classifier = Some(config);
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn HostHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Name partitions `{prefix}-shell-{version}` and so on.
    pub fn release(mut self, prefix: &str, version: &str) -> Self {
        self.partition_names = Some(PartitionNames::versioned(prefix, version));
        self
    }

    /// Use explicit partition names.
    pub fn partition_names(mut self, names: PartitionNames) -> Self {
        self.partition_names = Some(names);
        self
    }

    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Build the instance.
    ///
    /// Fails on an unparseable origin, an invalid data pattern, or an HTTP
    /// client that cannot be constructed.
    pub fn build(self) -> Result<Tilegate> {
        let config = self.config;

        let origin = url::Url::parse(self.origin.as_deref().unwrap_or(&config.cache.origin))?;
        let classifier_config = self.classifier.unwrap_or_else(|| config.classifier.clone());
        let classifier = Arc::new(Classifier::new(&classifier_config, &origin)?);

        let storage = self.storage.unwrap_or_else(|| config.storage.open());
        let fetcher: Arc<dyn Fetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(config.network.fetcher()?),
        };
        let names = self
            .partition_names
            .unwrap_or_else(|| config.partition_names());
        let policy = self.tile_policy.unwrap_or_else(|| config.tiles.policy());
        let sampler = self
            .sampler
            .unwrap_or_else(|| MaintenanceSampler::new(policy.maintenance_rate));
        let hooks = self.hooks.unwrap_or_else(|| Arc::new(NoopHooks));

        debug!(
            origin = %origin,
            storage = storage.name(),
            fetcher = fetcher.name(),
            partitions = ?names.all(),
            profile = ?policy.profile,
            "building tilegate"
        );

        let cache = CacheManager::new(storage, names);
        let router = FetchRouter::with_sampler(
            Arc::clone(&classifier),
            cache.clone(),
            Arc::clone(&fetcher),
            policy,
            sampler,
        );
        let lifecycle = LifecycleManager::new(cache.clone(), fetcher, classifier, hooks);
        let control = ControlChannel::new(cache);

        Ok(Tilegate {
            router,
            lifecycle,
            control,
        })
    }
}
