//! Named, versioned cache partitions.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::policy::{self, MaintenanceReport, TileCachePolicy};
use crate::Result;
use crate::storage::CacheStorage;
use crate::telemetry;
use crate::types::{PartitionKind, RequestKey, Response};

/// Number of sample URLs reported per partition by [`CacheManager::info`].
pub const DEFAULT_INFO_SAMPLE: usize = 5;

/// The partition names of one release.
///
/// Bumping the release version yields a new set of names; activation then
/// deletes every partition not named here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionNames {
    pub shell: String,
    pub data: String,
    pub tile: String,
}

impl PartitionNames {
    /// Use explicit names, e.g. `("v5-shell", "v5-data", "v5-tiles")`.
    pub fn new(
        shell: impl Into<String>,
        data: impl Into<String>,
        tile: impl Into<String>,
    ) -> Self {
        Self {
            shell: shell.into(),
            data: data.into(),
            tile: tile.into(),
        }
    }

    /// `{prefix}-shell-{version}`, `{prefix}-data-{version}`,
    /// `{prefix}-tiles-{version}`.
    pub fn versioned(prefix: &str, version: &str) -> Self {
        Self::new(
            format!("{prefix}-shell-{version}"),
            format!("{prefix}-data-{version}"),
            format!("{prefix}-tiles-{version}"),
        )
    }

    pub fn name(&self, kind: PartitionKind) -> &str {
        match kind {
            PartitionKind::Shell => &self.shell,
            PartitionKind::Data => &self.data,
            PartitionKind::Tile => &self.tile,
        }
    }

    /// All three names, shell first.
    pub fn all(&self) -> [&str; 3] {
        [&self.shell, &self.data, &self.tile]
    }

    pub fn contains(&self, name: &str) -> bool {
        self.all().contains(&name)
    }
}

/// A handle on one opened partition.
///
/// Cheap to clone. Operations propagate storage errors; use the
/// [`CacheManager`] wrappers for best-effort access.
#[derive(Clone)]
pub struct Partition {
    kind: PartitionKind,
    name: Arc<str>,
    storage: Arc<dyn CacheStorage>,
}

impl Partition {
    pub fn kind(&self) -> PartitionKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn get(&self, key: &RequestKey) -> Result<Option<Response>> {
        self.storage.get(&self.name, key).await
    }

    pub async fn put(&self, key: &RequestKey, response: &Response) -> Result<()> {
        self.storage.put(&self.name, key, response).await
    }

    pub async fn delete(&self, key: &RequestKey) -> Result<bool> {
        self.storage.delete(&self.name, key).await
    }

    /// Keys in insertion order, oldest first.
    pub async fn keys(&self) -> Result<Vec<RequestKey>> {
        self.storage.keys(&self.name).await
    }

    pub async fn len(&self) -> Result<usize> {
        Ok(self.keys().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

impl std::fmt::Debug for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Partition")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .finish()
    }
}

/// Summary of one partition for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionInfo {
    pub entry_count: usize,
    /// The first few cached URLs, oldest first.
    pub urls: Vec<String>,
}

/// Result of deleting stale partitions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted: Vec<String>,
    /// Partitions whose deletion failed; retried on the next sweep.
    pub failed: Vec<String>,
}

/// Owns the partitions of the current release.
///
/// Reads and writes made on behalf of request routing go through
/// [`lookup`](Self::lookup) and [`store`](Self::store), which never fail:
/// a storage error is logged, counted, and treated as a miss or a skipped
/// write, so a broken store degrades to network-only behavior.
#[derive(Clone)]
pub struct CacheManager {
    inner: Arc<Inner>,
}

struct Inner {
    storage: Arc<dyn CacheStorage>,
    names: PartitionNames,
}

impl CacheManager {
    pub fn new(storage: Arc<dyn CacheStorage>, names: PartitionNames) -> Self {
        Self {
            inner: Arc::new(Inner { storage, names }),
        }
    }

    pub fn names(&self) -> &PartitionNames {
        &self.inner.names
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.inner.storage
    }

    /// A handle on `kind` without touching storage.
    pub fn partition(&self, kind: PartitionKind) -> Partition {
        Partition {
            kind,
            name: Arc::from(self.inner.names.name(kind)),
            storage: Arc::clone(&self.inner.storage),
        }
    }

    /// Create `kind` if needed and return a handle on it. Idempotent.
    pub async fn open(&self, kind: PartitionKind) -> Result<Partition> {
        let partition = self.partition(kind);
        self.inner.storage.open(partition.name()).await?;
        Ok(partition)
    }

    /// Best-effort lookup in one partition.
    pub async fn lookup(&self, kind: PartitionKind, key: &RequestKey) -> Option<Response> {
        let name = self.inner.names.name(kind);
        match self.inner.storage.get(name, key).await {
            Ok(Some(response)) => {
                counter!(telemetry::CACHE_HITS_TOTAL, "partition" => kind.as_str()).increment(1);
                Some(response)
            }
            Ok(None) => {
                counter!(telemetry::CACHE_MISSES_TOTAL, "partition" => kind.as_str())
                    .increment(1);
                None
            }
            Err(e) => {
                counter!(telemetry::STORAGE_ERRORS_TOTAL, "op" => "get").increment(1);
                warn!(partition = name, key = %key, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Best-effort lookup across all partitions, shell first.
    pub async fn match_any(&self, key: &RequestKey) -> Option<(PartitionKind, Response)> {
        for kind in PartitionKind::ALL {
            if let Some(response) = self.lookup(kind, key).await {
                return Some((kind, response));
            }
        }
        None
    }

    /// Best-effort write. Returns whether the entry was stored.
    pub async fn store(&self, kind: PartitionKind, key: &RequestKey, response: &Response) -> bool {
        let name = self.inner.names.name(kind);
        match self.inner.storage.put(name, key, response).await {
            Ok(()) => {
                debug!(partition = name, key = %key, "cached");
                true
            }
            Err(e) => {
                counter!(telemetry::STORAGE_ERRORS_TOTAL, "op" => "put").increment(1);
                warn!(partition = name, key = %key, error = %e, "cache write failed");
                false
            }
        }
    }

    /// Delete one entry.
    pub async fn delete(&self, kind: PartitionKind, key: &RequestKey) -> Result<bool> {
        self.partition(kind).delete(key).await
    }

    /// Keys of one partition, oldest first.
    pub async fn keys(&self, kind: PartitionKind) -> Result<Vec<RequestKey>> {
        self.partition(kind).keys().await
    }

    /// Delete every partition whose name is not in `current`.
    ///
    /// A failure on one partition is logged and does not stop the others.
    pub async fn sweep(&self, current: &HashSet<String>) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        for name in self.inner.storage.partition_names().await? {
            if current.contains(&name) {
                continue;
            }
            match self.inner.storage.delete_partition(&name).await {
                Ok(_) => {
                    counter!(telemetry::PARTITIONS_SWEPT_TOTAL).increment(1);
                    info!(partition = %name, "deleted stale partition");
                    report.deleted.push(name);
                }
                Err(e) => {
                    counter!(telemetry::STORAGE_ERRORS_TOTAL, "op" => "delete_partition")
                        .increment(1);
                    warn!(partition = %name, error = %e, "failed to delete stale partition");
                    report.failed.push(name);
                }
            }
        }
        Ok(report)
    }

    /// Sweep everything outside this release's partition names.
    pub async fn sweep_stale(&self) -> Result<SweepReport> {
        let current = self
            .inner
            .names
            .all()
            .into_iter()
            .map(str::to_string)
            .collect();
        self.sweep(&current).await
    }

    /// Delete every partition, current or not. Returns how many existed.
    pub async fn clear_all(&self) -> Result<usize> {
        let names = self.inner.storage.partition_names().await?;
        let mut deleted = 0;
        for name in &names {
            if self.inner.storage.delete_partition(name).await? {
                deleted += 1;
            }
        }
        info!(deleted, "cleared all partitions");
        Ok(deleted)
    }

    /// Delete one partition. It is recreated on the next write.
    pub async fn clear(&self, kind: PartitionKind) -> Result<bool> {
        let name = self.inner.names.name(kind);
        let existed = self.inner.storage.delete_partition(name).await?;
        info!(partition = name, existed, "cleared partition");
        Ok(existed)
    }

    /// Entry counts and up to `sample` URLs for every existing partition.
    pub async fn info(&self, sample: usize) -> Result<BTreeMap<String, PartitionInfo>> {
        let mut out = BTreeMap::new();
        for name in self.inner.storage.partition_names().await? {
            let keys = self.inner.storage.keys(&name).await?;
            let info = PartitionInfo {
                entry_count: keys.len(),
                urls: keys
                    .iter()
                    .take(sample)
                    .map(|key| key.url().to_string())
                    .collect(),
            };
            out.insert(name, info);
        }
        Ok(out)
    }

    /// Run one tile maintenance pass now.
    pub async fn maintain_tiles(
        &self,
        policy: &TileCachePolicy,
        now_ms: u64,
    ) -> Result<MaintenanceReport> {
        let partition = self.partition(PartitionKind::Tile);
        let report = policy::maintain(&partition, policy, now_ms).await?;
        if report.evicted > 0 {
            counter!(telemetry::TILE_EVICTIONS_TOTAL, "reason" => "capacity")
                .increment(report.evicted as u64);
        }
        if report.expired > 0 {
            counter!(telemetry::TILE_EVICTIONS_TOTAL, "reason" => "expired")
                .increment(report.expired as u64);
        }
        debug!(
            scanned = report.scanned,
            evicted = report.evicted,
            expired = report.expired,
            failed = report.failed,
            "tile maintenance finished"
        );
        Ok(report)
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("storage", &self.inner.storage.name())
            .field("names", &self.inner.names)
            .finish()
    }
}
