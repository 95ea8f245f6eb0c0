//! Tile partition bounds.
//!
//! Tiles are high-volume and low-value, so the tile partition is bounded:
//!
//! - **Capacity.** When a maintenance pass finds more than `max_entries`
//!   tiles, it deletes `floor(count * evict_fraction)` entries from the
//!   front of the key order.
//! - **Age** (optional). Entries whose [`CACHED_TIME_HEADER`] is older than
//!   `max_age` are deleted by the same pass.
//!
//! # FIFO, not LRU
//!
//! "Front of the key order" means oldest *insertion*, not least recently
//! *used*: storage reports keys in insertion order and keeps no access
//! time. A tile read a thousand times is evicted just as early as one
//! never read again. For map tiles, which are rarely revisited, this is
//! close enough. Real recency would need a last-access stamp written on
//! every hit.
//!
//! # Amortization
//!
//! A pass scans the whole partition, so it does not run on every write.
//! After each tile write a [`MaintenanceSampler`] decides whether to run
//! one; the default rate of 0.02 gives roughly one pass per 50 writes.
//! Tests use [`MaintenanceSampler::always`] to make this deterministic.

use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use metrics::counter;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use tracing::{debug, warn};

use super::manager::Partition;
use crate::telemetry;
use crate::types::{CACHED_TIME_HEADER, RequestKey, Response};
use crate::{Result, TilegateError};

/// Default tile entry ceiling.
pub const DEFAULT_MAX_ENTRIES: usize = 2_000;

/// Default share of entries removed when the ceiling is exceeded.
pub const DEFAULT_EVICT_FRACTION: f64 = 0.2;

/// Default tile age limit for the durable profile: 7 days.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default probability of running maintenance after a tile write.
pub const DEFAULT_MAINTENANCE_RATE: f64 = 0.02;

/// Default network deadline for the network-preferred profile.
pub const DEFAULT_NETWORK_TIMEOUT: Duration = Duration::from_secs(5);

/// How tile requests trade freshness against offline coverage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TileProfile {
    /// Serve fresh cache first; on any network problem serve stale cache,
    /// then a transparent placeholder. Tile requests never fail.
    #[default]
    OfflineDurable,
    /// Race the network against a deadline; fall back to cache. With no
    /// cache the network error is surfaced.
    NetworkPreferred,
}

/// Policy for the tile partition and tile routing.
///
/// ```rust
/// # use tilegate::TileCachePolicy;
/// # use std::time::Duration;
/// let policy = TileCachePolicy::durable()
///     .max_entries(5_000)
///     .max_age(Some(Duration::from_secs(3 * 86_400)));
/// assert_eq!(policy.max_entries, 5_000);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TileCachePolicy {
    pub profile: TileProfile,
    /// Entry ceiling checked by maintenance. Default: 2,000.
    pub max_entries: usize,
    /// Share of entries evicted when over the ceiling. Default: 0.2.
    pub evict_fraction: f64,
    /// Age limit; `None` keeps tiles until evicted by capacity or cleared.
    pub max_age: Option<Duration>,
    /// Probability of a maintenance pass after a tile write. Default: 0.02.
    pub maintenance_rate: f64,
    /// Network deadline used by [`TileProfile::NetworkPreferred`].
    pub network_timeout: Duration,
}

impl Default for TileCachePolicy {
    fn default() -> Self {
        Self::durable()
    }
}

impl TileCachePolicy {
    /// Same as [`durable`](Self::durable).
    pub fn new() -> Self {
        Self::durable()
    }

    /// Offline-durable routing with count and age bounds.
    pub fn durable() -> Self {
        Self {
            profile: TileProfile::OfflineDurable,
            max_entries: DEFAULT_MAX_ENTRIES,
            evict_fraction: DEFAULT_EVICT_FRACTION,
            max_age: Some(DEFAULT_MAX_AGE),
            maintenance_rate: DEFAULT_MAINTENANCE_RATE,
            network_timeout: DEFAULT_NETWORK_TIMEOUT,
        }
    }

    /// Network-preferred routing with a count bound only.
    pub fn network_preferred() -> Self {
        Self {
            profile: TileProfile::NetworkPreferred,
            max_age: None,
            ..Self::durable()
        }
    }

    /// Set the routing profile.
    pub fn profile(mut self, profile: TileProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Set the entry ceiling.
    pub fn max_entries(mut self, n: usize) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the eviction share (clamped to `0.0..=1.0`).
    pub fn evict_fraction(mut self, fraction: f64) -> Self {
        self.evict_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    /// Set or clear the age limit.
    pub fn max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    /// Set the maintenance probability (clamped to `0.0..=1.0`).
    pub fn maintenance_rate(mut self, rate: f64) -> Self {
        self.maintenance_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Set the network deadline for the network-preferred profile.
    pub fn network_timeout(mut self, timeout: Duration) -> Self {
        self.network_timeout = timeout;
        self
    }

    /// Whether tiles carry a write timestamp under this policy.
    pub fn stamps_tiles(&self) -> bool {
        self.max_age.is_some()
    }

    /// Prepare a network response for the tile partition.
    ///
    /// Adds [`CACHED_TIME_HEADER`] when the policy has an age limit; the
    /// permanent variant stores the response untouched.
    pub fn stamp(&self, response: &Response, now_ms: u64) -> Response {
        if self.stamps_tiles() {
            response.with_header(CACHED_TIME_HEADER, now_ms.to_string())
        } else {
            response.clone()
        }
    }

    /// Whether a cached tile can be served without asking the network.
    ///
    /// Without an age limit every entry is fresh. With one, an entry is
    /// fresh only if it carries a write time newer than `now - max_age`.
    pub fn is_fresh(&self, response: &Response, now_ms: u64) -> bool {
        match self.max_age {
            None => true,
            Some(_) => response
                .cached_time()
                .is_some_and(|written| written > self.expiry_threshold(now_ms)),
        }
    }

    /// Write times at or below this value are expired.
    pub fn expiry_threshold(&self, now_ms: u64) -> u64 {
        let max_age_ms = self.max_age.map(|age| age.as_millis() as u64).unwrap_or(0);
        now_ms.saturating_sub(max_age_ms)
    }

    /// How many of `count` entries a capacity pass removes.
    pub fn eviction_count(&self, count: usize) -> usize {
        if count <= self.max_entries {
            return 0;
        }
        (count as f64 * self.evict_fraction).floor() as usize
    }
}

/// Outcome of one maintenance pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Entries seen when the pass started.
    pub scanned: usize,
    /// Entries removed by the capacity bound.
    pub evicted: usize,
    /// Entries removed by the age bound.
    pub expired: usize,
    /// Entries that could not be read or deleted; left for the next pass.
    pub failed: usize,
}

impl MaintenanceReport {
    /// Entries remaining after the pass, ignoring concurrent writes.
    pub fn remaining(&self) -> usize {
        self.scanned - self.evicted - self.expired
    }
}

/// Decides whether a tile write triggers maintenance.
///
/// Holds the rate and its own random source so tests can pin both.
pub struct MaintenanceSampler {
    rate: f64,
    rng: Mutex<StdRng>,
}

impl MaintenanceSampler {
    /// Sample at `rate` using an entropy-seeded generator.
    pub fn new(rate: f64) -> Self {
        Self::with_rng(rate, StdRng::from_entropy())
    }

    /// Sample at `rate` with a reproducible sequence.
    pub fn seeded(rate: f64, seed: u64) -> Self {
        Self::with_rng(rate, StdRng::seed_from_u64(seed))
    }

    /// Run maintenance after every write.
    pub fn always() -> Self {
        Self::seeded(1.0, 0)
    }

    /// Never run maintenance from the write path.
    pub fn never() -> Self {
        Self::seeded(0.0, 0)
    }

    fn with_rng(rate: f64, rng: StdRng) -> Self {
        Self {
            rate: rate.clamp(0.0, 1.0),
            rng: Mutex::new(rng),
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Draw once.
    pub fn should_run(&self) -> bool {
        if self.rate >= 1.0 {
            return true;
        }
        if self.rate <= 0.0 {
            return false;
        }
        match self.rng.lock() {
            Ok(mut rng) => rng.gen_bool(self.rate),
            // A poisoned generator still has usable state.
            Err(poisoned) => poisoned.into_inner().gen_bool(self.rate),
        }
    }
}

impl std::fmt::Debug for MaintenanceSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaintenanceSampler")
            .field("rate", &self.rate)
            .finish()
    }
}

/// Run one maintenance pass over the tile partition.
///
/// Capacity eviction runs first over the initial key order; the age check
/// then looks only at the survivors. Neither step is atomic with respect to
/// concurrent writes: a tile added mid-pass may be evicted straight away,
/// which costs a re-fetch and nothing else.
///
/// Only a failure to list the keys fails the pass. A failed read or delete
/// of one entry is logged, counted in [`MaintenanceReport::failed`] and
/// skipped.
pub async fn maintain(
    partition: &Partition,
    policy: &TileCachePolicy,
    now_ms: u64,
) -> Result<MaintenanceReport> {
    let keys = partition.keys().await?;
    let mut report = MaintenanceReport {
        scanned: keys.len(),
        ..Default::default()
    };

    let evict = policy.eviction_count(keys.len());
    if evict > 0 {
        debug!(
            partition = partition.name(),
            count = keys.len(),
            evict,
            "tile partition over capacity"
        );
        for key in &keys[..evict] {
            match partition.delete(key).await {
                Ok(true) => report.evicted += 1,
                Ok(false) => {}
                Err(e) => entry_failed(&mut report, partition, key, "delete", &e),
            }
        }
    }

    if policy.max_age.is_some() {
        let threshold = policy.expiry_threshold(now_ms);
        for key in &keys[evict..] {
            let response = match partition.get(key).await {
                Ok(Some(response)) => response,
                Ok(None) => continue,
                Err(e) => {
                    entry_failed(&mut report, partition, key, "get", &e);
                    continue;
                }
            };
            let expired = response
                .cached_time()
                .is_some_and(|written| written < threshold);
            if !expired {
                continue;
            }
            match partition.delete(key).await {
                Ok(true) => report.expired += 1,
                Ok(false) => {}
                Err(e) => entry_failed(&mut report, partition, key, "delete", &e),
            }
        }
    }

    Ok(report)
}

fn entry_failed(
    report: &mut MaintenanceReport,
    partition: &Partition,
    key: &RequestKey,
    op: &'static str,
    error: &TilegateError,
) {
    report.failed += 1;
    counter!(telemetry::STORAGE_ERRORS_TOTAL, "op" => op).increment(1);
    warn!(partition = partition.name(), key = %key, op, error = %error, "skipping tile during maintenance");
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
