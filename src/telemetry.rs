//! Telemetry metric name constants.
//!
//! Centralised metric names for tilegate operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `tilegate_`. Counters end in `_total`.
//!
//! # Common labels
//!
//! - `class`: traffic class (e.g. "tile", "bulk-data", "identity")
//! - `source`: where the response came from, or "error"
//! - `partition`: partition kind ("shell", "data", "tile")
//! - `reason`: eviction reason ("capacity" or "expired")
//! - `op`: storage operation ("get", "put", "delete", "delete_partition", "maintain")

/// Total requests handled by the router.
///
/// Labels: `class`, `source` ("network" | "cache" | "fallback" | "passthrough" | "error").
pub const REQUESTS_TOTAL: &str = "tilegate_requests_total";

/// Total cache hits.
///
/// Labels: `partition`.
pub const CACHE_HITS_TOTAL: &str = "tilegate_cache_hits_total";

/// Total cache misses.
///
/// Labels: `partition`.
pub const CACHE_MISSES_TOTAL: &str = "tilegate_cache_misses_total";

/// Total tile entries removed by maintenance.
///
/// Labels: `reason` ("capacity" | "expired").
pub const TILE_EVICTIONS_TOTAL: &str = "tilegate_tile_evictions_total";

/// Total partitions deleted by a version sweep.
pub const PARTITIONS_SWEPT_TOTAL: &str = "tilegate_partitions_swept_total";

/// Total transparent placeholder tiles served.
pub const FALLBACK_TILES_TOTAL: &str = "tilegate_fallback_tiles_total";

/// Total storage operations that failed and were degraded.
///
/// Labels: `op`.
pub const STORAGE_ERRORS_TOTAL: &str = "tilegate_storage_errors_total";
