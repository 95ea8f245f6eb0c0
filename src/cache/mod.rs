//! Cache partitions and the tile policy.
//!
//! A release owns three partitions:
//!
//! - **shell**: the app shell (HTML, manifest, icons), populated at install
//!   and by same-origin GETs.
//! - **data**: bulk data files and identity-service GET responses.
//! - **tile**: map tiles, bounded by [`TileCachePolicy`].
//!
//! [`CacheManager`] owns the names and the storage handle; the router and
//! lifecycle code only talk to it.

mod manager;
pub mod policy;

pub use manager::{
    CacheManager, DEFAULT_INFO_SAMPLE, Partition, PartitionInfo, PartitionNames, SweepReport,
};
pub use policy::{MaintenanceReport, MaintenanceSampler, TileCachePolicy, TileProfile};
