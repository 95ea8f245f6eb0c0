//! Tilegate - offline caching and request routing for map applications
//!
//! Tilegate sits between a map application and the network. Every outgoing
//! request is classified (tile, bulk data, identity, shell, other) and
//! answered by the caching strategy for its class, so the app keeps
//! rendering the map, its data layers and its shell while offline.
//!
//! Cached responses live in three named, versioned partitions. Releasing a
//! new version and activating it deletes the previous release's partitions.
//!
//! # Example
//!
//! ```rust,no_run
//! use tilegate::{RequestInterceptor, Tilegate};
//!
//! #[tokio::main]
//! async fn main() -> tilegate::Result<()> {
//!     let gate = Tilegate::builder()
//!         .origin("https://maps.example.org/")
//!         .release("aerafield", "v2")
//!         .build()?;
//!
//!     gate.install().await?;
//!     gate.activate().await;
//!
//!     let request = gate.request("GET", "https://tile.openstreetmap.org/12/2200/1343.png")?;
//!     let served = gate.fetch(&request).await?;
//!     println!("{} from {:?}", served.response.status, served.source);
//!
//!     gate.settle().await;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod classify;
pub mod config;
pub mod control;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod network;
pub mod router;
pub mod storage;
pub mod telemetry;
pub mod traits;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use cache::{
    CacheManager, MaintenanceReport, MaintenanceSampler, Partition, PartitionInfo,
    PartitionNames, SweepReport, TileCachePolicy, TileProfile,
};
pub use classify::{Classifier, ClassifierConfig};
pub use config::Config;
pub use control::{ControlChannel, ControlHandle, ControlReply, ControlRequest};
pub use error::{Result, TilegateError};
pub use gateway::{Tilegate, TilegateBuilder};
pub use lifecycle::{HostHooks, InstallReport, LifecycleManager, LifecycleState, NoopHooks};
pub use network::{Fetcher, HttpFetcher};
pub use router::{FetchRouter, ResponseSource, Served};
pub use storage::{CacheStorage, DiskStorage, MemoryStorage};
pub use traits::RequestInterceptor;
pub use types::{
    CACHED_TIME_HEADER, PartitionKind, Request, RequestKey, RequestMode, Response,
    TRANSPARENT_PNG, TrafficClass,
};
pub use version::{PKG_VERSION, version_string};
