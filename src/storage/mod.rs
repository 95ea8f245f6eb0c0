//! Storage backends for cache partitions.
//!
//! [`CacheStorage`] is the seam between the cache manager and whatever
//! actually holds the bytes. Two backends ship with the crate:
//!
//! - [`MemoryStorage`]: volatile, for tests and short-lived hosts.
//! - [`DiskStorage`]: one directory per partition, survives restarts.

mod disk;
mod memory;
mod traits;

pub use disk::DiskStorage;
pub use memory::MemoryStorage;
pub use traits::CacheStorage;
