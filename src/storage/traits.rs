//! Storage backend trait.

use async_trait::async_trait;

use crate::Result;
use crate::types::{RequestKey, Response};

/// A named-partition key/value store for response snapshots.
///
/// Mirrors what a browser-style cache store offers: partitions are created
/// lazily, entries are whole-response snapshots, and key enumeration
/// follows insertion order. Re-putting an existing key replaces the entry
/// and moves it to the back of the order.
///
/// Backends only need atomic per-key `get`/`put`/`delete`; nothing above
/// this trait relies on multi-key transactions.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Every partition currently present, in a stable order.
    async fn partition_names(&self) -> Result<Vec<String>>;

    /// Create `partition` if it does not exist yet. Idempotent.
    async fn open(&self, partition: &str) -> Result<()>;

    /// Remove a partition and all its entries. Returns whether it existed.
    async fn delete_partition(&self, partition: &str) -> Result<bool>;

    /// Look up one entry. Missing partitions read as empty.
    async fn get(&self, partition: &str, key: &RequestKey) -> Result<Option<Response>>;

    /// Insert or replace one entry, creating the partition if needed.
    async fn put(&self, partition: &str, key: &RequestKey, response: &Response) -> Result<()>;

    /// Remove one entry. Returns whether it existed.
    async fn delete(&self, partition: &str, key: &RequestKey) -> Result<bool>;

    /// All keys of `partition`, oldest insertion first.
    async fn keys(&self, partition: &str) -> Result<Vec<RequestKey>>;
}
