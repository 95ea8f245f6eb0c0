//! In-process storage backend.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::traits::CacheStorage;
use crate::types::{RequestKey, Response};
use crate::{Result, TilegateError};

#[derive(Default)]
struct Partition {
    entries: HashMap<RequestKey, (u64, Response)>,
    next_seq: u64,
}

/// Volatile storage held in process memory.
///
/// Partitions are kept in creation order; entries carry a per-partition
/// sequence number so [`keys`](CacheStorage::keys) can report insertion
/// order without a separate list to keep in sync.
#[derive(Default)]
pub struct MemoryStorage {
    partitions: RwLock<Vec<(String, Partition)>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> TilegateError {
    TilegateError::Storage(format!("lock poisoned: {e}"))
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    async fn partition_names(&self) -> Result<Vec<String>> {
        let partitions = self.partitions.read().map_err(poisoned)?;
        Ok(partitions.iter().map(|(name, _)| name.clone()).collect())
    }

    async fn open(&self, partition: &str) -> Result<()> {
        let mut partitions = self.partitions.write().map_err(poisoned)?;
        if !partitions.iter().any(|(name, _)| name == partition) {
            partitions.push((partition.to_string(), Partition::default()));
        }
        Ok(())
    }

    async fn delete_partition(&self, partition: &str) -> Result<bool> {
        let mut partitions = self.partitions.write().map_err(poisoned)?;
        let before = partitions.len();
        partitions.retain(|(name, _)| name != partition);
        Ok(partitions.len() != before)
    }

    async fn get(&self, partition: &str, key: &RequestKey) -> Result<Option<Response>> {
        let partitions = self.partitions.read().map_err(poisoned)?;
        Ok(partitions
            .iter()
            .find(|(name, _)| name == partition)
            .and_then(|(_, p)| p.entries.get(key))
            .map(|(_, response)| response.clone()))
    }

    async fn put(&self, partition: &str, key: &RequestKey, response: &Response) -> Result<()> {
        let mut partitions = self.partitions.write().map_err(poisoned)?;
        let idx = match partitions.iter().position(|(name, _)| name == partition) {
            Some(idx) => idx,
            None => {
                partitions.push((partition.to_string(), Partition::default()));
                partitions.len() - 1
            }
        };
        let p = &mut partitions[idx].1;
        let seq = p.next_seq;
        p.next_seq += 1;
        p.entries.insert(key.clone(), (seq, response.clone()));
        Ok(())
    }

    async fn delete(&self, partition: &str, key: &RequestKey) -> Result<bool> {
        let mut partitions = self.partitions.write().map_err(poisoned)?;
        Ok(partitions
            .iter_mut()
            .find(|(name, _)| name == partition)
            .is_some_and(|(_, p)| p.entries.remove(key).is_some()))
    }

    async fn keys(&self, partition: &str) -> Result<Vec<RequestKey>> {
        let partitions = self.partitions.read().map_err(poisoned)?;
        let Some((_, p)) = partitions.iter().find(|(name, _)| name == partition) else {
            return Ok(Vec::new());
        };
        let mut keyed: Vec<_> = p.entries.iter().map(|(k, (seq, _))| (*seq, k)).collect();
        keyed.sort_unstable_by_key(|(seq, _)| *seq);
        Ok(keyed.into_iter().map(|(_, k)| k.clone()).collect())
    }
}
