//! Filesystem storage backend.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<partition>/<sha256(key)>.entry
//! ```
//!
//! An entry file holds the whole snapshot:
//!
//! ```text
//! u32 big-endian header length | header JSON (key, status, headers, seq) | body bytes
//! ```
//!
//! Each put writes a temp file unique to that write, then renames it over
//! the entry. One rename publishes the snapshot and one read returns it,
//! so concurrent puts of the same key leave exactly one writer's snapshot
//! and readers never see a mix. Entries survive process restarts.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::warn;

use super::traits::CacheStorage;
use crate::types::{RequestKey, Response};
use crate::{Result, TilegateError};

const ENTRY_EXT: &str = "entry";
const HEADER_LEN_BYTES: usize = 4;

/// Entry header stored ahead of the body.
#[derive(Debug, Serialize, Deserialize)]
struct EntryHeader {
    /// Insertion sequence; larger is newer.
    seq: u64,
    key: RequestKey,
    status: u16,
    status_text: String,
    headers: BTreeMap<String, String>,
}

/// Persistent storage rooted at a directory.
pub struct DiskStorage {
    root: PathBuf,
    last_seq: AtomicU64,
}

impl DiskStorage {
    /// Use `root` as the storage directory. It is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            last_seq: AtomicU64::new(0),
        }
    }

    /// Default location: `~/.cache/tilegate/partitions`.
    pub fn default_root() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("tilegate")
            .join("partitions")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn partition_dir(&self, partition: &str) -> Result<PathBuf> {
        let valid = !partition.is_empty()
            && partition != "."
            && partition != ".."
            && !partition.contains(['/', '\\']);
        if !valid {
            return Err(TilegateError::InvalidInput(format!(
                "invalid partition name {partition:?}"
            )));
        }
        Ok(self.root.join(partition))
    }

    fn entry_path(&self, partition: &str, key: &RequestKey) -> Result<PathBuf> {
        let stem = hex::encode(Sha256::digest(key.to_string().as_bytes()));
        Ok(self
            .partition_dir(partition)?
            .join(format!("{stem}.{ENTRY_EXT}")))
    }

    /// Monotonic across the process and, via wall-clock seeding, across
    /// restarts.
    fn next_seq(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        let mut current = self.last_seq.load(Ordering::Relaxed);
        loop {
            let next = now.max(current + 1);
            match self.last_seq.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }
}

fn encode_entry(header: &EntryHeader, body: &[u8]) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(header)?;
    let len = u32::try_from(json.len())
        .map_err(|_| TilegateError::Storage("entry header too large".into()))?;
    let mut out = Vec::with_capacity(HEADER_LEN_BYTES + json.len() + body.len());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&json);
    out.extend_from_slice(body);
    Ok(out)
}

fn corrupt(path: &Path) -> TilegateError {
    TilegateError::Storage(format!("corrupt cache entry {}", path.display()))
}

fn decode_entry(path: &Path, raw: &[u8]) -> Result<(EntryHeader, Vec<u8>)> {
    let (len, rest) = raw
        .split_first_chunk::<HEADER_LEN_BYTES>()
        .ok_or_else(|| corrupt(path))?;
    let len = u32::from_be_bytes(*len) as usize;
    if rest.len() < len {
        return Err(corrupt(path));
    }
    let (json, body) = rest.split_at(len);
    Ok((serde_json::from_slice(json)?, body.to_vec()))
}

/// Read only the header of an entry file.
async fn read_header(path: &Path) -> Result<Option<EntryHeader>> {
    let mut file = match fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut len = [0u8; HEADER_LEN_BYTES];
    file.read_exact(&mut len).await?;
    let mut json = vec![0u8; u32::from_be_bytes(len) as usize];
    file.read_exact(&mut json).await?;
    Ok(Some(serde_json::from_slice(&json)?))
}

#[async_trait]
impl CacheStorage for DiskStorage {
    fn name(&self) -> &str {
        "disk"
    }

    async fn partition_names(&self) -> Result<Vec<String>> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn open(&self, partition: &str) -> Result<()> {
        fs::create_dir_all(self.partition_dir(partition)?).await?;
        Ok(())
    }

    async fn delete_partition(&self, partition: &str) -> Result<bool> {
        match fs::remove_dir_all(self.partition_dir(partition)?).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, partition: &str, key: &RequestKey) -> Result<Option<Response>> {
        let path = self.entry_path(partition, key)?;
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let (header, body) = decode_entry(&path, &raw)?;
        Ok(Some(Response {
            status: header.status,
            status_text: header.status_text,
            headers: header.headers,
            body: body.into(),
        }))
    }

    async fn put(&self, partition: &str, key: &RequestKey, response: &Response) -> Result<()> {
        let path = self.entry_path(partition, key)?;
        self.open(partition).await?;

        let seq = self.next_seq();
        let header = EntryHeader {
            seq,
            key: key.clone(),
            status: response.status,
            status_text: response.status_text.clone(),
            headers: response.headers.clone(),
        };
        let contents = encode_entry(&header, &response.body)?;

        let tmp = path.with_extension(format!("{seq}.tmp"));
        if let Err(e) = fs::write(&tmp, &contents).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn delete(&self, partition: &str, key: &RequestKey) -> Result<bool> {
        match fs::remove_file(self.entry_path(partition, key)?).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self, partition: &str) -> Result<Vec<RequestKey>> {
        let mut dir = match fs::read_dir(self.partition_dir(partition)?).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut headers = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != ENTRY_EXT) {
                continue;
            }
            match read_header(&path).await {
                Ok(Some(header)) => headers.push(header),
                Ok(None) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable cache entry");
                }
            }
        }
        headers.sort_unstable_by_key(|header| header.seq);
        Ok(headers.into_iter().map(|header| header.key).collect())
    }
}
