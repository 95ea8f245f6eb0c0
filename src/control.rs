//! Control channel: clear caches and report cache contents.
//!
//! Every request gets exactly one [`ControlReply`]. Failures inside an
//! operation become `success: false` replies rather than errors, so a
//! caller awaiting a reply is never left hanging.
//!
//! ```rust
//! # use tilegate::ControlRequest;
//! let request: ControlRequest = serde_json::from_str(r#"{"type":"GET_CACHE_INFO"}"#).unwrap();
//! assert_eq!(request, ControlRequest::GetCacheInfo);
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::cache::{CacheManager, DEFAULT_INFO_SAMPLE, PartitionInfo};
use crate::types::PartitionKind;
use crate::{Result, TilegateError};

/// Queue depth of a spawned control channel.
const CHANNEL_CAPACITY: usize = 32;

/// A control operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlRequest {
    /// Delete every partition, whatever its version.
    ClearAllCaches,
    /// Delete the tile partition only.
    ClearTilesCache,
    /// Entry count and sample URLs per partition.
    GetCacheInfo,
}

/// Reply to a [`ControlRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_info: Option<BTreeMap<String, PartitionInfo>>,
}

impl ControlReply {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            cache_info: None,
        }
    }

    pub fn info(cache_info: BTreeMap<String, PartitionInfo>) -> Self {
        Self {
            success: true,
            message: None,
            cache_info: Some(cache_info),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            cache_info: None,
        }
    }
}

/// Executes control requests against a [`CacheManager`].
#[derive(Debug, Clone)]
pub struct ControlChannel {
    cache: CacheManager,
}

impl ControlChannel {
    pub fn new(cache: CacheManager) -> Self {
        Self { cache }
    }

    /// Run one request. Never fails.
    pub async fn handle(&self, request: ControlRequest) -> ControlReply {
        debug!(?request, "control request");
        match self.execute(request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(?request, error = %e, "control request failed");
                ControlReply::failure(e.to_string())
            }
        }
    }

    /// Run one request in its JSON wire form and return the JSON reply.
    pub async fn handle_json(&self, raw: &str) -> String {
        let reply = match serde_json::from_str::<ControlRequest>(raw) {
            Ok(request) => self.handle(request).await,
            Err(e) => ControlReply::failure(format!("invalid control message: {e}")),
        };
        serde_json::to_string(&reply).unwrap_or_else(|e| {
            format!(r#"{{"success":false,"message":"failed to encode reply: {e}"}}"#)
        })
    }

    async fn execute(&self, request: ControlRequest) -> Result<ControlReply> {
        match request {
            ControlRequest::ClearAllCaches => {
                let deleted = self.cache.clear_all().await?;
                Ok(ControlReply::ok(format!("cleared {deleted} caches")))
            }
            ControlRequest::ClearTilesCache => {
                self.cache.clear(PartitionKind::Tile).await?;
                Ok(ControlReply::ok("tile cache cleared"))
            }
            ControlRequest::GetCacheInfo => {
                Ok(ControlReply::info(self.cache.info(DEFAULT_INFO_SAMPLE).await?))
            }
        }
    }

    /// Serve requests on a background task.
    ///
    /// The task stops once every [`ControlHandle`] is dropped.
    pub fn spawn(self) -> ControlHandle {
        let (tx, mut rx) = mpsc::channel::<Envelope>(CHANNEL_CAPACITY);
        tokio::spawn(async move {
            while let Some((request, reply_to)) = rx.recv().await {
                let reply = self.handle(request).await;
                // The caller may have stopped waiting.
                let _ = reply_to.send(reply);
            }
        });
        ControlHandle { tx }
    }
}

type Envelope = (ControlRequest, oneshot::Sender<ControlReply>);

/// Sending side of a spawned [`ControlChannel`].
#[derive(Debug, Clone)]
pub struct ControlHandle {
    tx: mpsc::Sender<Envelope>,
}

impl ControlHandle {
    /// Send a request and wait for its reply.
    pub async fn send(&self, request: ControlRequest) -> Result<ControlReply> {
        let (reply_to, reply) = oneshot::channel();
        self.tx
            .send((request, reply_to))
            .await
            .map_err(|_| TilegateError::ChannelClosed)?;
        reply.await.map_err(|_| TilegateError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names() {
        let json = serde_json::to_string(&ControlRequest::ClearTilesCache).unwrap();
        assert_eq!(json, r#"{"type":"CLEAR_TILES_CACHE"}"#);
        let parsed: ControlRequest = serde_json::from_str(r#"{"type":"CLEAR_ALL_CACHES"}"#).unwrap();
        assert_eq!(parsed, ControlRequest::ClearAllCaches);
    }

    #[test]
    fn info_reply_uses_camel_case() {
        let mut info = BTreeMap::new();
        info.insert(
            "app-tiles-v1".to_string(),
            PartitionInfo {
                entry_count: 1,
                urls: vec!["https://t.example/0/0/0.png".into()],
            },
        );
        let json = serde_json::to_value(ControlReply::info(info)).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["cacheInfo"]["app-tiles-v1"]["entryCount"], 1);
        assert!(json.get("message").is_none());
    }

    #[test]
    fn failure_reply_has_message() {
        let json = serde_json::to_value(ControlReply::failure("boom")).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "boom");
    }
}
