//! Tilegate: router, lifecycle and control channel behind one handle.

use async_trait::async_trait;
use tokio::sync::watch;
use url::Url;

use super::TilegateBuilder;
use crate::Result;
use crate::cache::policy::now_millis;
use crate::cache::{CacheManager, MaintenanceReport, SweepReport};
use crate::classify::Classifier;
use crate::control::{ControlChannel, ControlHandle, ControlReply, ControlRequest};
use crate::lifecycle::{InstallReport, LifecycleManager, LifecycleState};
use crate::router::{FetchRouter, Served};
use crate::traits::RequestInterceptor;
use crate::types::Request;

/// One release of the caching layer.
///
/// Construct with [`Tilegate::builder`]. All parts share one
/// [`CacheManager`].
#[derive(Debug)]
pub struct Tilegate {
    pub(super) router: FetchRouter,
    pub(super) lifecycle: LifecycleManager,
    pub(super) control: ControlChannel,
}

impl Tilegate {
    pub fn builder() -> TilegateBuilder {
        TilegateBuilder::new()
    }

    pub fn router(&self) -> &FetchRouter {
        &self.router
    }

    pub fn cache(&self) -> &CacheManager {
        self.router.cache()
    }

    pub fn classifier(&self) -> &Classifier {
        self.router.classifier()
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.lifecycle.subscribe()
    }

    /// Serve control requests on a background task.
    pub fn control_handle(&self) -> ControlHandle {
        self.control.clone().spawn()
    }

    /// Build a request, resolving relative URLs against the origin.
    pub fn request(&self, method: &str, url: &str) -> Result<Request> {
        let url = match Url::parse(url) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => self.classifier().origin().join(url)?,
            Err(e) => return Err(e.into()),
        };
        Ok(Request::new(method, url))
    }

    /// Run a tile maintenance pass now, whatever the sampling rate.
    pub async fn maintain_tiles(&self) -> Result<MaintenanceReport> {
        self.cache()
            .maintain_tiles(self.router.policy(), now_millis())
            .await
    }

    /// Wait for outstanding background cache work.
    pub async fn settle(&self) {
        self.router.settle().await
    }
}

#[async_trait]
impl RequestInterceptor for Tilegate {
    async fn install(&self) -> Result<InstallReport> {
        self.lifecycle.install().await
    }

    async fn activate(&self) -> SweepReport {
        self.lifecycle.activate().await
    }

    async fn fetch(&self, request: &Request) -> Result<Served> {
        self.router.handle(request).await
    }

    async fn message(&self, request: ControlRequest) -> ControlReply {
        self.control.handle(request).await
    }
}
