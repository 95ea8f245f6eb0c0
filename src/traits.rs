//! Core RequestInterceptor trait

use async_trait::async_trait;

use crate::{ControlReply, ControlRequest, InstallReport, Request, Result, Served, SweepReport};

/// The surface a host harness drives.
///
/// A host forwards its lifecycle events and intercepted requests to these
/// methods; nothing here depends on a particular host environment.
#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    /// A new release is being installed.
    async fn install(&self) -> Result<InstallReport>;

    /// The installed release is taking over.
    async fn activate(&self) -> SweepReport;

    /// An outgoing request was intercepted.
    async fn fetch(&self, request: &Request) -> Result<Served>;

    /// A control message arrived. Always answered.
    async fn message(&self, request: ControlRequest) -> ControlReply;
}
