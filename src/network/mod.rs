//! Upstream network access.
//!
//! The router never talks to reqwest directly; it goes through [`Fetcher`]
//! so tests can script the network (offline, slow, failing) and hosts can
//! plug in their own transport.

mod http;

pub use http::{DEFAULT_TIMEOUT, DEFAULT_USER_AGENT, HttpFetcher};

use async_trait::async_trait;

use crate::Result;
use crate::types::{Request, Response};

/// Performs one network round trip.
///
/// A response with any status code, including 4xx and 5xx, is `Ok`.
/// `Err` means no response arrived at all: connection failure, DNS,
/// timeout, or a body that could not be read.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetcher name for logs.
    fn name(&self) -> &str;

    async fn fetch(&self, request: &Request) -> Result<Response>;
}
