//! reqwest-backed fetcher.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::Fetcher;
use crate::types::{Request, Response};
use crate::{Result, TilegateError};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default `User-Agent` header.
pub const DEFAULT_USER_AGENT: &str = concat!("tilegate/", env!("CARGO_PKG_VERSION"));

/// Fetches over HTTP(S) with a shared connection pool.
#[derive(Clone)]
pub struct HttpFetcher {
    http: Client,
    timeout: Duration,
}

impl HttpFetcher {
    /// Build a client with the default timeout and user agent.
    pub fn new() -> Result<Self> {
        Self::with_options(DEFAULT_TIMEOUT, DEFAULT_USER_AGENT)
    }

    /// Build a client with a custom timeout and user agent.
    pub fn with_options(timeout: Duration, user_agent: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| TilegateError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, timeout })
    }

    /// Wrap an existing client. `timeout` is only used for error reporting.
    pub fn with_client(http: Client, timeout: Duration) -> Self {
        Self { http, timeout }
    }

    fn map_error(&self, e: reqwest::Error) -> TilegateError {
        if e.is_timeout() {
            TilegateError::Timeout(self.timeout)
        } else {
            TilegateError::Http(e.to_string())
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, request: &Request) -> Result<Response> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| TilegateError::InvalidInput(format!("invalid method {}", request.method)))?;

        let mut builder = self.http.request(method, request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let upstream = builder.send().await.map_err(|e| self.map_error(e))?;
        let status = upstream.status();

        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in upstream.headers() {
            let Ok(value) = value.to_str() else {
                continue;
            };
            headers
                .entry(name.as_str().to_ascii_lowercase())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        }

        let body = upstream.bytes().await.map_err(|e| self.map_error(e))?;
        debug!(url = %request.url, status = status.as_u16(), bytes = body.len(), "fetched");

        Ok(Response {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}
