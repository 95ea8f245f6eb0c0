//! Intercepted request and cache key types

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::Result;

/// How the host issued a request.
///
/// Only [`RequestMode::Navigate`] changes routing: a failed top-level
/// navigation is answered with the cached root document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    /// Top-level document load.
    Navigate,
    #[default]
    Cors,
    NoCors,
    SameOrigin,
}

/// An outgoing request seen by the interceptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub url: Url,
    pub mode: RequestMode,
    /// Header names are stored lowercase.
    pub headers: BTreeMap<String, String>,
    pub body: Option<Bytes>,
}

impl Request {
    /// Create a request with an explicit method. The method is uppercased.
    pub fn new(method: impl AsRef<str>, url: Url) -> Self {
        Self {
            method: method.as_ref().to_ascii_uppercase(),
            url,
            mode: RequestMode::default(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// Parse `url` and build a `GET` request.
    pub fn get(url: &str) -> Result<Self> {
        Ok(Self::new("GET", Url::parse(url)?))
    }

    /// Parse `url` and build a request with the given method.
    pub fn with_method(method: impl AsRef<str>, url: &str) -> Result<Self> {
        Ok(Self::new(method, Url::parse(url)?))
    }

    /// Mark this request as a top-level navigation.
    pub fn navigate(mut self) -> Self {
        self.mode = RequestMode::Navigate;
        self
    }

    /// Set the request mode.
    pub fn mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    /// Add a header (name is lowercased).
    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Attach a request body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    /// The key this request addresses in a partition.
    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.method, &self.url)
    }
}

/// Effective cache key: method plus normalized absolute URL.
///
/// Normalization is what [`Url`] parsing already does (scheme and host
/// lowercased, default port dropped, path dot-segments resolved) plus
/// removal of the fragment, which never reaches the network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey {
    method: String,
    url: String,
}

impl RequestKey {
    pub fn new(method: &str, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: method.to_ascii_uppercase(),
            url: url.into(),
        }
    }

    /// Key for a `GET` of `url`.
    pub fn get(url: &Url) -> Self {
        Self::new("GET", url)
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}
