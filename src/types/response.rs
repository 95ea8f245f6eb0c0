//! Response snapshot type

use std::collections::BTreeMap;

use bytes::Bytes;

/// Header carrying the epoch-millisecond time a tile was written.
///
/// Only added when the tile policy has an expiry; used purely for age
/// computation and never sent upstream.
pub const CACHED_TIME_HEADER: &str = "cached-time";

/// Well-known 1×1 transparent PNG served when a tile cannot be produced.
pub const TRANSPARENT_PNG: [u8; 67] = [
    137, 80, 78, 71, 13, 10, 26, 10, 0, 0, 0, 13, 73, 72, 68, 82, 0, 0, 0, 1, 0, 0, 0, 1, 8, 6, 0,
    0, 0, 31, 21, 196, 137, 0, 0, 0, 11, 73, 68, 65, 84, 120, 156, 99, 248, 15, 0, 1, 0, 1, 0, 24,
    221, 141, 219, 0, 0, 0, 0, 73, 69, 78, 68, 174, 66, 96, 130,
];

/// Immutable snapshot of an HTTP response.
///
/// This is both what the network layer produces and what partitions
/// store. Updating a cached entry means putting a new snapshot under the
/// same key; snapshots themselves are never edited in place (see
/// [`with_header`](Self::with_header)).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub status_text: String,
    /// Header names are stored lowercase.
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl Response {
    /// Create a response with the canonical reason phrase for `status`.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            status_text: reason_phrase(status).to_string(),
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    /// A `200 OK` with the given body.
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(200, body)
    }

    /// The transparent placeholder tile: `200`, `image/png`, not cacheable.
    pub fn transparent_tile() -> Self {
        Self::ok(Bytes::from_static(&TRANSPARENT_PNG))
            .header("content-type", "image/png")
            .header("cache-control", "no-cache")
    }

    /// Builder-style header setter (name is lowercased).
    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// A new snapshot equal to this one plus one header.
    pub fn with_header(&self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.clone().header(name, value)
    }

    /// Case-insensitive header lookup.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Any 2xx status.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The epoch-millisecond write time, if this snapshot carries one.
    pub fn cached_time(&self) -> Option<u64> {
        self.header_value(CACHED_TIME_HEADER)?.trim().parse().ok()
    }
}

/// Canonical reason phrase for the statuses this layer produces or
/// commonly relays.
fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "",
    }
}
