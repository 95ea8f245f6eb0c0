//! Public types for the Tilegate API.

mod request;
mod response;
mod traffic;

pub use request::{Request, RequestKey, RequestMode};
pub use response::{CACHED_TIME_HEADER, Response, TRANSPARENT_PNG};
pub use traffic::{PartitionKind, TrafficClass};
