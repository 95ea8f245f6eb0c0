//! Traffic classes and partition kinds

use std::fmt;

use serde::{Deserialize, Serialize};

/// Category a request is classified into; selects the caching strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrafficClass {
    /// Map tile image.
    Tile,
    /// Structured-geometry data file.
    BulkData,
    /// Auth / session provider endpoint.
    Identity,
    /// Pre-registered static asset or top-level navigation.
    Shell,
    Other,
}

impl TrafficClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficClass::Tile => "tile",
            TrafficClass::BulkData => "bulk-data",
            TrafficClass::Identity => "identity",
            TrafficClass::Shell => "shell",
            TrafficClass::Other => "other",
        }
    }
}

impl fmt::Display for TrafficClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three storage partitions owned by the cache manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionKind {
    Shell,
    Data,
    Tile,
}

impl PartitionKind {
    /// All kinds, in lookup order for cross-partition matching.
    pub const ALL: [PartitionKind; 3] = [PartitionKind::Shell, PartitionKind::Data, PartitionKind::Tile];

    pub fn as_str(&self) -> &'static str {
        match self {
            PartitionKind::Shell => "shell",
            PartitionKind::Data => "data",
            PartitionKind::Tile => "tile",
        }
    }
}

impl fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
