//! Configuration loading.
//!
//! Configuration is read from TOML with the following resolution order:
//! 1. An explicit path (e.g. `tilegate --config <path>`)
//! 2. `~/.tilegate/config.toml` (user)
//! 3. `/etc/tilegate/config.toml` (system)
//!
//! If no file is found the defaults apply. Every field is optional.
//!
//! ```toml
//! [cache]
//! prefix = "aerafield"
//! version = "v2"
//! origin = "https://maps.example.org/"
//!
//! [tiles]
//! profile = "offline-durable"
//! max_entries = 2000
//! max_age_days = 7
//!
//! [storage]
//! backend = "disk"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::cache::policy::{
    DEFAULT_EVICT_FRACTION, DEFAULT_MAINTENANCE_RATE, DEFAULT_MAX_ENTRIES,
    DEFAULT_NETWORK_TIMEOUT,
};
use crate::cache::{PartitionNames, TileCachePolicy, TileProfile};
use crate::classify::ClassifierConfig;
use crate::network::{DEFAULT_TIMEOUT, DEFAULT_USER_AGENT, HttpFetcher};
use crate::storage::{CacheStorage, DiskStorage, MemoryStorage};
use crate::{Result, TilegateError};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub tiles: TilesConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Release naming and the application origin.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Partition name prefix (default: "tilegate").
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Release version; change it on every release (default: "v1").
    #[serde(default = "default_version")]
    pub version: String,
    /// Origin the app shell is served from (default: "http://localhost/").
    #[serde(default = "default_origin")]
    pub origin: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            version: default_version(),
            origin: default_origin(),
        }
    }
}

fn default_prefix() -> String {
    "tilegate".to_string()
}

fn default_version() -> String {
    "v1".to_string()
}

fn default_origin() -> String {
    "http://localhost/".to_string()
}

/// Tile routing and partition bounds.
#[derive(Debug, Clone, Deserialize)]
pub struct TilesConfig {
    #[serde(default)]
    pub profile: TileProfile,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_evict_fraction")]
    pub evict_fraction: f64,
    /// Age limit in days; 0 disables expiry. When unset, the offline-durable
    /// profile expires after 7 days and network-preferred never does.
    #[serde(default)]
    pub max_age_days: Option<u64>,
    #[serde(default = "default_maintenance_rate")]
    pub maintenance_rate: f64,
    #[serde(default = "default_network_timeout_secs")]
    pub network_timeout_secs: u64,
}

impl Default for TilesConfig {
    fn default() -> Self {
        Self {
            profile: TileProfile::default(),
            max_entries: default_max_entries(),
            evict_fraction: default_evict_fraction(),
            max_age_days: None,
            maintenance_rate: default_maintenance_rate(),
            network_timeout_secs: default_network_timeout_secs(),
        }
    }
}

fn default_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}

fn default_evict_fraction() -> f64 {
    DEFAULT_EVICT_FRACTION
}

fn default_maintenance_rate() -> f64 {
    DEFAULT_MAINTENANCE_RATE
}

fn default_network_timeout_secs() -> u64 {
    DEFAULT_NETWORK_TIMEOUT.as_secs()
}

impl TilesConfig {
    /// Build the tile policy these settings describe.
    pub fn policy(&self) -> TileCachePolicy {
        let base = match self.profile {
            TileProfile::OfflineDurable => TileCachePolicy::durable(),
            TileProfile::NetworkPreferred => TileCachePolicy::network_preferred(),
        };
        let max_age = match self.max_age_days {
            None => base.max_age,
            Some(0) => None,
            Some(days) => Some(Duration::from_secs(days * 24 * 60 * 60)),
        };
        base.max_entries(self.max_entries)
            .evict_fraction(self.evict_fraction)
            .max_age(max_age)
            .maintenance_rate(self.maintenance_rate)
            .network_timeout(Duration::from_secs(self.network_timeout_secs))
    }
}

/// Upstream HTTP client settings.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// Per-request timeout in seconds (default: 30).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

impl NetworkConfig {
    pub fn fetcher(&self) -> Result<HttpFetcher> {
        HttpFetcher::with_options(Duration::from_secs(self.timeout_secs), &self.user_agent)
    }
}

/// Which storage backend holds the partitions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    #[default]
    Disk,
}

/// Storage backend settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Root directory for the disk backend (default:
    /// `~/.cache/tilegate/partitions`).
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn open(&self) -> Arc<dyn CacheStorage> {
        match self.backend {
            StorageBackend::Memory => Arc::new(MemoryStorage::new()),
            StorageBackend::Disk => {
                let root = self.path.clone().unwrap_or_else(DiskStorage::default_root);
                Arc::new(DiskStorage::new(root))
            }
        }
    }
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// An explicit path must exist; otherwise missing files fall back to
    /// the defaults.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Parse a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| TilegateError::Configuration(format!("failed to parse config: {e}")))
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            TilegateError::Configuration(format!("failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            TilegateError::Configuration(format!("failed to parse config file {path:?}: {e}"))
        })
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(TilegateError::Configuration(format!(
                "config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".tilegate").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        let system_config = PathBuf::from("/etc/tilegate/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }

    /// The configured origin, parsed.
    pub fn origin(&self) -> Result<Url> {
        Ok(Url::parse(&self.cache.origin)?)
    }

    /// Partition names for the configured release.
    pub fn partition_names(&self) -> PartitionNames {
        PartitionNames::versioned(&self.cache.prefix, &self.cache.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.cache.prefix, "tilegate");
        assert_eq!(config.cache.version, "v1");
        assert_eq!(config.tiles.profile, TileProfile::OfflineDurable);
        assert_eq!(config.storage.backend, StorageBackend::Disk);
        assert_eq!(config.network.timeout_secs, 30);
        assert_eq!(config.tiles.policy(), TileCachePolicy::durable());
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
            [cache]
            prefix = "aerafield"
            version = "v2"
            origin = "https://maps.example.org/"

            [tiles]
            profile = "network-preferred"
            max_entries = 500
            network_timeout_secs = 2

            [classifier]
            auth_host = "auth.example.org"
            shell_assets = ["/"]

            [storage]
            backend = "memory"
        "#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(
            config.partition_names().all(),
            ["aerafield-shell-v2", "aerafield-data-v2", "aerafield-tiles-v2"]
        );
        let policy = config.tiles.policy();
        assert_eq!(policy.profile, TileProfile::NetworkPreferred);
        assert_eq!(policy.max_entries, 500);
        assert!(policy.max_age.is_none());
        assert_eq!(policy.network_timeout, Duration::from_secs(2));
        assert_eq!(config.classifier.auth_host, "auth.example.org");
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.origin().unwrap().host_str(), Some("maps.example.org"));
    }

    #[test]
    fn zero_max_age_disables_expiry() {
        let config = Config::from_toml("[tiles]\nmax_age_days = 0\n").unwrap();
        assert!(config.tiles.policy().max_age.is_none());
    }

    #[test]
    fn explicit_max_age_overrides_profile() {
        let toml = "[tiles]\nprofile = \"network-preferred\"\nmax_age_days = 3\n";
        let policy = Config::from_toml(toml).unwrap().tiles.policy();
        assert_eq!(policy.max_age, Some(Duration::from_secs(3 * 86_400)));
    }

    #[test]
    fn invalid_profile_is_a_configuration_error() {
        let err = Config::from_toml("[tiles]\nprofile = \"eager\"\n").unwrap_err();
        assert!(matches!(err, TilegateError::Configuration(_)));
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/tilegate.toml"))).unwrap_err();
        assert!(matches!(err, TilegateError::Configuration(_)));
    }

    #[test]
    fn load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[cache]\nversion = \"v9\"\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.cache.version, "v9");
    }
}
