//! Request classification.
//!
//! [`Classifier`] maps a request to a [`TrafficClass`]. It is pure and
//! total: every input gets a class, unmatched requests land in
//! [`TrafficClass::Other`].
//!
//! # Evaluation order
//!
//! Classes are checked in a fixed order and the first match wins:
//!
//! 1. `tile`: the patterns in [`TILE_PATTERNS`], in table order
//! 2. `bulk-data`: the configured data-file pattern, if any
//! 3. `identity`: host equals the auth domain or is a subdomain of it
//! 4. `shell`: same-origin path listed in the shell manifest, or a
//!    top-level navigation
//! 5. `other`

use regex::Regex;
use serde::Deserialize;
use url::Url;

use crate::types::{Request, TrafficClass};
use crate::{Result, TilegateError};

/// Map-tile URL shapes, checked in order.
///
/// Vendor REST endpoints first, then OSM-style hosts, then the generic
/// `/{z}/{y}/{x}.{png|jpg|jpeg}` suffix (optionally query-suffixed).
pub const TILE_PATTERNS: &[(&str, &str)] = &[
    (
        "arcgis-server",
        r"^https://server\.arcgisonline\.com/ArcGIS/rest/services/.*/MapServer/tile/",
    ),
    (
        "arcgis-services",
        r"^https://services\.arcgisonline\.com/ArcGIS/rest/services/.*/MapServer/tile/",
    ),
    (
        "arcgis-any",
        r"^https://.*\.arcgisonline\.com/.*/MapServer/tile/",
    ),
    (
        "mapbox-v4",
        r"^https://api\.mapbox\.com/v4/.*\.(png|jpg|jpeg)(\?.*)?$",
    ),
    (
        "mapbox-tiles",
        r"^https://.*\.tiles\.mapbox\.com/.*\.(png|jpg|jpeg)(\?.*)?$",
    ),
    (
        "openstreetmap",
        r"^https://.*\.tile\.openstreetmap\.org/.*\.(png|jpg|jpeg)$",
    ),
    (
        "tms-nested",
        r"^https://.*\.(png|jpg|jpeg).*/\d+/\d+/\d+\.(png|jpg|jpeg)(\?.*)?$",
    ),
    ("zxy", r"/\d+/\d+/\d+\.(png|jpg|jpeg)(\?.*)?$"),
];

/// Default structured-geometry data pattern.
pub const DEFAULT_DATA_PATTERN: &str = r"^.*/data/.*\.geojson$";

/// Default auth-provider domain.
pub const DEFAULT_AUTH_HOST: &str = "supabase.co";

/// Classifier settings.
///
/// ```toml
/// [classifier]
/// auth_host = "supabase.co"
/// data_pattern = '^.*/data/.*\.geojson$'
/// shell_assets = ["/", "/manifest.json"]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    /// Requests to this host (or its subdomains) are identity traffic.
    #[serde(default = "default_auth_host")]
    pub auth_host: String,
    /// Regex for bulk-data files. `None` or an empty string disables the
    /// bulk-data class.
    #[serde(default = "default_data_pattern")]
    pub data_pattern: Option<String>,
    /// Static application-shell paths, relative to the origin.
    #[serde(default = "default_shell_assets")]
    pub shell_assets: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            auth_host: default_auth_host(),
            data_pattern: default_data_pattern(),
            shell_assets: default_shell_assets(),
        }
    }
}

impl ClassifierConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the auth-provider domain.
    pub fn auth_host(mut self, host: impl Into<String>) -> Self {
        self.auth_host = host.into();
        self
    }

    /// Set (or clear) the bulk-data pattern.
    pub fn data_pattern(mut self, pattern: Option<String>) -> Self {
        self.data_pattern = pattern;
        self
    }

    /// Replace the shell manifest.
    pub fn shell_assets<I, S>(mut self, assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shell_assets = assets.into_iter().map(Into::into).collect();
        self
    }
}

fn default_auth_host() -> String {
    DEFAULT_AUTH_HOST.to_string()
}

fn default_data_pattern() -> Option<String> {
    Some(DEFAULT_DATA_PATTERN.to_string())
}

fn default_shell_assets() -> Vec<String> {
    ["/", "/manifest.json", "/favicon.svg", "/icon.svg"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Compiled classifier.
#[derive(Debug, Clone)]
pub struct Classifier {
    tiles: Vec<(&'static str, Regex)>,
    data: Option<Regex>,
    auth_host: String,
    origin: Url,
    shell_paths: Vec<String>,
}

impl Classifier {
    /// Compile a classifier for the application served from `origin`.
    pub fn new(config: &ClassifierConfig, origin: &Url) -> Result<Self> {
        let tiles = TILE_PATTERNS
            .iter()
            .map(|(name, pattern)| Ok((*name, compile(pattern)?)))
            .collect::<Result<Vec<_>>>()?;
        let data = config
            .data_pattern
            .as_deref()
            .filter(|pattern| !pattern.is_empty())
            .map(compile)
            .transpose()?;

        Ok(Self {
            tiles,
            data,
            auth_host: config.auth_host.trim_start_matches('.').to_ascii_lowercase(),
            origin: origin.clone(),
            shell_paths: config.shell_assets.clone(),
        })
    }

    /// Classify by URL and method alone.
    ///
    /// Navigation cannot be detected from these two inputs; use
    /// [`classify_request`](Self::classify_request) when the request mode
    /// is known.
    pub fn classify(&self, url: &str, method: &str) -> TrafficClass {
        match Url::parse(url) {
            Ok(parsed) => self.classify_url(&parsed, method, false),
            // Unparseable URLs can still match the textual tile/data shapes.
            Err(_) => self.classify_text(url),
        }
    }

    /// Classify an intercepted request.
    pub fn classify_request(&self, request: &Request) -> TrafficClass {
        self.classify_url(&request.url, &request.method, request.is_navigation())
    }

    /// Name of the first tile pattern matching `url`, if any.
    pub fn tile_pattern(&self, url: &str) -> Option<&'static str> {
        self.tiles
            .iter()
            .find(|(_, re)| re.is_match(url))
            .map(|(name, _)| *name)
    }

    /// The shell manifest resolved against the origin.
    pub fn shell_urls(&self) -> Vec<Url> {
        self.shell_paths
            .iter()
            .filter(|path| !path.starts_with("http"))
            .filter_map(|path| self.origin.join(path).ok())
            .collect()
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    fn classify_url(&self, url: &Url, _method: &str, navigation: bool) -> TrafficClass {
        let text = url.as_str();
        if let Some(class) = self.match_text(text) {
            return class;
        }
        if self.is_auth_host(url) {
            return TrafficClass::Identity;
        }
        if navigation || self.is_shell_asset(url) {
            return TrafficClass::Shell;
        }
        TrafficClass::Other
    }

    fn classify_text(&self, text: &str) -> TrafficClass {
        self.match_text(text).unwrap_or(TrafficClass::Other)
    }

    fn match_text(&self, text: &str) -> Option<TrafficClass> {
        if self.tile_pattern(text).is_some() {
            return Some(TrafficClass::Tile);
        }
        if self.data.as_ref().is_some_and(|re| re.is_match(text)) {
            return Some(TrafficClass::BulkData);
        }
        None
    }

    fn is_auth_host(&self, url: &Url) -> bool {
        if self.auth_host.is_empty() {
            return false;
        }
        url.host_str().is_some_and(|host| {
            let host = host.to_ascii_lowercase();
            host == self.auth_host
                || host
                    .strip_suffix(self.auth_host.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    fn is_shell_asset(&self, url: &Url) -> bool {
        url.origin() == self.origin.origin()
            && self.shell_paths.iter().any(|path| path == url.path())
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| TilegateError::Configuration(format!("invalid pattern {pattern:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        let origin = Url::parse("https://field.example.com").unwrap();
        Classifier::new(&ClassifierConfig::default(), &origin).unwrap()
    }

    #[test]
    fn esri_tiles() {
        let c = classifier();
        let url = "https://server.arcgisonline.com/ArcGIS/rest/services/World_Imagery/MapServer/tile/5/10/12";
        assert_eq!(c.classify(url, "GET"), TrafficClass::Tile);
        assert_eq!(c.tile_pattern(url), Some("arcgis-server"));
    }

    #[test]
    fn osm_tiles() {
        let c = classifier();
        assert_eq!(
            c.classify("https://a.tile.openstreetmap.org/3/4/2.png", "GET"),
            TrafficClass::Tile
        );
    }

    #[test]
    fn mapbox_tiles_with_query() {
        let c = classifier();
        assert_eq!(
            c.classify(
                "https://api.mapbox.com/v4/mapbox.satellite/1/0/0.jpg?access_token=pk",
                "GET"
            ),
            TrafficClass::Tile
        );
    }

    #[test]
    fn generic_zxy_tiles() {
        let c = classifier();
        let url = "https://tiles.example.org/base/12/1205/1539.jpeg";
        assert_eq!(c.classify(url, "GET"), TrafficClass::Tile);
        assert_eq!(c.tile_pattern(url), Some("zxy"));
    }

    #[test]
    fn first_pattern_wins() {
        let c = classifier();
        // Matches both arcgis-server and arcgis-any
        let url = "https://server.arcgisonline.com/ArcGIS/rest/services/X/MapServer/tile/1/2/3";
        assert_eq!(c.tile_pattern(url), Some("arcgis-server"));
    }

    #[test]
    fn geojson_is_bulk_data() {
        let c = classifier();
        assert_eq!(
            c.classify("https://field.example.com/data/parcels.geojson", "GET"),
            TrafficClass::BulkData
        );
    }

    #[test]
    fn bulk_data_disabled_falls_to_other() {
        let origin = Url::parse("https://field.example.com").unwrap();
        let c = Classifier::new(&ClassifierConfig::new().data_pattern(None), &origin).unwrap();
        assert_eq!(
            c.classify("https://field.example.com/data/parcels.geojson", "GET"),
            TrafficClass::Other
        );
    }

    #[test]
    fn auth_host_and_subdomains() {
        let c = classifier();
        assert_eq!(
            c.classify("https://abcd.supabase.co/auth/v1/token", "POST"),
            TrafficClass::Identity
        );
        assert_eq!(
            c.classify("https://supabase.co/auth/v1/user", "GET"),
            TrafficClass::Identity
        );
        assert_eq!(
            c.classify("https://notsupabase.co/auth", "GET"),
            TrafficClass::Other
        );
    }

    #[test]
    fn shell_assets_require_same_origin() {
        let c = classifier();
        assert_eq!(
            c.classify("https://field.example.com/manifest.json", "GET"),
            TrafficClass::Shell
        );
        assert_eq!(
            c.classify("https://other.example.com/manifest.json", "GET"),
            TrafficClass::Other
        );
    }

    #[test]
    fn navigation_is_shell() {
        let c = classifier();
        let req = Request::get("https://field.example.com/layers/42")
            .unwrap()
            .navigate();
        assert_eq!(c.classify_request(&req), TrafficClass::Shell);
    }

    #[test]
    fn unmatched_is_other() {
        let c = classifier();
        assert_eq!(
            c.classify("https://field.example.com/assets/app.js", "GET"),
            TrafficClass::Other
        );
        assert_eq!(c.classify("not a url", "GET"), TrafficClass::Other);
    }

    #[test]
    fn shell_urls_resolve_against_origin() {
        let c = classifier();
        let urls: Vec<_> = c.shell_urls().into_iter().map(String::from).collect();
        assert_eq!(urls[0], "https://field.example.com/");
        assert!(urls.contains(&"https://field.example.com/manifest.json".to_string()));
    }

    #[test]
    fn invalid_pattern_is_configuration_error() {
        let origin = Url::parse("https://field.example.com").unwrap();
        let config = ClassifierConfig::new().data_pattern(Some("(".into()));
        assert!(matches!(
            Classifier::new(&config, &origin),
            Err(TilegateError::Configuration(_))
        ));
    }
}
