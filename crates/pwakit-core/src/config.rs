//! Worker configuration

use pwakit_common::{PwaError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::types::{CacheKind, CacheVersion};

/// Configuration for one worker revision.
///
/// Loaded once when the worker is built; nothing reads it again at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PwaConfig {
    /// Version tag prefixed to every cache name.
    pub cache_version: String,

    /// Origin the worker is registered on (scheme, host, port).
    pub origin: String,

    /// Offline fallback page served to failed navigations.
    pub offline_url: String,

    /// App shell URLs stored at install, in order.
    pub precache_urls: Vec<String>,

    /// Path prefix of static assets.
    pub static_prefix: String,

    /// File extensions routed to the image cache (lowercase, no dot).
    pub media_extensions: Vec<String>,

    /// Attempts per precache URL during install
    pub install_attempts: u32,

    /// Give up on the network after this long in network-first routes
    pub network_timeout_ms: Option<u64>,

    /// Per-cache limits
    pub cache_limits: CacheLimitsConfig,

    /// Page-side settings
    pub page: PageConfig,
}

/// Limits for a single named cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheLimits {
    /// Least recently used entries are evicted beyond this count.
    pub max_entries: Option<usize>,

    /// Writes with a larger body are refused.
    pub max_entry_bytes: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheLimitsConfig {
    pub shell: CacheLimits,
    pub runtime: CacheLimits,
    pub images: CacheLimits,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PageConfig {
    /// How long a dismissed install prompt stays hidden, in seconds
    pub install_dismiss_window_secs: u64,

    /// How long the "Back online" pill stays visible, in milliseconds
    pub back_online_hide_ms: u64,
}

pub const DEFAULT_CACHE_VERSION: &str = "ggenre-pwa-v20260227";
pub const DEFAULT_OFFLINE_URL: &str = "/offline/";

impl Default for PwaConfig {
    fn default() -> Self {
        let precache_urls = [
            "/",
            "/manifest.webmanifest",
            "/content/list/",
            "/users/artists/",
            "/content/live/",
            DEFAULT_OFFLINE_URL,
            "/static/css/styles.css",
            "/static/css/app-shell.css",
            "/static/js/custom.js",
            "/static/js/pages/base-shell.js",
            "/static/img/favicon.png",
            "/static/img/logo.png",
            "/static/img/pwa/icon-192.png",
            "/static/img/pwa/icon-512.png",
        ];

        let media_extensions = [
            "png", "jpg", "jpeg", "webp", "gif", "svg", "ico", "mp4", "webm", "mp3", "wav",
        ];

        Self {
            cache_version: DEFAULT_CACHE_VERSION.to_string(),
            origin: "http://localhost:8000".to_string(),
            offline_url: DEFAULT_OFFLINE_URL.to_string(),
            precache_urls: precache_urls.iter().map(|s| s.to_string()).collect(),
            static_prefix: "/static/".to_string(),
            media_extensions: media_extensions.iter().map(|s| s.to_string()).collect(),
            install_attempts: 2,
            network_timeout_ms: None,
            cache_limits: CacheLimitsConfig::default(),
            page: PageConfig::default(),
        }
    }
}

impl Default for CacheLimitsConfig {
    fn default() -> Self {
        Self {
            shell: CacheLimits::default(),
            runtime: CacheLimits {
                max_entries: Some(200),
                max_entry_bytes: None,
            },
            images: CacheLimits {
                max_entries: Some(120),
                max_entry_bytes: Some(25 * 1024 * 1024),
            },
        }
    }
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            install_dismiss_window_secs: 60 * 60 * 24 * 5, // 5 days
            back_online_hide_ms: 2200,
        }
    }
}

impl PageConfig {
    pub fn install_dismiss_window(&self) -> Duration {
        Duration::from_secs(self.install_dismiss_window_secs)
    }

    pub fn back_online_hide(&self) -> Duration {
        Duration::from_millis(self.back_online_hide_ms)
    }
}

impl PwaConfig {
    /// Parse a JSON config; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: PwaConfig = serde_json::from_str(json)
            .map_err(|e| PwaError::config_with_source("invalid config JSON", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading config");
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn version(&self) -> CacheVersion {
        CacheVersion::new(self.cache_version.clone())
    }

    pub fn cache_name(&self, kind: CacheKind) -> String {
        self.version().cache_name(kind)
    }

    pub fn limits(&self, kind: CacheKind) -> &CacheLimits {
        match kind {
            CacheKind::Shell => &self.cache_limits.shell,
            CacheKind::Runtime => &self.cache_limits.runtime,
            CacheKind::Images => &self.cache_limits.images,
        }
    }

    pub fn network_timeout(&self) -> Option<Duration> {
        self.network_timeout_ms.map(Duration::from_millis)
    }

    pub fn origin_url(&self) -> Result<Url> {
        Url::parse(&self.origin)
            .map_err(|e| PwaError::config_with_source(format!("bad origin {}", self.origin), e))
    }

    /// Resolve a site-relative URL against the origin.
    pub fn resolve(&self, path: &str) -> Result<Url> {
        Ok(self.origin_url()?.join(path)?)
    }

    pub fn offline_page(&self) -> Result<Url> {
        self.resolve(&self.offline_url)
    }

    /// Whether `path` has one of the configured media extensions.
    pub fn is_media_path(&self, path: &str) -> bool {
        let file = path.rsplit('/').next().unwrap_or(path);
        match file.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() => self
                .media_extensions
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext)),
            _ => false,
        }
    }

    /// Check the invariants the worker relies on.
    pub fn validate(&self) -> Result<()> {
        if self.cache_version.trim().is_empty() {
            return Err(PwaError::config("cache_version must not be empty"));
        }

        if !self.static_prefix.starts_with('/') || !self.static_prefix.ends_with('/') {
            return Err(PwaError::config(format!(
                "static_prefix must start and end with '/': {}",
                self.static_prefix
            )));
        }

        let origin = self.origin_url()?;
        if origin.cannot_be_a_base() || !matches!(origin.scheme(), "http" | "https") {
            return Err(PwaError::config(format!(
                "origin must be an http(s) URL: {}",
                self.origin
            )));
        }

        if !self.precache_urls.iter().any(|u| u == &self.offline_url) {
            return Err(PwaError::config(format!(
                "offline_url {} is not in precache_urls",
                self.offline_url
            )));
        }

        for kind in CacheKind::ALL {
            let limits = self.limits(kind);
            if limits.max_entries == Some(0) || limits.max_entry_bytes == Some(0) {
                return Err(PwaError::config(format!(
                    "cache limits for {kind} must be unset or greater than 0"
                )));
            }
        }

        for entry in &self.precache_urls {
            let url = origin.join(entry)?;
            if url.origin() != origin.origin() {
                return Err(PwaError::config(format!(
                    "precache URL {entry} is not on origin {}",
                    self.origin
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = PwaConfig::default();
        config.validate().unwrap();
        assert_eq!(config.precache_urls.len(), 14);
        assert_eq!(config.cache_name(CacheKind::Shell), "ggenre-pwa-v20260227-shell");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = PwaConfig::from_json_str(
            r#"{ "cache_version": "v2", "origin": "https://example.com",
                 "precache_urls": ["/", "/offline/"] }"#,
        )
        .unwrap();
        assert_eq!(config.cache_version, "v2");
        assert_eq!(config.static_prefix, "/static/");
        assert_eq!(config.page.back_online_hide_ms, 2200);
    }

    #[test]
    fn test_offline_url_must_be_precached() {
        let result = PwaConfig::from_json_str(r#"{ "precache_urls": ["/"] }"#);
        assert!(matches!(result, Err(PwaError::Config { .. })));
    }

    #[test]
    fn test_cross_origin_precache_rejected() {
        let mut config = PwaConfig::default();
        config.precache_urls.push("https://cdn.example.net/lib.js".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_static_prefix_rejected() {
        let config = PwaConfig {
            static_prefix: "static".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_media_paths() {
        let config = PwaConfig::default();
        assert!(config.is_media_path("/media/covers/a.PNG"));
        assert!(config.is_media_path("/media/clip.webm"));
        assert!(!config.is_media_path("/media/clip.webm/"));
        assert!(!config.is_media_path("/content/list/"));
        assert!(!config.is_media_path("/content.v2/list"));
        assert!(!config.is_media_path("/archive.tar"));
    }

    #[test]
    fn test_zero_cache_limits_rejected() {
        let mut config = PwaConfig::default();
        config.cache_limits.images.max_entries = Some(0);
        assert!(config.validate().is_err());

        let mut config = PwaConfig::default();
        config.cache_limits.runtime.max_entry_bytes = Some(0);
        assert!(config.validate().is_err());

        let mut config = PwaConfig::default();
        config.cache_limits.images.max_entries = Some(1);
        config.validate().unwrap();
    }

    #[test]
    fn test_resolve_offline_page() {
        let config = PwaConfig::default();
        assert_eq!(
            config.offline_page().unwrap().as_str(),
            "http://localhost:8000/offline/"
        );
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "cache_version": "v9", "network_timeout_ms": 1500,
                  "precache_urls": ["/offline/"] }}"#
        )
        .unwrap();

        let config = PwaConfig::from_file(file.path()).unwrap();
        assert_eq!(config.version().as_str(), "v9");
        assert_eq!(config.network_timeout(), Some(Duration::from_millis(1500)));
    }
}
