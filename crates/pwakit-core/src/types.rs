//! Common types used throughout pwakit

use serde::{Deserialize, Serialize};
use std::fmt;

/// Version tag that namespaces every cache created by one worker revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheVersion(String);

impl CacheVersion {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the cache of `kind` for this version, e.g. `v2-shell`.
    pub fn cache_name(&self, kind: CacheKind) -> String {
        format!("{}-{}", self.0, kind.suffix())
    }

    /// Whether a cache name belongs to this version.
    ///
    /// This is a plain prefix test: any name starting with the tag survives
    /// activation.
    pub fn owns(&self, cache_name: &str) -> bool {
        cache_name.starts_with(&self.0)
    }
}

impl fmt::Display for CacheVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The named caches a worker revision owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    /// Precached app shell and static assets.
    Shell,
    /// Navigations and other dynamic GETs.
    Runtime,
    /// Image and audio/video files.
    Images,
}

impl CacheKind {
    pub const ALL: [CacheKind; 3] = [CacheKind::Shell, CacheKind::Runtime, CacheKind::Images];

    pub fn suffix(&self) -> &'static str {
        match self {
            CacheKind::Shell => "shell",
            CacheKind::Runtime => "runtime",
            CacheKind::Images => "images",
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Request mode, mirroring the fetch `mode` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    /// Top-level page load.
    Navigate,
    SameOrigin,
    NoCors,
    #[default]
    Cors,
}

impl RequestMode {
    pub fn is_navigation(&self) -> bool {
        matches!(self, RequestMode::Navigate)
    }
}
