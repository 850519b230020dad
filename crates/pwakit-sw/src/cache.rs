//! Named caches and the cache storage that owns them.
//!
//! ```text
//! CacheStorage (caches)
//!     └── Cache (<version>-<kind>)
//!             └── GET URL → CacheEntry
//! ```

use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use hashbrown::HashMap;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use lru::LruCache;
use pwakit_common::{PwaError, Result};
use pwakit_core::CacheLimits;
use pwakit_net::{Request, Response, ResponseType};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, trace};
use url::Url;

/// Cache storage shared by every worker revision and every in-flight fetch.
pub type SharedCaches = Arc<RwLock<CacheStorage>>;

// ==================== Cache Entry ====================

/// A cached GET response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request URL (cache key).
    pub url: String,

    /// Response type.
    pub response_type: ResponseType,

    /// Response status.
    pub status: u16,

    /// Response headers in arrival order; repeated names keep every value.
    pub headers: Vec<CachedHeader>,

    /// Response body.
    #[serde(with = "body_base64")]
    pub body: Bytes,

    /// Whether the response came from a redirected fetch.
    #[serde(default)]
    pub redirected: bool,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

/// One stored header line. Values are raw bytes, so non-ASCII survives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedHeader {
    pub name: String,
    #[serde(with = "body_base64")]
    pub value: Bytes,
}

impl CacheEntry {
    /// Build an entry from a fetched response.
    pub fn from_response(request: &Request, response: &Response) -> Self {
        let headers = response
            .headers
            .iter()
            .map(|(name, value)| CachedHeader {
                name: name.as_str().to_string(),
                value: Bytes::copy_from_slice(value.as_bytes()),
            })
            .collect();

        Self {
            url: request.cache_key(),
            response_type: response.response_type,
            status: response.status,
            headers,
            body: response.body.clone(),
            redirected: response.redirected,
            cached_at: now_millis(),
        }
    }

    /// Replay the entry as a response.
    pub fn to_response(&self) -> Response {
        let mut headers = HeaderMap::new();
        for header in &self.headers {
            match (
                HeaderName::from_bytes(header.name.as_bytes()),
                HeaderValue::from_bytes(&header.value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => trace!(url = %self.url, header = %header.name, "Skipping unreadable cached header"),
            }
        }

        Response {
            url: Url::parse(&self.url).ok(),
            response_type: self.response_type,
            status: self.status,
            headers,
            body: self.body.clone(),
            redirected: self.redirected,
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

mod body_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

// ==================== Cache ====================

/// A named cache.
///
/// With `max_entries` set, the least recently matched or written entry is
/// evicted first.
#[derive(Debug)]
pub struct Cache {
    name: String,
    limits: CacheLimits,
    entries: LruCache<String, CacheEntry>,
}

impl Cache {
    /// Create a new cache.
    pub fn new(name: &str, limits: CacheLimits) -> Self {
        let entries = match limits.max_entries {
            Some(max) => LruCache::new(NonZeroUsize::new(max).unwrap_or(NonZeroUsize::MIN)),
            None => LruCache::unbounded(),
        };

        Self {
            name: name.to_string(),
            limits,
            entries,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn limits(&self) -> &CacheLimits {
        &self.limits
    }

    /// Look up an entry by cache key, marking it recently used.
    pub fn match_url(&mut self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Match a request. Only GET requests can match.
    pub fn match_request(&mut self, request: &Request) -> Option<Response> {
        if request.method != Method::GET {
            return None;
        }
        self.match_url(&request.cache_key()).map(CacheEntry::to_response)
    }

    /// Check whether `response` may be written for `request`.
    pub fn admits(&self, request: &Request, response: &Response) -> Result<()> {
        if request.method != Method::GET {
            return Err(PwaError::InvalidArgument(format!(
                "cannot cache {} request for {}",
                request.method, request.url
            )));
        }

        if response.is_error() {
            return Err(PwaError::InvalidArgument(format!(
                "cannot cache a network error for {}",
                request.url
            )));
        }

        if let Some(limit) = self.limits.max_entry_bytes {
            if response.body.len() > limit {
                return Err(PwaError::QuotaExceeded {
                    cache: self.name.clone(),
                    size: response.body.len(),
                    limit,
                });
            }
        }

        Ok(())
    }

    /// Store a response. Returns the key of an entry evicted to make room.
    pub fn put(&mut self, request: &Request, response: &Response) -> Result<Option<String>> {
        self.admits(request, response)?;
        Ok(self.insert(CacheEntry::from_response(request, response)))
    }

    fn insert(&mut self, entry: CacheEntry) -> Option<String> {
        let key = entry.url.clone();
        trace!(cache = %self.name, url = %key, "Cache put");

        match self.entries.push(key.clone(), entry) {
            Some((evicted, _)) if evicted != key => {
                debug!(cache = %self.name, url = %evicted, "Evicted least recently used entry");
                Some(evicted)
            }
            _ => None,
        }
    }

    /// Delete entry.
    pub fn delete(&mut self, key: &str) -> bool {
        self.entries.pop(key).is_some()
    }

    /// Get all keys, most recently used first.
    pub fn keys(&self) -> Vec<&str> {
        self.entries.iter().map(|(k, _)| k.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ==================== Cache Storage ====================

/// Cache storage (the `caches` global).
///
/// Caches are matched in creation order.
#[derive(Debug, Default)]
pub struct CacheStorage {
    caches: HashMap<String, Cache>,
    order: Vec<String>,
}

impl CacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap into the shared handle used by workers.
    pub fn shared(self) -> SharedCaches {
        Arc::new(RwLock::new(self))
    }

    /// Open a cache without limits (creates if it doesn't exist).
    pub fn open(&mut self, name: &str) -> &mut Cache {
        self.open_with_limits(name, CacheLimits::default())
    }

    /// Open a cache, applying `limits` if it has to be created.
    pub fn open_with_limits(&mut self, name: &str, limits: CacheLimits) -> &mut Cache {
        if !self.caches.contains_key(name) {
            debug!(cache = %name, "Creating cache");
            self.order.push(name.to_string());
        }
        self.caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name, limits))
    }

    /// Check if cache exists.
    pub fn has(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    /// Get a cache if it exists.
    pub fn get(&self, name: &str) -> Option<&Cache> {
        self.caches.get(name)
    }

    /// Delete a cache.
    pub fn delete(&mut self, name: &str) -> bool {
        self.order.retain(|n| n != name);
        self.caches.remove(name).is_some()
    }

    /// Get all cache names, in creation order.
    pub fn keys(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Match a request across all caches.
    pub fn match_request(&mut self, request: &Request) -> Option<Response> {
        for name in &self.order {
            if let Some(response) = self
                .caches
                .get_mut(name)
                .and_then(|cache| cache.match_request(request))
            {
                return Some(response);
            }
        }
        None
    }

    /// Match a URL across all caches.
    pub fn match_url(&mut self, url: &Url) -> Option<Response> {
        self.match_request(&Request::get(url.clone()))
    }

    /// Capture the storage for persistence.
    pub fn snapshot(&self) -> StorageSnapshot {
        let caches = self
            .order
            .iter()
            .filter_map(|name| self.caches.get(name))
            .map(|cache| {
                // Oldest first, so a reload rebuilds the same recency order.
                let mut entries: Vec<CacheEntry> =
                    cache.entries.iter().map(|(_, e)| e.clone()).collect();
                entries.reverse();
                CacheSnapshot {
                    name: cache.name.clone(),
                    limits: cache.limits.clone(),
                    entries,
                }
            })
            .collect();

        StorageSnapshot { caches }
    }

    /// Rebuild storage from a snapshot.
    pub fn from_snapshot(snapshot: StorageSnapshot) -> Self {
        let mut storage = Self::new();
        for saved in snapshot.caches {
            let cache = storage.open_with_limits(&saved.name, saved.limits);
            for entry in saved.entries {
                cache.insert(entry);
            }
        }
        storage
    }
}

// ==================== Persistence ====================

/// Serializable form of [`CacheStorage`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSnapshot {
    pub caches: Vec<CacheSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub name: String,
    pub limits: CacheLimits,
    pub entries: Vec<CacheEntry>,
}

impl StorageSnapshot {
    /// Write the snapshot as JSON.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(path, json).await?;
        debug!(path = %path.display(), caches = self.caches.len(), "Saved cache snapshot");
        Ok(())
    }

    /// Read a snapshot written by [`StorageSnapshot::save`].
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read(path).await?;
        let snapshot: StorageSnapshot = serde_json::from_slice(&raw)?;
        debug!(path = %path.display(), caches = snapshot.caches.len(), "Loaded cache snapshot");
        Ok(snapshot)
    }
}
