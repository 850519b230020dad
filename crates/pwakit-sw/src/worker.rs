//! The cache manager: event handlers of one worker revision.

use std::sync::Arc;

use futures::future::join_all;
use pwakit_common::{retry_with_backoff, PwaError, Result, RetryConfig};
use pwakit_core::{CacheKind, CacheVersion, PwaConfig};
use pwakit_net::{Fetcher, Request, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::SharedCaches;
use crate::router::{Route, Router};
use crate::strategy::{CacheTarget, Strategies};

/// Control messages a page can post to the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerMessage {
    /// Activate a waiting worker without waiting for tabs to close.
    #[serde(rename = "SKIP_WAITING")]
    SkipWaiting,
}

impl WorkerMessage {
    /// Parse message data; anything unrecognised yields `None`.
    pub fn parse(data: &JsonValue) -> Option<Self> {
        serde_json::from_value(data.clone()).ok()
    }

    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

/// Result of a fetch event.
#[derive(Debug, Clone)]
pub enum FetchDisposition {
    /// Not intercepted; the request goes to the network untouched.
    PassThrough,
    /// Intercepted, answered with this response.
    RespondWith(Response),
}

impl FetchDisposition {
    pub fn response(&self) -> Option<&Response> {
        match self {
            FetchDisposition::PassThrough => None,
            FetchDisposition::RespondWith(response) => Some(response),
        }
    }

    pub fn into_response(self) -> Option<Response> {
        match self {
            FetchDisposition::PassThrough => None,
            FetchDisposition::RespondWith(response) => Some(response),
        }
    }
}

/// Outcome of the install handler.
#[derive(Debug, Clone)]
pub struct InstallReport {
    /// Shell cache name.
    pub cache: String,
    /// Number of precached URLs stored.
    pub stored: usize,
    /// Why precaching was abandoned, if it was.
    pub failure: Option<String>,
    /// Whether the worker asked to skip the waiting phase.
    pub skip_waiting: bool,
}

impl InstallReport {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

/// Outcome of the activate handler.
#[derive(Debug, Clone, Default)]
pub struct ActivateReport {
    /// Caches of older revisions that were deleted.
    pub deleted: Vec<String>,
    /// Clients that came under this worker's control.
    pub claimed: Vec<String>,
}

/// Install, activate, message and fetch handling for one cache version.
pub struct CacheManager<F: Fetcher> {
    config: PwaConfig,
    version: CacheVersion,
    router: Router,
    offline_page: Url,
    caches: SharedCaches,
    fetcher: Arc<F>,
    strategies: Strategies<F>,
}

impl<F: Fetcher> CacheManager<F> {
    /// Build a manager; fails if the config does not validate.
    pub fn new(config: PwaConfig, fetcher: Arc<F>, caches: SharedCaches) -> Result<Self> {
        config.validate()?;

        let strategies = Strategies::new(
            Arc::clone(&fetcher),
            Arc::clone(&caches),
            config.network_timeout(),
        );

        Ok(Self {
            version: config.version(),
            router: Router::new(&config)?,
            offline_page: config.offline_page()?,
            caches,
            fetcher,
            strategies,
            config,
        })
    }

    pub fn version(&self) -> &CacheVersion {
        &self.version
    }

    pub fn config(&self) -> &PwaConfig {
        &self.config
    }

    pub fn caches(&self) -> SharedCaches {
        Arc::clone(&self.caches)
    }

    pub fn route(&self, request: &Request) -> Route {
        self.router.route(request)
    }

    fn target(&self, kind: CacheKind) -> CacheTarget {
        CacheTarget {
            name: self.config.cache_name(kind),
            limits: self.config.limits(kind).clone(),
        }
    }

    /// Install handler: precache the app shell.
    ///
    /// All URLs are stored or none are. A failure is logged and absorbed so
    /// the worker still installs; it just skips the early activation.
    pub async fn install(&self) -> InstallReport {
        let target = self.target(CacheKind::Shell);
        info!(cache = %target.name, urls = self.config.precache_urls.len(), "Installing");

        match self.precache(&target).await {
            Ok(stored) => {
                info!(cache = %target.name, stored, "Precache complete");
                InstallReport {
                    cache: target.name,
                    stored,
                    failure: None,
                    skip_waiting: true,
                }
            }
            Err(e) => {
                warn!(
                    cache = %target.name,
                    category = e.category(),
                    error = %e,
                    "Precache failed; install continues without app shell"
                );
                InstallReport {
                    cache: target.name,
                    stored: 0,
                    failure: Some(e.to_string()),
                    skip_waiting: false,
                }
            }
        }
    }

    async fn precache(&self, target: &CacheTarget) -> Result<usize> {
        let requests = self
            .config
            .precache_urls
            .iter()
            .map(|path| self.config.resolve(path).map(Request::get))
            .collect::<Result<Vec<_>>>()?;

        let retry = RetryConfig::attempts(self.config.install_attempts);
        let fetches = requests.iter().map(|request| {
            let retry = &retry;
            async move {
                let response = retry_with_backoff(
                    retry,
                    || self.fetch_precache(request),
                    PwaError::is_retryable,
                )
                .await?;
                Ok::<_, PwaError>((request, response))
            }
        });

        let fetched = join_all(fetches)
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()?;

        let mut caches = self.caches.write().await;
        let cache = caches.open_with_limits(&target.name, target.limits.clone());

        // Check every entry first so a refused write leaves the cache untouched.
        for (request, response) in &fetched {
            cache.admits(request, response)?;
        }
        for (request, response) in &fetched {
            cache.put(request, response)?;
        }

        Ok(fetched.len())
    }

    /// Server errors are retried; any other non-2xx status fails the install at once.
    async fn fetch_precache(&self, request: &Request) -> Result<Response> {
        let response = self.fetcher.fetch(request).await?;
        if response.ok() {
            return Ok(response);
        }

        let message = format!("precache {} returned {}", request.url, response.status);
        if response.status >= 500 {
            Err(PwaError::network(message))
        } else {
            Err(PwaError::cache(message))
        }
    }

    /// Activate handler: delete every cache this version does not own.
    pub async fn activate(&self) -> ActivateReport {
        let mut caches = self.caches.write().await;

        let deleted: Vec<String> = caches
            .keys()
            .into_iter()
            .filter(|name| !self.version.owns(name))
            .collect();

        for name in &deleted {
            caches.delete(name);
            info!(cache = %name, version = %self.version, "Deleted stale cache");
        }

        ActivateReport {
            deleted,
            claimed: Vec::new(),
        }
    }

    /// Message handler. Returns the recognised message, if any.
    pub fn handle_message(&self, data: &JsonValue) -> Option<WorkerMessage> {
        let message = WorkerMessage::parse(data);
        if message.is_none() {
            debug!(%data, "Ignoring unrecognised message");
        }
        message
    }

    /// Fetch handler.
    pub async fn handle_fetch(&self, request: &Request) -> FetchDisposition {
        let route = self.route(request);
        debug!(url = %request.url, %route, "Fetch event");

        match route {
            Route::PassThrough(_) => FetchDisposition::PassThrough,
            Route::NetworkFirst {
                cache,
                offline_fallback,
            } => {
                let offline = offline_fallback.then_some(&self.offline_page);
                FetchDisposition::RespondWith(
                    self.strategies
                        .network_first(request, &self.target(cache), offline)
                        .await,
                )
            }
            Route::StaleWhileRevalidate { cache } => FetchDisposition::RespondWith(
                self.strategies
                    .stale_while_revalidate(request, &self.target(cache))
                    .await,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStorage;
    use http::StatusCode;
    use pwakit_net::MemoryFetcher;
    use serde_json::json;

    fn config(version: &str, precache: &[&str]) -> PwaConfig {
        PwaConfig {
            cache_version: version.to_string(),
            origin: "https://example.com".to_string(),
            precache_urls: precache.iter().map(|s| s.to_string()).collect(),
            install_attempts: 1,
            ..Default::default()
        }
    }

    fn url(path: &str) -> Url {
        Url::parse("https://example.com").unwrap().join(path).unwrap()
    }

    #[test]
    fn test_message_parsing() {
        assert_eq!(
            WorkerMessage::parse(&json!({ "type": "SKIP_WAITING" })),
            Some(WorkerMessage::SkipWaiting)
        );
        assert_eq!(WorkerMessage::parse(&json!({ "type": "CLAIM" })), None);
        assert_eq!(WorkerMessage::parse(&json!("SKIP_WAITING")), None);
        assert_eq!(WorkerMessage::parse(&JsonValue::Null), None);
        assert_eq!(
            WorkerMessage::SkipWaiting.to_json(),
            json!({ "type": "SKIP_WAITING" })
        );
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let fetcher = Arc::new(MemoryFetcher::new());
        let result = CacheManager::new(
            config("v1", &["/"]),
            fetcher,
            CacheStorage::new().shared(),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_install_is_all_or_nothing() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.route_text(&url("/"), StatusCode::OK, "home");
        // /offline/ is not routed: the origin answers 404
        let caches = CacheStorage::new().shared();
        let manager = CacheManager::new(
            config("v1", &["/", "/offline/"]),
            Arc::clone(&fetcher),
            Arc::clone(&caches),
        )
        .unwrap();

        let report = manager.install().await;
        assert!(!report.succeeded());
        assert!(!report.skip_waiting);
        assert_eq!(report.stored, 0);
        assert!(caches.read().await.get("v1-shell").map_or(true, |c| c.is_empty()));
    }

    #[tokio::test]
    async fn test_install_retries_transient_failures() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.route_text(&url("/offline/"), StatusCode::OK, "offline");
        fetcher.fail(&url("/offline/"));

        let mut cfg = config("v1", &["/offline/"]);
        cfg.install_attempts = 3;
        let manager = CacheManager::new(cfg, Arc::clone(&fetcher), CacheStorage::new().shared()).unwrap();

        let recovering = Arc::clone(&fetcher);
        let heal = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            recovering.recover(&url("/offline/"));
        });

        let report = manager.install().await;
        heal.await.unwrap();

        assert!(report.succeeded(), "{:?}", report.failure);
        assert!(fetcher.hits(&url("/offline/")) >= 2);
    }

    #[tokio::test]
    async fn test_install_does_not_retry_missing_page() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.route_text(&url("/"), StatusCode::OK, "home");
        fetcher.route_text(&url("/offline/"), StatusCode::NOT_FOUND, "gone");

        let mut cfg = config("v1", &["/", "/offline/"]);
        cfg.install_attempts = 3;
        let manager = CacheManager::new(cfg, Arc::clone(&fetcher), CacheStorage::new().shared()).unwrap();

        let report = manager.install().await;
        assert!(!report.succeeded());
        assert_eq!(fetcher.hits(&url("/offline/")), 1);
    }

    #[tokio::test]
    async fn test_install_retries_server_errors() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.route_text(&url("/offline/"), StatusCode::SERVICE_UNAVAILABLE, "busy");

        let mut cfg = config("v1", &["/offline/"]);
        cfg.install_attempts = 2;
        let manager = CacheManager::new(cfg, Arc::clone(&fetcher), CacheStorage::new().shared()).unwrap();

        let report = manager.install().await;
        assert!(!report.succeeded());
        assert_eq!(fetcher.hits(&url("/offline/")), 2);
    }

    #[tokio::test]
    async fn test_activate_keeps_only_own_version() {
        let fetcher = Arc::new(MemoryFetcher::new());
        let caches = CacheStorage::new().shared();
        {
            let mut storage = caches.write().await;
            storage.open("v1-shell");
            storage.open("v2-images");
            storage.open("legacy");
        }

        let manager = CacheManager::new(config("v2", &["/offline/"]), fetcher, Arc::clone(&caches)).unwrap();
        let report = manager.activate().await;

        assert_eq!(report.deleted, vec!["v1-shell", "legacy"]);
        assert_eq!(caches.read().await.keys(), vec!["v2-images"]);
    }

    #[tokio::test]
    async fn test_handle_message_ignores_garbage() {
        let manager = CacheManager::new(
            config("v1", &["/offline/"]),
            Arc::new(MemoryFetcher::new()),
            CacheStorage::new().shared(),
        )
        .unwrap();

        assert!(manager.handle_message(&json!({ "kind": "SKIP_WAITING" })).is_none());
        assert_eq!(
            manager.handle_message(&json!({ "type": "SKIP_WAITING" })),
            Some(WorkerMessage::SkipWaiting)
        );
    }

    #[tokio::test]
    async fn test_non_get_and_cross_origin_are_not_intercepted() {
        let fetcher = Arc::new(MemoryFetcher::new());
        let manager = CacheManager::new(
            config("v1", &["/offline/"]),
            Arc::clone(&fetcher),
            CacheStorage::new().shared(),
        )
        .unwrap();

        let post = Request::get(url("/content/1/comment/")).method(http::Method::POST);
        assert!(manager.handle_fetch(&post).await.response().is_none());

        let foreign = Request::get(Url::parse("https://cdn.example.net/app.js").unwrap());
        assert!(manager.handle_fetch(&foreign).await.response().is_none());

        assert_eq!(fetcher.total_hits(), 0);
    }
}
