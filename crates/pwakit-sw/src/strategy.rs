//! Caching strategies.
//!
//! Neither strategy returns an error: a failed network fetch becomes a cache
//! hit, the offline page, or [`Response::error`].

use std::sync::Arc;
use std::time::Duration;

use pwakit_common::{with_timeout, PwaError};
use pwakit_core::CacheLimits;
use pwakit_net::{Fetcher, Request, Response};
use tracing::{debug, trace, warn};
use url::Url;

use crate::cache::SharedCaches;

/// Whether a network response may be stored: plain 200 or opaque.
///
/// Error, redirect and every other status are never cached.
pub fn can_cache(response: &Response) -> bool {
    response.status == 200 || response.is_opaque()
}

/// A named cache a strategy reads from and writes to.
#[derive(Debug, Clone)]
pub struct CacheTarget {
    pub name: String,
    pub limits: CacheLimits,
}

/// Runs strategies against shared storage and one fetcher.
pub struct Strategies<F: Fetcher> {
    fetcher: Arc<F>,
    caches: SharedCaches,
    network_timeout: Option<Duration>,
}

impl<F: Fetcher> Strategies<F> {
    pub fn new(fetcher: Arc<F>, caches: SharedCaches, network_timeout: Option<Duration>) -> Self {
        Self {
            fetcher,
            caches,
            network_timeout,
        }
    }

    /// Network, falling back to any cached match, then to `offline_page`.
    pub async fn network_first(
        &self,
        request: &Request,
        target: &CacheTarget,
        offline_page: Option<&Url>,
    ) -> Response {
        match self.fetch_network(request).await {
            Ok(response) => {
                if can_cache(&response) {
                    store(&self.caches, target, request, &response).await;
                }
                response
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Network failed, trying cache");
                let mut caches = self.caches.write().await;

                if let Some(cached) = caches.match_request(request) {
                    trace!(url = %request.url, "Serving cached response");
                    return cached;
                }

                if let Some(offline) = offline_page {
                    if let Some(page) = caches.match_url(offline) {
                        debug!(url = %request.url, "Serving offline page");
                        return page;
                    }
                    warn!(offline = %offline, "Offline page is not cached");
                }

                Response::error()
            }
        }
    }

    /// Cached response right away with a background refresh; network only
    /// when nothing is cached.
    pub async fn stale_while_revalidate(&self, request: &Request, target: &CacheTarget) -> Response {
        let cached = self.caches.write().await.match_request(request);

        match cached {
            Some(cached) => {
                trace!(url = %request.url, cache = %target.name, "Serving stale, revalidating");
                tokio::spawn(revalidate(
                    Arc::clone(&self.fetcher),
                    Arc::clone(&self.caches),
                    request.clone(),
                    target.clone(),
                ));
                cached
            }
            None => match self.fetcher.fetch(request).await {
                Ok(response) => {
                    if can_cache(&response) {
                        store(&self.caches, target, request, &response).await;
                    }
                    response
                }
                Err(e) => {
                    debug!(url = %request.url, error = %e, "Network failed, nothing cached");
                    Response::error()
                }
            },
        }
    }

    async fn fetch_network(&self, request: &Request) -> Result<Response, PwaError> {
        match self.network_timeout {
            Some(timeout) => with_timeout(timeout, self.fetcher.fetch(request)).await?.map_err(Into::into),
            None => self.fetcher.fetch(request).await.map_err(Into::into),
        }
    }
}

async fn revalidate<F: Fetcher>(
    fetcher: Arc<F>,
    caches: SharedCaches,
    request: Request,
    target: CacheTarget,
) {
    match fetcher.fetch(&request).await {
        Ok(response) if can_cache(&response) => {
            store(&caches, &target, &request, &response).await;
        }
        Ok(response) => {
            debug!(url = %request.url, status = response.status, "Refresh not cacheable");
        }
        Err(e) => {
            debug!(url = %request.url, error = %e, "Background refresh failed");
        }
    }
}

/// Write a response into `target`. Failures are logged, never returned:
/// the caller already has the response it needs.
pub async fn store(caches: &SharedCaches, target: &CacheTarget, request: &Request, response: &Response) {
    let mut caches = caches.write().await;
    let cache = caches.open_with_limits(&target.name, target.limits.clone());

    if let Err(e) = cache.put(request, response) {
        warn!(
            url = %request.url,
            cache = %target.name,
            category = e.category(),
            error = %e,
            "Cache write failed"
        );
    }
}
