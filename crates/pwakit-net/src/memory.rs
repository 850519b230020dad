//! In-memory origin for tests and dry runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use hashbrown::{HashMap, HashSet};
use http::StatusCode;
use tracing::trace;
use url::Url;

use crate::{cache_key, Fetcher, NetError, Request, Response};

/// A fake origin that serves canned responses.
///
/// Unknown URLs get a 404. The whole origin can be switched offline, single
/// URLs can be made to fail, and every fetch can be delayed.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    routes: Mutex<HashMap<String, Response>>,
    failing: Mutex<HashSet<String>>,
    hits: Mutex<HashMap<String, usize>>,
    latency: Mutex<Option<Duration>>,
    offline: AtomicBool,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `response` for `url`.
    pub fn route(&self, url: &Url, response: Response) {
        lock(&self.routes).insert(cache_key(url), response);
    }

    /// Serve a text body with the given status for `url`.
    pub fn route_text(&self, url: &Url, status: StatusCode, body: &str) {
        self.route(url, Response::new(status, body.to_string()));
    }

    /// Make fetches of `url` fail at the network level.
    pub fn fail(&self, url: &Url) {
        lock(&self.failing).insert(cache_key(url));
    }

    /// Undo [`MemoryFetcher::fail`].
    pub fn recover(&self, url: &Url) {
        lock(&self.failing).remove(&cache_key(url));
    }

    /// Take the whole origin off the network.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Delay every fetch by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *lock(&self.latency) = latency;
    }

    /// Number of fetches seen for `url`, including failed ones.
    pub fn hits(&self, url: &Url) -> usize {
        lock(&self.hits).get(&cache_key(url)).copied().unwrap_or(0)
    }

    /// Number of fetches seen in total.
    pub fn total_hits(&self) -> usize {
        lock(&self.hits).values().sum()
    }

    fn respond(&self, request: &Request) -> Result<Response, NetError> {
        let key = request.cache_key();

        if self.offline.load(Ordering::SeqCst) || lock(&self.failing).contains(&key) {
            return Err(NetError::Offline(key));
        }

        let response = lock(&self.routes)
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Response::new(StatusCode::NOT_FOUND, "not found"));

        Ok(response.with_url(request.url.clone()))
    }
}

impl Fetcher for MemoryFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        *lock(&self.hits).entry(request.cache_key()).or_insert(0) += 1;
        trace!(url = %request.url, "Memory fetch");

        let latency = *lock(&self.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        self.respond(request)
    }
}

/// Lock a mutex, recovering the data if a panicking test poisoned it.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(path: &str) -> Url {
        Url::parse("https://example.com").unwrap().join(path).unwrap()
    }

    #[tokio::test]
    async fn test_routes_and_404() {
        let fetcher = MemoryFetcher::new();
        fetcher.route_text(&url("/"), StatusCode::OK, "home");

        let home = fetcher.fetch(&Request::get(url("/"))).await.unwrap();
        assert_eq!(home.text().unwrap(), "home");

        let missing = fetcher.fetch(&Request::get(url("/nope"))).await.unwrap();
        assert_eq!(missing.status, 404);
        assert_eq!(fetcher.total_hits(), 2);
    }

    #[tokio::test]
    async fn test_offline_and_failing_urls() {
        let fetcher = MemoryFetcher::new();
        fetcher.route_text(&url("/a"), StatusCode::OK, "a");

        fetcher.fail(&url("/a"));
        assert!(fetcher.fetch(&Request::get(url("/a"))).await.is_err());
        fetcher.recover(&url("/a"));
        assert!(fetcher.fetch(&Request::get(url("/a"))).await.is_ok());

        fetcher.set_offline(true);
        assert!(matches!(
            fetcher.fetch(&Request::get(url("/a"))).await,
            Err(NetError::Offline(_))
        ));
        assert_eq!(fetcher.hits(&url("/a")), 3);
    }
}
