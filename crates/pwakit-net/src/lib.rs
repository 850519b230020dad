//! # pwakit Net
//!
//! Request/response model and network access for the pwakit cache manager.
//!
//! ## Design Goals
//!
//! 1. **Fetch-shaped types**: requests carry a mode, responses carry a type
//!    (basic, cors, opaque, error) so cacheability can be decided
//! 2. **One seam**: everything that touches the network goes through [`Fetcher`]
//! 3. **Swappable transport**: [`HttpFetcher`] for a live origin,
//!    [`MemoryFetcher`] for tests and dry runs

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, trace};
use url::Url;

pub use pwakit_core::RequestMode;

pub mod memory;

pub use memory::MemoryFetcher;

/// Errors that can occur in networking.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Network unreachable: {0}")]
    Offline(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl From<NetError> for pwakit_common::PwaError {
    fn from(err: NetError) -> Self {
        match err {
            NetError::Timeout(d) => pwakit_common::PwaError::Timeout(d),
            other => pwakit_common::PwaError::network_with_source("fetch failed", other),
        }
    }
}

/// Unique identifier for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

/// An intercepted or outgoing request.
#[derive(Debug, Clone)]
pub struct Request {
    pub id: RequestId,
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub mode: RequestMode,
    pub body: Option<Bytes>,
}

impl Request {
    /// Create a GET request.
    pub fn get(url: Url) -> Self {
        Self {
            id: RequestId::new(),
            url,
            method: Method::GET,
            headers: HeaderMap::new(),
            mode: RequestMode::default(),
            body: None,
        }
    }

    /// Create a top-level navigation request.
    pub fn navigate(url: Url) -> Self {
        Self::get(url).mode(RequestMode::Navigate)
    }

    /// Create a POST request.
    pub fn post(url: Url, body: Bytes) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            ..Self::get(url)
        }
    }

    /// Parse a URL and create a GET request.
    pub fn parse(url: &str) -> Result<Self, NetError> {
        let url = Url::parse(url).map_err(|e| NetError::InvalidUrl(e.to_string()))?;
        Ok(Self::get(url))
    }

    /// Set the method.
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Set the mode.
    pub fn mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn is_navigation(&self) -> bool {
        self.mode.is_navigation()
    }

    /// Key used to store the request in a cache: the URL without fragment.
    pub fn cache_key(&self) -> String {
        cache_key(&self.url)
    }
}

/// Cache key for a URL (fragment dropped).
pub fn cache_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.into()
}

/// Response type, as exposed by the fetch API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Same-origin response.
    #[default]
    Basic,
    /// Cross-origin response readable through CORS.
    Cors,
    /// Cross-origin no-cors response: status and body are hidden from the page.
    Opaque,
    /// Network error.
    Error,
}

/// A response, fully buffered.
#[derive(Debug, Clone)]
pub struct Response {
    pub url: Option<Url>,
    pub response_type: ResponseType,
    /// Status code; 0 for opaque and error responses.
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Whether the final URL differs from the requested one.
    pub redirected: bool,
}

impl Response {
    /// Create a basic response.
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            url: None,
            response_type: ResponseType::Basic,
            status: status.as_u16(),
            headers: HeaderMap::new(),
            body: body.into(),
            redirected: false,
        }
    }

    /// Create a 200 response with a body.
    pub fn ok_with(body: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::OK, body)
    }

    /// Create an opaque response.
    pub fn opaque(body: impl Into<Bytes>) -> Self {
        Self {
            url: None,
            response_type: ResponseType::Opaque,
            status: 0,
            headers: HeaderMap::new(),
            body: body.into(),
            redirected: false,
        }
    }

    /// Create a network error response (`Response.error()`).
    pub fn error() -> Self {
        Self {
            url: None,
            response_type: ResponseType::Error,
            status: 0,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            redirected: false,
        }
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the final URL.
    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    /// Check if the status is 2xx.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_opaque(&self) -> bool {
        self.response_type == ResponseType::Opaque
    }

    pub fn is_error(&self) -> bool {
        self.response_type == ResponseType::Error
    }

    pub fn status_code(&self) -> Option<StatusCode> {
        StatusCode::from_u16(self.status).ok()
    }

    /// Get the body as text.
    pub fn text(&self) -> Result<String, NetError> {
        String::from_utf8(self.body.to_vec()).map_err(|e| NetError::RequestFailed(e.to_string()))
    }
}

/// Anything that can perform a network fetch.
pub trait Fetcher: Send + Sync + 'static {
    /// Fetch a request. `Err` means the network itself failed; HTTP error
    /// statuses come back as `Ok`.
    fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response, NetError>> + Send;
}

/// HTTP loader configuration.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// User agent string.
    pub user_agent: String,
    /// Accept-Language header.
    pub accept_language: String,
    /// Default timeout.
    pub default_timeout: Duration,
    /// Maximum redirects.
    pub max_redirects: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("pwakit/{}", env!("CARGO_PKG_VERSION")),
            accept_language: "en-US,en;q=0.9".to_string(),
            default_timeout: Duration::from_secs(30),
            max_redirects: 10,
        }
    }
}

/// Fetcher backed by a reqwest client.
pub struct HttpFetcher {
    client: Client,
    config: LoaderConfig,
}

impl HttpFetcher {
    /// Create a new fetcher.
    pub fn new(config: LoaderConfig) -> Result<Self, NetError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.default_timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| NetError::RequestFailed(e.to_string()))?;

        info!("HttpFetcher initialized");

        Ok(Self { client, config })
    }

    async fn send(&self, request: &Request) -> Result<Response, NetError> {
        debug!(url = %request.url, method = %request.method, "Fetching resource");

        let mut req_builder = self
            .client
            .request(request.method.clone(), request.url.clone());

        for (name, value) in request.headers.iter() {
            req_builder = req_builder.header(name, value);
        }
        req_builder = req_builder.header("Accept-Language", &self.config.accept_language);

        if let Some(ref body) = request.body {
            req_builder = req_builder.body(body.clone());
        }

        let response = req_builder.send().await.map_err(|e| {
            if e.is_timeout() {
                NetError::Timeout(self.config.default_timeout)
            } else {
                NetError::HttpError(e)
            }
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await?;

        let cross_origin = url.origin() != request.url.origin();
        let redirected = cache_key(&url) != request.cache_key();

        trace!(
            url = %url,
            status = %status,
            body_len = body.len(),
            redirected,
            "Response received"
        );

        if cross_origin && request.mode == RequestMode::NoCors {
            return Ok(Response {
                redirected,
                ..Response::opaque(body).with_url(url)
            });
        }

        Ok(Response {
            url: Some(url),
            response_type: if cross_origin {
                ResponseType::Cors
            } else {
                ResponseType::Basic
            },
            status: status.as_u16(),
            headers,
            body,
            redirected,
        })
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        self.send(request).await
    }
}
