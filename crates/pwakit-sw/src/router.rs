//! Maps intercepted requests to a caching strategy.

use http::Method;
use pwakit_common::Result;
use pwakit_core::{CacheKind, PwaConfig};
use pwakit_net::Request;
use std::fmt;
use url::Origin;

/// Why a request is left to the default network path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassReason {
    NonGet,
    CrossOrigin,
}

/// Strategy chosen for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Not intercepted.
    PassThrough(PassReason),
    /// Network, then cache, then (optionally) the offline page.
    NetworkFirst {
        cache: CacheKind,
        offline_fallback: bool,
    },
    /// Cache now, network in the background.
    StaleWhileRevalidate { cache: CacheKind },
}

impl Route {
    pub fn is_intercepted(&self) -> bool {
        !matches!(self, Route::PassThrough(_))
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::PassThrough(PassReason::NonGet) => write!(f, "pass-through (non-GET)"),
            Route::PassThrough(PassReason::CrossOrigin) => write!(f, "pass-through (cross-origin)"),
            Route::NetworkFirst {
                cache,
                offline_fallback: true,
            } => write!(f, "network-first [{cache}] with offline page"),
            Route::NetworkFirst { cache, .. } => write!(f, "network-first [{cache}]"),
            Route::StaleWhileRevalidate { cache } => write!(f, "stale-while-revalidate [{cache}]"),
        }
    }
}

/// Request router for one worker revision.
#[derive(Debug, Clone)]
pub struct Router {
    origin: Origin,
    static_prefix: String,
    config: PwaConfig,
}

impl Router {
    pub fn new(config: &PwaConfig) -> Result<Self> {
        Ok(Self {
            origin: config.origin_url()?.origin(),
            static_prefix: config.static_prefix.clone(),
            config: config.clone(),
        })
    }

    /// Pick the route for a request. Rules apply in order:
    /// navigations, static prefix, media extensions, everything else.
    pub fn route(&self, request: &Request) -> Route {
        if request.method != Method::GET {
            return Route::PassThrough(PassReason::NonGet);
        }

        if request.url.origin() != self.origin {
            return Route::PassThrough(PassReason::CrossOrigin);
        }

        if request.is_navigation() {
            return Route::NetworkFirst {
                cache: CacheKind::Runtime,
                offline_fallback: true,
            };
        }

        let path = request.url.path();

        if path.starts_with(&self.static_prefix) {
            return Route::StaleWhileRevalidate {
                cache: CacheKind::Shell,
            };
        }

        if self.config.is_media_path(path) {
            return Route::StaleWhileRevalidate {
                cache: CacheKind::Images,
            };
        }

        Route::NetworkFirst {
            cache: CacheKind::Runtime,
            offline_fallback: false,
        }
    }
}
