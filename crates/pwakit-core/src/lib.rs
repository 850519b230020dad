//! pwakit Core Library
//!
//! This crate provides the worker configuration and the shared cache/request types.

pub mod config;
pub mod types;

pub use config::{CacheLimits, CacheLimitsConfig, PageConfig, PwaConfig};
pub use types::{CacheKind, CacheVersion, RequestMode};
