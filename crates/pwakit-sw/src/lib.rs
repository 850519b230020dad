//! # pwakit Service Worker
//!
//! Offline cache manager for a server-rendered media site.
//!
//! ## Features
//!
//! - **Versioned caches**: `<version>-shell`, `<version>-runtime`, `<version>-images`
//! - **Lifecycle**: install (precache app shell), activate (evict old versions), fetch
//! - **Strategies**: network-first with offline page, stale-while-revalidate
//! - **Page side**: update toast, reload-once on controller change, network
//!   pill, install prompt
//!
//! ## Architecture
//!
//! ```text
//! ServiceWorkerContainer
//!     │
//!     ├── ServiceWorkerRegistration
//!     │       ├── installing / waiting / active (ServiceWorker)
//!     │       └── scope
//!     │
//!     └── CacheManager (one per worker revision)
//!             ├── Router ──► Route
//!             └── Strategies ──► Fetcher
//!
//! CacheStorage (shared)
//!     └── Cache
//!             └── GET URL → CacheEntry
//! ```

pub mod cache;
pub mod clients;
pub mod container;
pub mod lifecycle;
pub mod page;
pub mod router;
pub mod strategy;
pub mod worker;

pub use cache::{Cache, CacheEntry, CacheSnapshot, CachedHeader, CacheStorage, SharedCaches, StorageSnapshot};
pub use clients::{Client, Clients};
pub use container::{ServiceWorkerContainer, ServiceWorkerEvent, SharedRegistration};
pub use lifecycle::{ServiceWorker, ServiceWorkerId, ServiceWorkerRegistration, ServiceWorkerState};
pub use page::{
    InstallPrompt, InstallVisibility, NetworkIndicator, PageAction, PillState,
    ServiceWorkerContext, UpdateToast,
};
pub use router::{PassReason, Route, Router};
pub use strategy::{can_cache, CacheTarget, Strategies};
pub use worker::{ActivateReport, CacheManager, FetchDisposition, InstallReport, WorkerMessage};
