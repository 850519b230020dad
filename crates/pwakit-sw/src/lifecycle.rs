//! Worker lifecycle: states, worker records, and the registration slots.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use pwakit_core::CacheVersion;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

/// Unique identifier for a service worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceWorkerId(u64);

impl ServiceWorkerId {
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Service worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceWorkerState {
    /// Initial state, script parsed.
    #[default]
    Parsed,
    /// Install event running.
    Installing,
    /// Installed and waiting for activation.
    Installed,
    /// Activate event running.
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Replaced by a newer worker.
    Redundant,
}

/// A service worker instance.
#[derive(Debug, Clone)]
pub struct ServiceWorker {
    /// Unique ID.
    pub id: ServiceWorkerId,

    /// Cache version of the script revision.
    pub version: CacheVersion,

    /// Current state.
    pub state: ServiceWorkerState,

    /// Time of last state change.
    pub state_changed_at: Instant,
}

impl ServiceWorker {
    /// Create a new service worker.
    pub fn new(version: CacheVersion) -> Self {
        Self {
            id: ServiceWorkerId::new(),
            version,
            state: ServiceWorkerState::Parsed,
            state_changed_at: Instant::now(),
        }
    }

    /// Set state.
    pub fn set_state(&mut self, state: ServiceWorkerState) {
        debug!(worker = self.id.raw(), from = ?self.state, to = ?state, "Worker state change");
        self.state = state;
        self.state_changed_at = Instant::now();
    }
}

// ==================== Registration ====================

/// A service worker registration.
#[derive(Debug)]
pub struct ServiceWorkerRegistration {
    /// Scope URL.
    pub scope: Url,

    /// Installing worker.
    pub installing: Option<ServiceWorker>,

    /// Waiting worker (installed but not active).
    pub waiting: Option<ServiceWorker>,

    /// Active worker.
    pub active: Option<ServiceWorker>,
}

impl ServiceWorkerRegistration {
    /// Create a new registration.
    pub fn new(scope: Url) -> Self {
        Self {
            scope,
            installing: None,
            waiting: None,
            active: None,
        }
    }

    /// Get the active worker.
    pub fn get_active(&self) -> Option<&ServiceWorker> {
        self.active.as_ref()
    }

    /// Start installing a new worker. A previous installing worker is dropped.
    pub fn update(&mut self, version: CacheVersion) -> ServiceWorkerId {
        if let Some(mut stale) = self.installing.take() {
            stale.set_state(ServiceWorkerState::Redundant);
        }

        let mut worker = ServiceWorker::new(version);
        worker.set_state(ServiceWorkerState::Installing);
        let id = worker.id;
        self.installing = Some(worker);
        id
    }

    /// Transition installing to waiting. A previous waiting worker is replaced.
    pub fn install_complete(&mut self) -> Option<ServiceWorkerId> {
        let mut worker = self.installing.take()?;
        worker.set_state(ServiceWorkerState::Installed);
        if let Some(mut replaced) = self.waiting.replace(worker) {
            replaced.set_state(ServiceWorkerState::Redundant);
        }
        self.waiting.as_ref().map(|w| w.id)
    }

    /// Move the waiting worker to `Activating`; it stays in the waiting slot
    /// until [`ServiceWorkerRegistration::activate_complete`].
    pub fn begin_activation(&mut self) -> Option<ServiceWorkerId> {
        let worker = self.waiting.as_mut()?;
        worker.set_state(ServiceWorkerState::Activating);
        Some(worker.id)
    }

    /// Promote the waiting worker to active; the old active one becomes redundant.
    pub fn activate_complete(&mut self) -> Option<ServiceWorkerId> {
        let mut worker = self.waiting.take()?;

        if let Some(mut old) = self.active.take() {
            old.set_state(ServiceWorkerState::Redundant);
        }

        worker.set_state(ServiceWorkerState::Activated);
        let id = worker.id;
        self.active = Some(worker);
        Some(id)
    }

    /// Activate the waiting worker in one step.
    pub fn activate(&mut self) -> Option<ServiceWorkerId> {
        self.begin_activation()?;
        self.activate_complete()
    }

    /// Unregister (mark every worker redundant).
    pub fn unregister(&mut self) {
        for slot in [&mut self.active, &mut self.waiting, &mut self.installing] {
            if let Some(mut worker) = slot.take() {
                worker.set_state(ServiceWorkerState::Redundant);
            }
        }
    }
}
