//! Service worker container: drives registration, lifecycle events, control
//! messages, and fetch dispatch for one scope.
//!
//! ```text
//! ServiceWorkerContainer
//!     ├── ServiceWorkerRegistration (installing / waiting / active)
//!     ├── CacheManager per worker revision
//!     ├── Clients
//!     └── CacheStorage (shared by all revisions)
//! ```

use std::sync::Arc;

use hashbrown::HashMap;
use pwakit_common::{OptionExt, PwaError, Result};
use pwakit_core::PwaConfig;
use pwakit_net::{Fetcher, Request};
use serde_json::Value as JsonValue;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};
use url::Url;

use crate::cache::SharedCaches;
use crate::clients::{Client, Clients};
use crate::lifecycle::{ServiceWorkerId, ServiceWorkerRegistration, ServiceWorkerState};
use crate::worker::{ActivateReport, CacheManager, FetchDisposition, InstallReport, WorkerMessage};

/// Events published to pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceWorkerEvent {
    /// A new worker started installing.
    UpdateFound { worker_id: ServiceWorkerId },
    /// A worker changed state.
    StateChange {
        worker_id: ServiceWorkerId,
        new_state: ServiceWorkerState,
    },
    /// A client got a new controller.
    ControllerChange {
        client_id: String,
        worker_id: ServiceWorkerId,
    },
}

/// Handle to the registration, shared with page-side code.
pub type SharedRegistration = Arc<RwLock<ServiceWorkerRegistration>>;

/// Container for one registration scope.
pub struct ServiceWorkerContainer<F: Fetcher> {
    registration: SharedRegistration,
    workers: RwLock<HashMap<ServiceWorkerId, Arc<CacheManager<F>>>>,
    clients: RwLock<Clients>,
    caches: SharedCaches,
    fetcher: Arc<F>,
    event_tx: mpsc::UnboundedSender<ServiceWorkerEvent>,
}

impl<F: Fetcher> ServiceWorkerContainer<F> {
    /// Create a container for `scope`.
    pub fn new(
        scope: Url,
        fetcher: Arc<F>,
        caches: SharedCaches,
    ) -> (Self, mpsc::UnboundedReceiver<ServiceWorkerEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        (
            Self {
                registration: Arc::new(RwLock::new(ServiceWorkerRegistration::new(scope))),
                workers: RwLock::new(HashMap::new()),
                clients: RwLock::new(Clients::new()),
                caches,
                fetcher,
                event_tx,
            },
            event_rx,
        )
    }

    pub fn registration(&self) -> SharedRegistration {
        Arc::clone(&self.registration)
    }

    pub fn caches(&self) -> SharedCaches {
        Arc::clone(&self.caches)
    }

    fn emit(&self, event: ServiceWorkerEvent) {
        if self.event_tx.send(event).is_err() {
            debug!("No page is listening for worker events");
        }
    }

    /// Open a page in scope. It is controlled by the active worker, if any.
    pub async fn connect_page(&self, url: &str) -> Result<Client> {
        let controller = self.registration.read().await.get_active().map(|w| w.id);
        self.clients.write().await.open_window(url, controller)
    }

    /// Current controller of a client.
    pub async fn controller_of(&self, client_id: &str) -> Option<ServiceWorkerId> {
        self.clients.read().await.get(client_id)?.controller
    }

    /// Register a worker revision built from `config` and run its install.
    ///
    /// The worker activates right away when install asked to skip waiting or
    /// when nothing is active yet; otherwise it waits.
    pub async fn register(&self, config: PwaConfig) -> Result<InstallReport> {
        let manager = Arc::new(CacheManager::new(
            config,
            Arc::clone(&self.fetcher),
            Arc::clone(&self.caches),
        )?);

        let worker_id = self
            .registration
            .write()
            .await
            .update(manager.version().clone());
        self.workers.write().await.insert(worker_id, Arc::clone(&manager));

        info!(worker = worker_id.raw(), version = %manager.version(), "Worker registered");
        self.emit(ServiceWorkerEvent::UpdateFound { worker_id });
        self.emit(ServiceWorkerEvent::StateChange {
            worker_id,
            new_state: ServiceWorkerState::Installing,
        });

        let report = manager.install().await;

        let (installed, has_active) = {
            let mut registration = self.registration.write().await;
            // A newer registration may have replaced this one mid-install.
            let current = registration.installing.as_ref().map(|w| w.id) == Some(worker_id);
            let installed = current && registration.install_complete().is_some();
            (installed, registration.active.is_some())
        };

        if !installed {
            self.workers.write().await.remove(&worker_id);
            return Err(PwaError::state(format!(
                "worker {} was superseded during install",
                worker_id.raw()
            )));
        }

        self.emit(ServiceWorkerEvent::StateChange {
            worker_id,
            new_state: ServiceWorkerState::Installed,
        });
        self.prune_redundant().await;

        if report.skip_waiting || !has_active {
            self.activate().await?;
        }

        Ok(report)
    }

    /// Activate the waiting worker: evict stale caches, then claim clients.
    pub async fn activate(&self) -> Result<ActivateReport> {
        let (worker_id, scope) = {
            let mut registration = self.registration.write().await;
            let id = registration
                .begin_activation()
                .ok_or_not_found("waiting worker")?;
            (id, registration.scope.clone())
        };

        self.emit(ServiceWorkerEvent::StateChange {
            worker_id,
            new_state: ServiceWorkerState::Activating,
        });

        let manager = self
            .workers
            .read()
            .await
            .get(&worker_id)
            .cloned()
            .ok_or_else(|| PwaError::internal(format!("no manager for worker {}", worker_id.raw())))?;

        let mut report = manager.activate().await;

        self.registration.write().await.activate_complete();
        self.emit(ServiceWorkerEvent::StateChange {
            worker_id,
            new_state: ServiceWorkerState::Activated,
        });
        self.prune_redundant().await;

        report.claimed = self.clients.write().await.claim(&scope, worker_id);
        for client_id in &report.claimed {
            self.emit(ServiceWorkerEvent::ControllerChange {
                client_id: client_id.clone(),
                worker_id,
            });
        }

        info!(
            worker = worker_id.raw(),
            deleted = report.deleted.len(),
            claimed = report.claimed.len(),
            "Worker activated"
        );
        Ok(report)
    }

    /// Post a message to the waiting worker (falling back to the active one).
    pub async fn post_message(&self, data: &JsonValue) -> Result<()> {
        let (target, waiting) = {
            let registration = self.registration.read().await;
            match (&registration.waiting, &registration.active) {
                (Some(w), _) => (w.id, true),
                (None, Some(a)) => (a.id, false),
                (None, None) => return Err(PwaError::state("no worker to receive the message")),
            }
        };

        let manager = self
            .workers
            .read()
            .await
            .get(&target)
            .cloned()
            .ok_or_not_found(format!("worker {}", target.raw()))?;

        match manager.handle_message(data) {
            Some(WorkerMessage::SkipWaiting) if waiting => {
                debug!(worker = target.raw(), "Skip waiting requested");
                self.activate().await.map(|_| ())
            }
            _ => Ok(()),
        }
    }

    /// Dispatch a fetch from a page. Uncontrolled pages are not intercepted.
    pub async fn fetch(&self, client_id: Option<&str>, request: &Request) -> FetchDisposition {
        let controller = match client_id {
            Some(id) => self.controller_of(id).await,
            // navigations have no client yet; the active worker handles them
            None => self.registration.read().await.get_active().map(|w| w.id),
        };

        let Some(controller) = controller else {
            return FetchDisposition::PassThrough;
        };

        let manager = self.workers.read().await.get(&controller).cloned();
        match manager {
            Some(manager) => manager.handle_fetch(request).await,
            None => FetchDisposition::PassThrough,
        }
    }

    /// Unregister every worker. Caches are left in place.
    pub async fn unregister(&self) {
        self.registration.write().await.unregister();
        self.workers.write().await.clear();
    }

    /// Drop managers of workers no longer in any registration slot.
    async fn prune_redundant(&self) {
        let live: Vec<ServiceWorkerId> = {
            let registration = self.registration.read().await;
            [&registration.installing, &registration.waiting, &registration.active]
                .into_iter()
                .flatten()
                .map(|w| w.id)
                .collect()
        };
        self.workers.write().await.retain(|id, _| live.contains(id));
    }

    /// Number of worker revisions still alive.
    pub async fn worker_count(&self) -> usize {
        self.workers.read().await.len()
    }
}
