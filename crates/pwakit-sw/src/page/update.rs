//! Page side of worker updates: registration context, update toast, and the
//! reload-once guard for controller changes.

use std::sync::Arc;

use pwakit_common::{OptionExt, Result};
use pwakit_core::PwaConfig;
use pwakit_net::Fetcher;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::container::{ServiceWorkerContainer, ServiceWorkerEvent, SharedRegistration};
use crate::lifecycle::ServiceWorkerState;
use crate::worker::WorkerMessage;

/// What the page should do in response to worker events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageAction {
    ShowUpdateToast,
    Reload,
}

/// Visibility of the "update available" toast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateToast {
    pub visible: bool,
}

impl UpdateToast {
    pub fn show(&mut self) {
        self.visible = true;
    }

    pub fn dismiss(&mut self) {
        self.visible = false;
    }
}

/// Lets a page reload at most once per lifetime on controller change.
#[derive(Debug, Default)]
pub struct ReloadGuard {
    reloading: bool,
}

impl ReloadGuard {
    /// Returns true only the first time.
    pub fn should_reload(&mut self) -> bool {
        if self.reloading {
            return false;
        }
        self.reloading = true;
        true
    }
}

/// Per-page worker state: the registration handle once registration succeeds,
/// the update toast, and the reload guard.
///
/// The registration handle is set once and never cleared; a page reload
/// builds a fresh context.
pub struct ServiceWorkerContext<F: Fetcher> {
    container: Arc<ServiceWorkerContainer<F>>,
    events: mpsc::UnboundedReceiver<ServiceWorkerEvent>,
    client_id: String,
    registration: Option<SharedRegistration>,
    toast: UpdateToast,
    reload: ReloadGuard,
}

impl<F: Fetcher> ServiceWorkerContext<F> {
    /// Connect a page at `url` to the container.
    pub async fn connect(
        container: Arc<ServiceWorkerContainer<F>>,
        events: mpsc::UnboundedReceiver<ServiceWorkerEvent>,
        url: &str,
    ) -> Result<Self> {
        let client = container.connect_page(url).await?;
        Ok(Self {
            container,
            events,
            client_id: client.id,
            registration: None,
            toast: UpdateToast::default(),
            reload: ReloadGuard::default(),
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn registration(&self) -> Option<&SharedRegistration> {
        self.registration.as_ref()
    }

    pub fn toast(&self) -> UpdateToast {
        self.toast
    }

    /// Register the worker and remember the registration.
    ///
    /// A registration failure is logged; the page keeps working without a worker.
    pub async fn register(&mut self, config: PwaConfig) -> Vec<PageAction> {
        match self.container.register(config).await {
            Ok(report) => {
                info!(stored = report.stored, "Service worker registered");
                let registration = self.container.registration();
                if registration.read().await.waiting.is_some() {
                    self.toast.show();
                }
                self.registration = Some(registration);
            }
            Err(e) => {
                error!(error = %e, "Service worker registration failed");
            }
        }
        self.pump().await
    }

    /// Handle every pending worker event.
    pub async fn pump(&mut self) -> Vec<PageAction> {
        let mut actions = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            if let Some(action) = self.handle_event(&event).await {
                actions.push(action);
            }
        }
        if self.toast.visible && !actions.contains(&PageAction::ShowUpdateToast) {
            actions.insert(0, PageAction::ShowUpdateToast);
        }
        actions.dedup();
        actions
    }

    async fn handle_event(&mut self, event: &ServiceWorkerEvent) -> Option<PageAction> {
        match event {
            ServiceWorkerEvent::StateChange {
                new_state: ServiceWorkerState::Installed,
                worker_id,
            } => {
                // A fresh install with no controller is the first install, not an update.
                let controlled = self.container.controller_of(&self.client_id).await.is_some();
                let still_waiting = self
                    .container
                    .registration()
                    .read()
                    .await
                    .waiting
                    .as_ref()
                    .is_some_and(|w| w.id == *worker_id);
                if controlled && still_waiting {
                    self.toast.show();
                    return Some(PageAction::ShowUpdateToast);
                }
                None
            }
            ServiceWorkerEvent::ControllerChange { client_id, .. } if *client_id == self.client_id => {
                if self.reload.should_reload() {
                    debug!(client = %self.client_id, "Controller changed, reloading");
                    Some(PageAction::Reload)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// "Update" button: tell the waiting worker to skip waiting.
    pub async fn apply_update(&mut self) -> Result<Vec<PageAction>> {
        let registration = self
            .registration
            .as_ref()
            .ok_or_not_found("service worker registration")?;

        let has_waiting = registration.read().await.waiting.is_some();
        if has_waiting {
            self.container
                .post_message(&WorkerMessage::SkipWaiting.to_json())
                .await?;
        }
        self.toast.dismiss();
        Ok(self.pump().await)
    }

    /// "Dismiss" button.
    pub fn dismiss_update(&mut self) {
        self.toast.dismiss();
    }
}
