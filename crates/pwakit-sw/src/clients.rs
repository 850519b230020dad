//! Clients API: the pages a worker can control.

use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use pwakit_common::{PwaError, Result};
use tracing::debug;
use url::Url;

use crate::lifecycle::ServiceWorkerId;

/// A window client (controlled or uncontrolled page).
#[derive(Debug, Clone)]
pub struct Client {
    /// Client ID.
    pub id: String,

    /// Client URL.
    pub url: Url,

    /// Worker currently controlling this client.
    pub controller: Option<ServiceWorkerId>,
}

/// Clients API.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<String, Client>,
}

impl Clients {
    /// Create new clients manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a client by ID.
    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    /// Open a window client, optionally already controlled.
    pub fn open_window(&mut self, url: &str, controller: Option<ServiceWorkerId>) -> Result<Client> {
        let url = Url::parse(url)?;
        if url.cannot_be_a_base() {
            return Err(PwaError::InvalidArgument(format!("not a page URL: {url}")));
        }

        static COUNTER: AtomicU64 = AtomicU64::new(1);
        let id = format!("client-{}", COUNTER.fetch_add(1, Ordering::Relaxed));

        let client = Client {
            id: id.clone(),
            url,
            controller,
        };

        self.clients.insert(id, client.clone());
        Ok(client)
    }

    /// Make `worker` the controller of every client in `scope`.
    ///
    /// Returns the IDs of clients whose controller changed.
    pub fn claim(&mut self, scope: &Url, worker: ServiceWorkerId) -> Vec<String> {
        let mut claimed = Vec::new();

        for client in self.clients.values_mut() {
            if !client.url.as_str().starts_with(scope.as_str()) || client.controller == Some(worker) {
                continue;
            }
            client.controller = Some(worker);
            claimed.push(client.id.clone());
        }

        claimed.sort();
        debug!(worker = worker.raw(), claimed = claimed.len(), "Clients claimed");
        claimed
    }
}
