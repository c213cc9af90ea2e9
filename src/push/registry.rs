//! Client registry: the map of connected push clients.
//!
//! One [`ClientRecord`] exists per connected client. The registry owns the
//! records; every other component refers to clients by id and resolves
//! through the registry. All access goes through a single lock with short
//! critical sections, and the `on_connect` / `on_disconnect` hooks are
//! always invoked after that lock is released, so hooks may reenter the
//! registry freely.
//!
//! Each record has a watchdog task that disconnects the client once its
//! heartbeat goes silent for longer than `client_timeout`. The heartbeat is
//! refreshed by `connect` and by every `receive`.

use crate::hooks::Hooks;
use crate::push::inbox::{inbox, InboxReceiver, InboxSender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// State for one connected push client.
#[derive(Debug)]
pub(crate) struct ClientRecord {
    /// Producer half of the inbox; cloned by anyone queueing payloads.
    pub(crate) sender: InboxSender,
    /// Consumer half. The tokio mutex is the receive-exclusivity mutex:
    /// at most one receive call per client is ever in its wait phase.
    pub(crate) receiver: tokio::sync::Mutex<InboxReceiver>,
    /// Monotonic instant of the last connect or receive.
    last_heartbeat: Mutex<Instant>,
    /// Watchdog task handle, aborted on disconnect.
    watchdog: Mutex<Option<JoinHandle<()>>>,
}

impl ClientRecord {
    fn new() -> Self {
        let (sender, receiver) = inbox();
        Self {
            sender,
            receiver: tokio::sync::Mutex::new(receiver),
            last_heartbeat: Mutex::new(Instant::now()),
            watchdog: Mutex::new(None),
        }
    }

    /// Refresh the heartbeat. `Instant::now()` is monotonic, so the stored
    /// value never decreases.
    pub(crate) fn touch(&self) {
        *self.last_heartbeat.lock() = Instant::now();
    }

    pub(crate) fn heartbeat_age(&self) -> Duration {
        self.last_heartbeat.lock().elapsed()
    }
}

/// Thread-safe registry of connected push clients.
///
/// Cloning creates a new handle to the same client map; clones can be
/// handed to watchdog tasks and HTTP handlers alike.
#[derive(Clone)]
pub(crate) struct ClientRegistry {
    clients: Arc<Mutex<HashMap<String, Arc<ClientRecord>>>>,
    client_timeout: Duration,
    hooks: Hooks,
}

impl ClientRegistry {
    pub(crate) fn new(client_timeout: Duration, hooks: Hooks) -> Self {
        Self {
            clients: Arc::new(Mutex::new(HashMap::new())),
            client_timeout,
            hooks,
        }
    }

    /// Register a client. A second connect with the same id refreshes the
    /// heartbeat and succeeds without creating a duplicate record.
    pub(crate) fn connect(&self, id: &str) {
        let created = {
            let mut clients = self.clients.lock();
            if let Some(record) = clients.get(id) {
                record.touch();
                None
            } else {
                let record = Arc::new(ClientRecord::new());
                clients.insert(id.to_string(), record.clone());
                Some(record)
            }
        };

        if let Some(record) = created {
            let handle = self.spawn_watchdog(id.to_string());
            *record.watchdog.lock() = Some(handle);
            self.hooks.connect(id);
        }
    }

    /// Remove a client. Unknown ids succeed silently; calling twice is
    /// indistinguishable from calling once.
    pub(crate) fn disconnect(&self, id: &str) {
        let removed = self.clients.lock().remove(id);

        if let Some(record) = removed {
            if let Some(handle) = record.watchdog.lock().take() {
                handle.abort();
            }
            // Unblock a parked receive; it observes the disconnect and
            // returns an empty result.
            record.sender.wake();
            self.hooks.disconnect(id);
        }
    }

    pub(crate) fn get(&self, id: &str) -> Option<Arc<ClientRecord>> {
        self.clients.lock().get(id).cloned()
    }

    pub(crate) fn present(&self, id: &str) -> bool {
        self.clients.lock().contains_key(id)
    }

    /// Snapshot of the currently connected ids.
    pub(crate) fn iterate(&self) -> Vec<String> {
        self.clients.lock().keys().cloned().collect()
    }

    fn spawn_watchdog(&self, id: String) -> JoinHandle<()> {
        let registry = self.clone();
        let timeout = self.client_timeout;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(timeout);
            ticker.tick().await; // the first tick fires immediately
            loop {
                ticker.tick().await;
                let Some(record) = registry.get(&id) else {
                    break;
                };
                if record.heartbeat_age() > timeout {
                    tracing::info!(client = %id, "heartbeat expired, disconnecting");
                    registry.disconnect(&id);
                    break;
                }
            }
        })
    }
}
