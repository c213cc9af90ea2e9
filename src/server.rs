//! Assembly of the two services with their disconnect wiring.
//!
//! The store must learn when a push client goes away, including implicit
//! watchdog disconnects, so [`Server::new`] chains the store's
//! `disconnected` behind whatever `on_disconnect` hook the embedder
//! supplied.

use crate::config::Config;
use crate::error::Result;
use crate::hooks::Hooks;
use crate::push::PushCore;
use crate::store::StoreCore;
use axum::Router;
use std::sync::{Arc, OnceLock};

/// Both services, wired together.
pub struct Server {
    pub push: Arc<PushCore>,
    pub store: Arc<StoreCore>,
}

impl Server {
    /// Build push and store over one configuration and one hook set.
    ///
    /// Every disconnect observed by the push channel, explicit or by
    /// watchdog, unsubscribes the client from all of its domains.
    pub fn new(config: &Config, hooks: Hooks) -> Result<Self> {
        config.validate()?;

        // The store does not exist yet when the push channel needs its
        // disconnect hook; the slot is filled right after construction.
        let store_slot: Arc<OnceLock<Arc<StoreCore>>> = Arc::new(OnceLock::new());
        let slot = store_slot.clone();
        let embedder_hooks = hooks.clone();
        let push_hooks = hooks.clone().on_disconnect(move |id| {
            if let Some(store) = slot.get() {
                store.disconnected(id);
            }
            embedder_hooks.disconnect(id);
        });

        let push = Arc::new(PushCore::new(config, push_hooks)?);
        let store = StoreCore::new(config, push.clone(), hooks)?;
        let _ = store_slot.set(store.clone());

        Ok(Self { push, store })
    }

    /// The HTTP surface for both services.
    #[must_use]
    pub fn router(&self, config: &Config) -> Router {
        crate::http::router(config, self.push.clone(), self.store.clone())
    }

    /// Drain and stop every domain worker.
    pub async fn shutdown(&self) {
        self.store.shutdown().await;
    }
}
