//! Push channel: per-client server-to-client message queues drained by
//! repeated blocking HTTP reads.
//!
//! A browser connects once, then loops on `receive`, which parks the request
//! until a payload arrives or `receive_timeout` elapses. Producers append
//! through [`PushCore::queue`], which never blocks. Liveness is tracked by a
//! heartbeat refreshed on every receive; a watchdog disconnects clients that
//! go silent for longer than `client_timeout`.
//!
//! The receive path holds a per-client tokio mutex across its wait, which is
//! how the single-receiver-per-client guarantee is enforced. That guarantee
//! is a correctness requirement: two receivers sharing one queue would race
//! for wake sentinels.

mod inbox;
mod registry;

use crate::config::Config;
use crate::error::{CometDictError, Result};
use crate::hooks::Hooks;
use crate::push::inbox::InboxItem;
use crate::push::registry::ClientRegistry;
use bytes::Bytes;
use std::time::Duration;

/// The push channel service.
///
/// ```no_run
/// # async fn demo() -> comet_dict::Result<()> {
/// use comet_dict::{Config, Hooks, PushCore};
///
/// let push = PushCore::new(&Config::new("/tmp/dbs"), Hooks::new())?;
/// push.connect("browser-1");
/// push.queue("browser-1", "[{\"hello\":true}]")?;
/// let body = push.receive("browser-1").await?;
/// assert!(body.is_some());
/// # Ok(())
/// # }
/// ```
pub struct PushCore {
    registry: ClientRegistry,
    receive_timeout: Duration,
}

impl PushCore {
    /// Build the push channel from configuration.
    ///
    /// Fails if `receive_timeout >= client_timeout`; a receive that blocks
    /// past the watchdog deadline would disconnect every well-behaved
    /// client.
    pub fn new(config: &Config, hooks: Hooks) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            registry: ClientRegistry::new(config.client_timeout, hooks),
            receive_timeout: config.receive_timeout,
        })
    }

    /// Register a client. Reconnecting an already-known id refreshes its
    /// heartbeat and succeeds without side effects.
    pub fn connect(&self, id: &str) {
        self.registry.connect(id);
    }

    /// Remove a client and wake any parked receive. Unknown ids succeed
    /// silently.
    pub fn disconnect(&self, id: &str) {
        self.registry.disconnect(id);
    }

    /// Append a payload to a client's inbox. Non-blocking; payload order is
    /// first-come-first-served at the queue. Broadcasting one payload to
    /// many clients clones only the [`Bytes`] handle.
    pub fn queue(&self, id: &str, payload: impl Into<Bytes>) -> Result<()> {
        let record = self
            .registry
            .get(id)
            .ok_or_else(|| CometDictError::UnknownClient(id.to_string()))?;
        record.sender.push(payload.into());
        Ok(())
    }

    /// Wait for the next payload.
    ///
    /// Returns `Ok(Some(payload))` when a message arrives and `Ok(None)` on
    /// timeout, flush or disconnect. Overlapping receives for one id are
    /// serialized; the later call may wait through the earlier one and then
    /// observe a disconnect.
    pub async fn receive(&self, id: &str) -> Result<Option<Bytes>> {
        let record = self
            .registry
            .get(id)
            .ok_or_else(|| CometDictError::UnknownClient(id.to_string()))?;
        record.touch();

        let mut receiver = record.receiver.lock().await;
        match tokio::time::timeout(self.receive_timeout, receiver.recv()).await {
            Err(_elapsed) => Ok(None),
            Ok(None) | Ok(Some(InboxItem::Wake)) => Ok(None),
            Ok(Some(InboxItem::Payload(payload))) => Ok(Some(payload)),
        }
    }

    /// Wake an in-flight receive with an empty result. Future receives
    /// proceed normally.
    pub fn flush(&self, id: &str) -> Result<()> {
        let record = self
            .registry
            .get(id)
            .ok_or_else(|| CometDictError::UnknownClient(id.to_string()))?;
        record.sender.wake();
        Ok(())
    }

    /// Whether the id is currently registered.
    #[must_use]
    pub fn present(&self, id: &str) -> bool {
        self.registry.present(id)
    }

    /// Snapshot of the currently connected client ids.
    #[must_use]
    pub fn iterate(&self) -> Vec<String> {
        self.registry.iterate()
    }
}
