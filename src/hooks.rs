//! Notification hooks.
//!
//! Embedders observe the lifecycle of the system through a small set of
//! optional callbacks. Every hook has a reasonable default: lifecycle events
//! fall back to `tracing` at debug level, errors to `tracing::error!`, and
//! collisions to `tracing::warn!`.
//!
//! Hooks are invoked synchronously but never while an internal lock is held,
//! so a hook may call back into the system (for example, disconnect a client
//! from `on_error`) without deadlocking.
//!
//! ```
//! use comet_dict::Hooks;
//!
//! let hooks = Hooks::new()
//!     .on_connect(|id| println!("hello {id}"))
//!     .on_collision(|msg| println!("dropped stale write to {}", msg.key));
//! ```

use crate::types::Message;
use std::fmt;
use std::sync::Arc;

type ClientFn = Arc<dyn Fn(&str) + Send + Sync>;
type SubscribeFn = Arc<dyn Fn(&str, &str) + Send + Sync>;
type TextFn = Arc<dyn Fn(&str) + Send + Sync>;
type CollisionFn = Arc<dyn Fn(&Message) + Send + Sync>;

/// Optional notification callbacks, cheap to clone and share.
#[derive(Clone, Default)]
pub struct Hooks {
    connect: Option<ClientFn>,
    disconnect: Option<ClientFn>,
    subscribe: Option<SubscribeFn>,
    verbose: Option<TextFn>,
    error: Option<TextFn>,
    collision: Option<CollisionFn>,
}

impl Hooks {
    /// A hook set where every callback is the default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with the client id after a new push client registers.
    #[must_use]
    pub fn on_connect(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.connect = Some(Arc::new(f));
        self
    }

    /// Called with the client id after a push client is removed,
    /// whether explicitly or by watchdog expiration.
    #[must_use]
    pub fn on_disconnect(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.disconnect = Some(Arc::new(f));
        self
    }

    /// Called with `(client_id, domain)` when a subscription is taken.
    #[must_use]
    pub fn on_subscribe(mut self, f: impl Fn(&str, &str) + Send + Sync + 'static) -> Self {
        self.subscribe = Some(Arc::new(f));
        self
    }

    /// Called with diagnostic chatter.
    #[must_use]
    pub fn on_verbose(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.verbose = Some(Arc::new(f));
        self
    }

    /// Called with a description of every rejected message or internal defect.
    #[must_use]
    pub fn on_error(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.error = Some(Arc::new(f));
        self
    }

    /// Called with the offending message when an optimistic-concurrency
    /// check fails. The message has been skipped; the rest of its batch
    /// proceeds.
    #[must_use]
    pub fn on_collision(mut self, f: impl Fn(&Message) + Send + Sync + 'static) -> Self {
        self.collision = Some(Arc::new(f));
        self
    }

    pub(crate) fn connect(&self, id: &str) {
        match &self.connect {
            Some(f) => f(id),
            None => tracing::debug!(client = id, "client connected"),
        }
    }

    pub(crate) fn disconnect(&self, id: &str) {
        match &self.disconnect {
            Some(f) => f(id),
            None => tracing::debug!(client = id, "client disconnected"),
        }
    }

    pub(crate) fn subscribe(&self, id: &str, domain: &str) {
        match &self.subscribe {
            Some(f) => f(id, domain),
            None => tracing::debug!(client = id, domain, "client subscribed"),
        }
    }

    pub(crate) fn verbose(&self, msg: &str) {
        match &self.verbose {
            Some(f) => f(msg),
            None => tracing::debug!("{msg}"),
        }
    }

    pub(crate) fn error(&self, msg: &str) {
        match &self.error {
            Some(f) => f(msg),
            None => tracing::error!("{msg}"),
        }
    }

    pub(crate) fn collision(&self, msg: &Message) {
        match &self.collision {
            Some(f) => f(msg),
            None => tracing::warn!(
                domain = %msg.domain,
                key = %msg.key,
                command = %msg.command,
                "collision, message dropped"
            ),
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("connect", &self.connect.is_some())
            .field("disconnect", &self.disconnect.is_some())
            .field("subscribe", &self.subscribe.is_some())
            .field("verbose", &self.verbose.is_some())
            .field("error", &self.error.is_some())
            .field("collision", &self.collision.is_some())
            .finish()
    }
}
