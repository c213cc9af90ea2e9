//! Replicated key-value store: named domains, durable per-domain maps,
//! broadcast replication to subscribed push clients.
//!
//! [`StoreCore`] owns the mapping from domain name to its worker. It parses
//! inbound batches, partitions them by domain and enqueues them; everything
//! that touches a domain's state happens on that domain's worker. Workers
//! are created lazily and retire themselves when their subscriber set
//! drains, so the map only ever holds active domains.

mod db;
mod worker;

use crate::config::Config;
use crate::error::{CometDictError, Result};
use crate::hooks::Hooks;
use crate::push::PushCore;
use crate::store::db::DomainDb;
use crate::store::worker::{DomainWorker, MetaMessage};
use crate::types::{DomainName, Message};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Name used for server-origin mutations in logs and hook output.
pub(crate) const SERVER_ORIGIN: &str = "server";

pub(crate) struct WorkerHandle {
    pub(crate) tx: mpsc::UnboundedSender<MetaMessage>,
    pub(crate) join: JoinHandle<()>,
    pub(crate) generation: u64,
}

/// Domain name to live worker. Dispatch and worker retirement serialize on
/// this lock; see `worker::DomainWorker::try_retire`.
pub(crate) type WorkerMap = Arc<Mutex<HashMap<String, WorkerHandle>>>;

/// The store service.
///
/// ```no_run
/// # async fn demo() -> comet_dict::Result<()> {
/// use std::sync::Arc;
/// use comet_dict::{Config, Hooks, PushCore, StoreCore};
///
/// let config = Config::new("/var/lib/comet-dict");
/// let push = Arc::new(PushCore::new(&config, Hooks::new())?);
/// let store = StoreCore::new(&config, push.clone(), Hooks::new())?;
///
/// push.connect("browser-1");
/// store.subscribe("browser-1", "notes")?;
/// store.create("notes", "title", "\"Groceries\"", "v1")?;
/// # Ok(())
/// # }
/// ```
pub struct StoreCore {
    push: Arc<PushCore>,
    hooks: Hooks,
    db_path: PathBuf,
    workers: WorkerMap,
    generation: AtomicU64,
    sweep: Mutex<Option<JoinHandle<()>>>,
}

impl StoreCore {
    /// Build the store and start its periodic client-liveness sweep.
    pub fn new(config: &Config, push: Arc<PushCore>, hooks: Hooks) -> Result<Arc<Self>> {
        std::fs::create_dir_all(&config.db_path)?;
        let core = Arc::new(Self {
            push,
            hooks,
            db_path: config.db_path.clone(),
            workers: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
            sweep: Mutex::new(None),
        });

        let weak = Arc::downgrade(&core);
        let period = config.check_period;
        let sweep = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await; // the first tick fires immediately
            loop {
                ticker.tick().await;
                let Some(core) = weak.upgrade() else { break };
                core.check_clients();
            }
        });
        *core.sweep.lock() = Some(sweep);
        Ok(core)
    }

    /// Parse a JSON array of messages from a client and enqueue each
    /// per-domain partition on its worker, preserving order within each
    /// partition.
    ///
    /// Elements missing `command`, `domain` or `key`, or naming an invalid
    /// domain, are reported through `on_error` and skipped; the rest of the
    /// batch proceeds. A body that is not a JSON array fails the call.
    pub fn messages(&self, client_id: &str, json: &str) -> Result<()> {
        let values: Vec<serde_json::Value> = serde_json::from_str(json).map_err(|e| {
            CometDictError::MalformedMessage(format!("messages body is not a JSON array: {e}"))
        })?;

        let mut partitions: Vec<(DomainName, Vec<Message>)> = Vec::new();
        for value in values {
            let msg: Message = match serde_json::from_value(value) {
                Ok(msg) => msg,
                Err(e) => {
                    self.hooks
                        .error(&format!("dropping malformed message from {client_id}: {e}"));
                    continue;
                }
            };
            let domain = match DomainName::new(msg.domain.as_str()) {
                Ok(domain) => domain,
                Err(e) => {
                    self.hooks
                        .error(&format!("dropping message from {client_id}: {e}"));
                    continue;
                }
            };
            match partitions.iter_mut().find(|(d, _)| *d == domain) {
                Some((_, batch)) => batch.push(msg),
                None => partitions.push((domain, vec![msg])),
            }
        }

        for (domain, batch) in partitions {
            self.dispatch(
                &domain,
                MetaMessage::Messages {
                    origin: Some(client_id.to_string()),
                    batch,
                },
            )?;
        }
        Ok(())
    }

    /// Subscribe a push client to a domain. The worker replays current
    /// state to the client and announces it to the other subscribers.
    pub fn subscribe(&self, client_id: &str, domain: &str) -> Result<()> {
        let domain = DomainName::new(domain)?;
        self.dispatch(
            &domain,
            MetaMessage::Subscribe {
                client_id: client_id.to_string(),
            },
        )
    }

    /// Unsubscribe a client from every known domain. Called when its push
    /// connection goes away.
    pub fn disconnected(&self, client_id: &str) {
        let workers = self.workers.lock();
        for handle in workers.values() {
            let _ = handle.tx.send(MetaMessage::Unsubscribe {
                client_id: client_id.to_string(),
            });
        }
    }

    /// Server-origin create. Requires a version token, like any other
    /// persistent mutation.
    pub fn create(&self, domain: &str, key: &str, value: &str, version: &str) -> Result<()> {
        let domain = DomainName::new(domain)?;
        let msg = Message::create(domain.as_str(), key, value, version);
        self.dispatch(
            &domain,
            MetaMessage::Messages {
                origin: None,
                batch: vec![msg],
            },
        )
    }

    /// Server-origin update.
    pub fn update(
        &self,
        domain: &str,
        key: &str,
        value: &str,
        previous_version: &str,
        version: &str,
    ) -> Result<()> {
        let domain = DomainName::new(domain)?;
        let msg = Message::update(domain.as_str(), key, value, previous_version, version);
        self.dispatch(
            &domain,
            MetaMessage::Messages {
                origin: None,
                batch: vec![msg],
            },
        )
    }

    /// Server-origin delete.
    pub fn delete(&self, domain: &str, key: &str) -> Result<()> {
        let domain = DomainName::new(domain)?;
        let msg = Message::delete(domain.as_str(), key);
        self.dispatch(
            &domain,
            MetaMessage::Messages {
                origin: None,
                batch: vec![msg],
            },
        )
    }

    /// Ask every live worker to prune subscribers that left the push
    /// channel without unsubscribing.
    pub fn check_clients(&self) {
        let workers = self.workers.lock();
        for handle in workers.values() {
            let _ = handle.tx.send(MetaMessage::CheckClients);
        }
    }

    /// Stop the sweep, ask every worker to terminate and wait for them.
    /// Workers finish their in-flight cycle first, so no accepted mutation
    /// is lost.
    pub async fn shutdown(&self) {
        if let Some(sweep) = self.sweep.lock().take() {
            sweep.abort();
        }
        let drained: Vec<WorkerHandle> = {
            let mut workers = self.workers.lock();
            workers.drain().map(|(_, handle)| handle).collect()
        };
        for handle in &drained {
            let _ = handle.tx.send(MetaMessage::Shutdown);
        }
        for handle in drained {
            let _ = handle.join.await;
        }
        tracing::info!("store shut down");
    }

    /// Enqueue on the domain's worker, creating it first if the domain has
    /// none or its worker has terminated. Runs entirely under the
    /// worker-map lock, which makes create-if-absent-or-dead atomic with
    /// respect to worker retirement.
    fn dispatch(&self, domain: &DomainName, meta: MetaMessage) -> Result<()> {
        let mut workers = self.workers.lock();

        let meta = match workers.get(domain.as_str()) {
            Some(handle) if !handle.tx.is_closed() => match handle.tx.send(meta) {
                Ok(()) => return Ok(()),
                Err(mpsc::error::SendError(meta)) => meta,
            },
            _ => meta,
        };

        let handle = self.spawn_worker(domain)?;
        let tx = handle.tx.clone();
        workers.insert(domain.as_str().to_string(), handle);
        tx.send(meta).map_err(|_| CometDictError::Shutdown)?;
        Ok(())
    }

    fn spawn_worker(&self, domain: &DomainName) -> Result<WorkerHandle> {
        let db = DomainDb::open(&self.db_path, domain)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let worker = DomainWorker::new(
            domain.clone(),
            db,
            rx,
            self.push.clone(),
            self.hooks.clone(),
            self.workers.clone(),
            generation,
        );
        let join = tokio::spawn(worker.run());
        Ok(WorkerHandle {
            tx,
            join,
            generation,
        })
    }

    #[cfg(test)]
    fn worker_count(&self) -> usize {
        self.workers.lock().len()
    }
}
