//! Per-domain serialized executor.
//!
//! Each active domain owns exactly one worker task. The worker drains its
//! meta-message queue in arrival order and is the only code that touches the
//! domain's durable store and subscriber set, which makes every mutation of
//! a domain race-free without further locking.
//!
//! A worker retires when its subscriber set is empty at the end of a work
//! cycle. Retirement takes the dispatcher's worker-map lock and re-checks
//! that the queue is empty under that lock; dispatch enqueues under the same
//! lock, so an enqueue is never lost to a retiring worker.

use crate::error::{CometDictError, Result};
use crate::hooks::Hooks;
use crate::push::PushCore;
use crate::store::db::{DomainDb, DomainTx};
use crate::store::{WorkerMap, SERVER_ORIGIN};
use crate::types::message::{KEY_CLIENTS, KEY_SUBSCRIBE, KEY_SYNCED, KEY_UNSUBSCRIBE};
use crate::types::{Command, DomainName, Message};
use bytes::Bytes;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Internal work item for a domain worker. Never crosses the wire.
#[derive(Debug)]
pub(crate) enum MetaMessage {
    /// Add a subscriber and replay current state to it.
    Subscribe { client_id: String },
    /// Remove a subscriber and notify the remaining ones.
    Unsubscribe { client_id: String },
    /// Apply a batch of mutations and broadcast the accepted ones.
    Messages {
        /// The submitting client, or [`SERVER_ORIGIN`] for server-origin
        /// mutations (which are broadcast to every subscriber).
        origin: Option<String>,
        batch: Vec<Message>,
    },
    /// Prune subscribers that are no longer connected to the push channel.
    CheckClients,
    /// Terminate after the in-flight cycle.
    Shutdown,
}

enum Flow {
    Continue,
    Stop,
}

pub(crate) struct DomainWorker {
    domain: DomainName,
    db: DomainDb,
    subscribers: BTreeSet<String>,
    rx: mpsc::UnboundedReceiver<MetaMessage>,
    push: Arc<PushCore>,
    hooks: Hooks,
    workers: WorkerMap,
    generation: u64,
}

impl DomainWorker {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        domain: DomainName,
        db: DomainDb,
        rx: mpsc::UnboundedReceiver<MetaMessage>,
        push: Arc<PushCore>,
        hooks: Hooks,
        workers: WorkerMap,
        generation: u64,
    ) -> Self {
        Self {
            domain,
            db,
            subscribers: BTreeSet::new(),
            rx,
            push,
            hooks,
            workers,
            generation,
        }
    }

    /// Drain the queue until shutdown or retirement. Dropping `self` closes
    /// the store handle.
    pub(crate) async fn run(mut self) {
        tracing::debug!(domain = %self.domain, "domain worker started");
        while let Some(meta) = self.rx.recv().await {
            match self.handle(meta) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => {
                    self.deregister();
                    break;
                }
                Err(e) => {
                    // A store failure here is a defect; exit cleanly so the
                    // next reference recreates the worker with a fresh handle.
                    self.hooks
                        .error(&format!("domain {} worker failed: {e}", self.domain));
                    self.deregister();
                    break;
                }
            }
            if self.subscribers.is_empty() && self.try_retire() {
                break;
            }
        }
        tracing::debug!(domain = %self.domain, "domain worker stopped");
    }

    fn handle(&mut self, meta: MetaMessage) -> Result<Flow> {
        match meta {
            MetaMessage::Subscribe { client_id } => {
                self.subscribe(client_id)?;
                Ok(Flow::Continue)
            }
            MetaMessage::Unsubscribe { client_id } => {
                self.drop_subscriber(&client_id)?;
                Ok(Flow::Continue)
            }
            MetaMessage::Messages { origin, batch } => {
                self.apply_batch(origin, batch)?;
                Ok(Flow::Continue)
            }
            MetaMessage::CheckClients => {
                self.prune_subscribers();
                Ok(Flow::Continue)
            }
            MetaMessage::Shutdown => Ok(Flow::Stop),
        }
    }

    /// Add a subscriber, replay the domain's current state to it, then
    /// announce it to the others.
    fn subscribe(&mut self, client_id: String) -> Result<()> {
        self.subscribers.insert(client_id.clone());
        self.hooks.subscribe(&client_id, self.domain.as_str());

        let mut replay: Vec<Message> = self
            .db
            .entries()?
            .into_iter()
            .map(|e| Message::create(self.domain.as_str(), e.key, e.value, e.version))
            .collect();
        let ids: Vec<&str> = self.subscribers.iter().map(String::as_str).collect();
        replay.push(Message::meta(
            self.domain.as_str(),
            KEY_CLIENTS,
            serde_json::to_string(&ids)?,
        ));
        replay.push(Message::meta(self.domain.as_str(), KEY_SYNCED, "true"));

        let payload = Bytes::from(serde_json::to_string(&replay)?);
        if self.push.queue(&client_id, payload).is_err() {
            // Gone before the replay reached it.
            self.drop_subscriber(&client_id)?;
            return Ok(());
        }

        let joined = vec![Message::meta(
            self.domain.as_str(),
            KEY_SUBSCRIBE,
            client_id.clone(),
        )];
        let notice = Bytes::from(serde_json::to_string(&joined)?);
        self.broadcast(notice, Some(client_id.as_str()))
    }

    /// Remove a subscriber, telling the remaining ones if it was present.
    fn drop_subscriber(&mut self, client_id: &str) -> Result<()> {
        if !self.subscribers.remove(client_id) {
            return Ok(());
        }
        let left = vec![Message::meta(
            self.domain.as_str(),
            KEY_UNSUBSCRIBE,
            client_id,
        )];
        self.broadcast(Bytes::from(serde_json::to_string(&left)?), None)
    }

    /// Apply one inbound batch under a single store transaction, then
    /// broadcast the accepted messages as one JSON array to every
    /// subscriber except the originator.
    fn apply_batch(&mut self, origin: Option<String>, batch: Vec<Message>) -> Result<()> {
        let mut accepted: Vec<Message> = Vec::new();
        let tx = self.db.begin()?;
        for msg in batch {
            match Self::apply_one(&tx, &msg) {
                Ok(()) => accepted.push(msg),
                Err(e) if e.is_collision() => self.hooks.collision(&msg),
                Err(e @ CometDictError::MalformedMessage(_)) => self.hooks.error(&e.to_string()),
                Err(e) => return Err(e),
            }
        }
        tx.commit()?;

        if accepted.is_empty() {
            return Ok(());
        }
        self.hooks.verbose(&format!(
            "domain {}: applied {} message(s) from {}",
            self.domain,
            accepted.len(),
            origin.as_deref().unwrap_or(SERVER_ORIGIN)
        ));
        let payload = Bytes::from(serde_json::to_string(&accepted)?);
        self.broadcast(payload, origin.as_deref())
    }

    /// Validate and persist a single message. Ephemeral keys skip the store
    /// entirely; persistent keys are guarded by existence and version
    /// checks against state that includes earlier writes of the same batch.
    fn apply_one(tx: &DomainTx<'_>, msg: &Message) -> Result<()> {
        let Some(command) = Command::parse(&msg.command) else {
            return Err(CometDictError::MalformedMessage(format!(
                "unknown command {:?} for key {:?}",
                msg.command, msg.key
            )));
        };
        if msg.is_ephemeral() {
            return Ok(());
        }
        match command {
            Command::Create => {
                let (Some(value), Some(version)) = (&msg.value, &msg.version) else {
                    return Err(CometDictError::MalformedMessage(format!(
                        "create of {:?} requires value and version",
                        msg.key
                    )));
                };
                if tx.get(&msg.key)?.is_some() {
                    return Err(CometDictError::CollisionCreate {
                        domain: msg.domain.clone(),
                        key: msg.key.clone(),
                    });
                }
                tx.put(&msg.key, value, version)
            }
            Command::Update => {
                let (Some(value), Some(version), Some(previous)) =
                    (&msg.value, &msg.version, &msg.previous_version)
                else {
                    return Err(CometDictError::MalformedMessage(format!(
                        "update of {:?} requires value, version and previous_version",
                        msg.key
                    )));
                };
                match tx.get(&msg.key)? {
                    Some((_, stored)) if stored == *previous => {
                        tx.put(&msg.key, value, version)
                    }
                    _ => Err(CometDictError::CollisionUpdate {
                        domain: msg.domain.clone(),
                        key: msg.key.clone(),
                    }),
                }
            }
            Command::Delete => {
                if tx.get(&msg.key)?.is_none() {
                    return Err(CometDictError::CollisionDelete {
                        domain: msg.domain.clone(),
                        key: msg.key.clone(),
                    });
                }
                tx.delete(&msg.key)
            }
        }
    }

    /// Queue a payload to every subscriber except `exclude`; each enqueue
    /// clones only the `Bytes` handle. A recipient whose enqueue fails has
    /// disappeared: it is removed and the remaining subscribers are told,
    /// which may cascade.
    fn broadcast(&mut self, payload: Bytes, exclude: Option<&str>) -> Result<()> {
        let mut lost: Vec<String> = Vec::new();
        let recipients: Vec<String> = self
            .subscribers
            .iter()
            .filter(|id| Some(id.as_str()) != exclude)
            .cloned()
            .collect();
        for id in recipients {
            if self.push.queue(&id, payload.clone()).is_err() {
                lost.push(id);
            }
        }
        for id in &lost {
            self.subscribers.remove(id);
        }
        for id in lost {
            tracing::debug!(domain = %self.domain, client = %id, "recipient lost during broadcast");
            let notice = vec![Message::meta(self.domain.as_str(), KEY_UNSUBSCRIBE, id)];
            self.broadcast(Bytes::from(serde_json::to_string(&notice)?), None)?;
        }
        Ok(())
    }

    /// Drop subscribers that are gone from the push channel.
    fn prune_subscribers(&mut self) {
        let gone: Vec<String> = self
            .subscribers
            .iter()
            .filter(|id| !self.push.present(id))
            .cloned()
            .collect();
        for id in gone {
            tracing::debug!(domain = %self.domain, client = %id, "pruning absent subscriber");
            self.subscribers.remove(&id);
        }
    }

    /// Retire if no enqueue slipped in. Both this check and dispatch run
    /// under the worker-map lock, so the two cannot interleave.
    fn try_retire(&mut self) -> bool {
        let mut workers = self.workers.lock();
        if !self.rx.is_empty() {
            return false;
        }
        if workers
            .get(self.domain.as_str())
            .is_some_and(|h| h.generation == self.generation)
        {
            workers.remove(self.domain.as_str());
        }
        true
    }

    /// Remove this worker's map entry unconditionally (shutdown and defect
    /// paths), so that subsequent traffic recreates the domain.
    fn deregister(&mut self) {
        let mut workers = self.workers.lock();
        if workers
            .get(self.domain.as_str())
            .is_some_and(|h| h.generation == self.generation)
        {
            workers.remove(self.domain.as_str());
        }
    }
}
