// Copyright 2020 nytopop (Eric Izoita)
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! The acceptor role.
//!
//! Each node runs exactly one acceptor worker, which drains a queue of inbound prepare and
//! propose messages one at a time. Every promise/accept decision a node makes is therefore
//! totally ordered, without any locking of the per-key state.
//!
//! The worker is deliberately unreliable: see [monitor](super::monitor) for how it fails
//! and how it is brought back.
use super::{
    messenger::Messenger, Accepted, Message, NodeId, Promise, Propose, Prepare, ProposalId,
};
use crate::config::FaultConfig;

use fnv::FnvHashMap;
use log::{debug, info, warn};
use rand::{thread_rng, Rng};
use std::sync::Arc;
use tokio::{
    sync::{mpsc, watch, Mutex},
    time::{timeout_at, Instant},
};

/// Whether a node's acceptor is currently participating in consensus.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Health {
    /// The worker is draining its queue.
    Running,
    /// The worker has halted and all of its state has been dropped.
    Crashed,
    /// The worker is waiting out its recovery delay.
    Recovering,
}

/// Work items for the acceptor worker.
#[derive(Debug)]
pub(crate) enum Inbound {
    Message(Message),
    /// The round `id` was decided for `key`; its value no longer needs to be recovered.
    Retire { key: String, id: ProposalId },
    /// Halt immediately, as if the node had failed.
    Crash,
}

/// Why an acceptor worker stopped.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Exit {
    Crashed,
    Closed,
}

/// Per-key acceptor state. Only the worker ever touches this, and it is dropped whenever
/// the worker halts.
#[derive(Default)]
pub(crate) struct State {
    promised: FnvHashMap<String, ProposalId>,
    accepted: FnvHashMap<String, (ProposalId, Option<String>)>,
}

impl State {
    /// Handle a prepare, returning the promise to send back to its proposer (if any).
    pub(crate) fn prepare(&mut self, me: NodeId, Prepare { id, key }: Prepare) -> Option<Promise> {
        if let Some(promised) = self.promised.get(&key) {
            guard! { id > *promised };
        }

        self.promised.insert(key.clone(), id);

        let (accepted_id, accepted_value) = match self.accepted.get(&key) {
            Some((aid, value)) => (Some(*aid), value.clone()),
            None => (None, None),
        };

        Some(Promise {
            sender: me,
            key,
            id,
            accepted_id,
            accepted_value,
        })
    }

    /// Handle a propose, returning the accepted message to broadcast (if any).
    pub(crate) fn propose(&mut self, me: NodeId, propose: Propose) -> Option<Accepted> {
        let Propose { id, key, value, op } = propose;

        // a later prepare may have superseded the round we promised
        guard! { self.promised.get(&key) == Some(&id) };
        // each round proposes once; a redelivered propose must not be accepted again
        guard! { self.accepted.get(&key).map(|(aid, _)| aid) != Some(&id) };

        self.accepted.insert(key.clone(), (id, value.clone()));

        Some(Accepted {
            sender: me,
            id,
            key,
            value,
            op,
        })
    }

    /// Forget the value accepted for `key` if it was accepted in round `id`.
    pub(crate) fn retire(&mut self, key: &str, id: ProposalId) -> bool {
        match self.accepted.get(key) {
            Some((aid, _)) if *aid == id => self.accepted.remove(key).is_some(),
            _ => false,
        }
    }
}

/// A node's acceptor: the handle through which messages reach the worker, and the worker
/// itself.
pub(crate) struct Acceptor {
    id: NodeId,
    messenger: Arc<Messenger>,
    faults: FaultConfig,
    inbox: Mutex<Option<mpsc::UnboundedSender<Inbound>>>,
    health: watch::Sender<Health>,
}

impl Acceptor {
    pub(crate) fn new(id: NodeId, messenger: Arc<Messenger>, faults: FaultConfig) -> Self {
        let (health, _) = watch::channel(Health::Recovering);

        Self {
            id,
            messenger,
            faults,
            inbox: Mutex::new(None),
            health,
        }
    }

    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn faults(&self) -> &FaultConfig {
        &self.faults
    }

    /// Returns the current health of the worker.
    pub(crate) fn health(&self) -> Health {
        *self.health.borrow()
    }

    /// Subscribe to changes in the worker's health.
    pub(crate) fn watch_health(&self) -> watch::Receiver<Health> {
        self.health.subscribe()
    }

    pub(crate) fn set_health(&self, health: Health) {
        // NOTE: this only fails if there are no receivers, which is fine.
        let _ = self.health.send(health);
    }

    /// Append a message to the worker's queue. Never blocks.
    ///
    /// Messages that arrive while the worker is down are dropped, as they would be by a
    /// node that isn't running.
    pub(crate) async fn enqueue(&self, item: Inbound) {
        let sent = match &*self.inbox.lock().await {
            Some(tx) => tx.send(item).is_ok(),
            None => false,
        };

        if !sent {
            debug!("acceptor {} is down, dropping inbound work", self.id);
        }
    }

    /// Open a fresh (empty) queue for a new worker, discarding the previous one.
    pub(crate) async fn open(&self) -> mpsc::UnboundedReceiver<Inbound> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.inbox.lock().await = Some(tx);
        rx
    }

    /// Stop accepting work. Anything still queued is lost.
    pub(crate) async fn close(&self) {
        self.inbox.lock().await.take();
    }

    /// Run a worker over `rx` with empty state until it crashes, or its queue is closed.
    ///
    /// The worker runs in windows of random length; at the end of each window it may halt
    /// with the configured probability.
    pub(crate) async fn run(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<Inbound>) -> Exit {
        let mut state = State::default();

        loop {
            let window = self.faults.sample_window();
            let deadline = Instant::now() + window;

            loop {
                let item = match timeout_at(deadline, rx.recv()).await {
                    Ok(Some(item)) => item,
                    Ok(None) => return Exit::Closed,
                    Err(_) => break,
                };

                match item {
                    Inbound::Message(msg) => self.process(&mut state, msg).await,
                    Inbound::Retire { key, id } => {
                        if state.retire(&key, id) {
                            debug!("{}: acceptor {} retired decided value", id, self.id);
                        }
                    }
                    Inbound::Crash => {
                        warn!("acceptor {} was crashed on request", self.id);
                        return Exit::Crashed;
                    }
                }
            }

            if thread_rng().gen_bool(self.faults.crash_probability) {
                warn!("acceptor {} simulated failure", self.id);
                return Exit::Crashed;
            }
        }
    }

    async fn process(&self, state: &mut State, msg: Message) {
        match msg {
            Message::Prepare(prepare) => {
                let id = prepare.id;
                match state.prepare(self.id, prepare) {
                    Some(promise) => self.messenger.send(id.node(), promise.into()).await,
                    None => info!(
                        "{}: acceptor {} withheld PROMISE from node {}",
                        id,
                        self.id,
                        id.node()
                    ),
                }
            }

            Message::Propose(propose) => {
                let id = propose.id;
                match state.propose(self.id, propose) {
                    Some(accepted) => self.messenger.broadcast(accepted).await,
                    None => info!("{}: acceptor {} withheld ACCEPTED", id, self.id),
                }
            }

            msg => warn!(
                "{}: acceptor {} can't handle {}",
                msg.id(),
                self.id,
                msg.kind()
            ),
        }
    }
}
