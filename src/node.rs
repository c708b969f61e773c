// Copyright 2020 nytopop (Eric Izoita)
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! Nodes of a replicated key-value store.
use crate::{
    config::Config,
    paxos::{
        acceptor::{Acceptor, Inbound},
        learner::{Decided, Learner},
        messenger::Messenger,
        monitor,
        proposer::{Progress, Proposer},
        Health, IdGen, Message, NodeId, Proposal, ProposalId,
    },
    reply::{Reply, Verb},
    store::Store,
    transport::Transport,
};

use fnv::FnvHashMap;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::{
    select,
    sync::{watch, Mutex},
    task,
    time::{interval, timeout},
};
use tracing::{info_span, Instrument};

/// A member of a replicated key-value store.
///
/// Reads are served from local storage. Writes are decided by a round of paxos among
/// every member of the cluster, and the caller waits (up to the configured commit
/// timeout) for the round to be committed locally.
///
/// Peer messages reach a node through [Node::handle_message], which is called by whatever
/// [Transport] the cluster communicates over.
pub struct Node {
    cfg: Config,
    store: Arc<dyn Store>,
    ids: IdGen,
    acceptor: Arc<Acceptor>,
    proposer: Proposer,
    learner: Arc<Learner>,
    inflight: Mutex<FnvHashMap<ProposalId, Proposal>>,
    shutdown: watch::Sender<bool>,
}

impl Drop for Node {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

impl Node {
    /// Start a node that stores data in `store` and talks to peers over `transport`.
    ///
    /// Background tasks (the acceptor and its supervisor) are spawned onto the current
    /// tokio runtime, and run until [Node::shutdown] is called or the node is dropped.
    /// The node accepts messages as soon as this resolves.
    pub async fn start(
        cfg: Config,
        store: Arc<dyn Store>,
        transport: Arc<dyn Transport>,
    ) -> Arc<Self> {
        let id = cfg.id();
        let quorum = cfg.quorum();

        let messenger = Arc::new(Messenger::new(
            transport,
            Arc::clone(&cfg.members),
            cfg.broadcast_timeout,
        ));

        let acceptor = Arc::new(Acceptor::new(id, Arc::clone(&messenger), cfg.faults));
        let proposer = Proposer::new(id, quorum, cfg.prepare_timeout, messenger);
        let learner = Arc::new(Learner::new(
            id,
            quorum,
            cfg.settled_retention,
            Arc::clone(&store),
        ));

        let (shutdown, _) = watch::channel(false);

        let inbox = acceptor.open().await;
        acceptor.set_health(Health::Running);
        task::spawn(monitor::supervise(
            Arc::clone(&acceptor),
            inbox,
            shutdown.subscribe(),
        ));
        task::spawn(purge_settled(
            Arc::clone(&learner),
            cfg.settled_retention,
            shutdown.subscribe(),
        ));

        info!("node {} started (cluster of {})", id, cfg.members().len());

        Arc::new(Self {
            ids: IdGen::new(id),
            cfg,
            store,
            acceptor,
            proposer,
            learner,
            inflight: Mutex::default(),
            shutdown,
        })
    }

    /// Returns this node's id.
    pub fn id(&self) -> NodeId {
        self.cfg.id()
    }

    /// Returns this node's configuration.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Returns the storage backing this node.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Returns the current health of this node's acceptor.
    pub fn acceptor_health(&self) -> Health {
        self.acceptor.health()
    }

    /// Subscribe to changes in the health of this node's acceptor.
    pub fn watch_acceptor_health(&self) -> watch::Receiver<Health> {
        self.acceptor.watch_health()
    }

    /// Crash this node's acceptor immediately, as if it had failed on its own.
    ///
    /// Work already queued ahead of the crash is processed first. The acceptor is restarted
    /// with no state after the configured recovery delay.
    pub async fn crash_acceptor(&self) {
        self.acceptor.enqueue(Inbound::Crash).await;
    }

    /// Stop this node's background tasks. Writes started after this will time out.
    pub fn shutdown(&self) {
        info!("node {} shutting down", self.id());
        let _ = self.shutdown.send(true);
    }

    /// Handle a message from a peer (or from this node itself).
    pub async fn handle_message(&self, msg: Message) {
        match msg {
            Message::Promise(promise) => {
                let proposal = self.inflight.lock().await.get(&promise.id).cloned();

                let p = match proposal {
                    Some(p) => p,
                    None => {
                        debug!("{}: dropping PROMISE for a finished round", promise.id);
                        return;
                    }
                };

                if let Progress::Counted(n) = self.proposer.on_promise(promise, &p).await {
                    debug!("{}: {} of {} promises", p.id, n, self.cfg.quorum());
                }
            }

            Message::Accepted(accepted) => {
                if let Some(Decided { id, key }) = self.learner.on_accepted(accepted).await {
                    self.acceptor.enqueue(Inbound::Retire { key, id }).await;
                }
            }

            msg => self.acceptor.enqueue(Inbound::Message(msg)).await,
        }
    }

    /// Read `key` from local storage.
    pub async fn get(&self, key: &str) -> Reply {
        if is_blank(key) {
            return Reply::failure(Verb::Get, "Key must not be null or empty.");
        }

        match self.store.get(key) {
            Some(value) => Reply::success(Verb::Get, format!("Key found: [key]{}", key))
                .with_data(value),
            None => Reply::failure(Verb::Get, format!("[key]{} not found", key)),
        }
    }

    /// Associate `value` with `key` across the cluster.
    ///
    /// A missing value is rejected, but an empty one is stored like any other.
    pub async fn put(&self, key: &str, value: Option<&str>) -> Reply {
        let value = match value {
            Some(value) if !is_blank(key) => value,
            _ => return Reply::failure(Verb::Put, "Key and value must not be null or empty."),
        };

        let p = Proposal::put(self.ids.next(), key.to_owned(), value.to_owned());
        self.write(p).await
    }

    /// Remove `key` across the cluster.
    ///
    /// Fails without starting a round if `key` is absent locally. That check can race
    /// with concurrent writes to the same key.
    pub async fn delete(&self, key: &str) -> Reply {
        if is_blank(key) {
            return Reply::failure(Verb::Delete, "Key must not be null or empty.");
        }

        if self.store.get(key).is_none() {
            return Reply::failure(Verb::Delete, format!("[key]{} not found", key));
        }

        let p = Proposal::delete(self.ids.next(), key.to_owned());
        self.write(p).await
    }

    async fn write(&self, proposal: Proposal) -> Reply {
        let span = info_span!(
            "round",
            id = %proposal.id,
            op = %proposal.op,
            key = %proposal.key,
        );

        self.drive(proposal).instrument(span).await
    }

    /// Run a round for `proposal` to completion, then tear down everything held for it.
    async fn drive(&self, proposal: Proposal) -> Reply {
        let (id, verb) = (proposal.id, Verb::from(proposal.op));
        let key = proposal.key.clone();

        let committed = self.learner.register(id).await;
        self.inflight.lock().await.insert(id, proposal.clone());
        tracing::debug!("round started");

        let round = async {
            self.proposer.prepare(&proposal).await;
            committed.await
        };
        let outcome = timeout(self.cfg.commit_timeout, round).await;
        let abandoned = self.proposer.is_abandoned(&id).await;

        self.inflight.lock().await.remove(&id);
        self.proposer.forget(&id).await;
        self.learner.unregister(&id).await;
        tracing::info!(committed = matches!(outcome, Ok(Ok(true))), "round finished");

        match outcome {
            Ok(Ok(true)) => match verb {
                Verb::Delete => Reply::success(verb, format!("[key]{} deleted", key)),
                _ => Reply::success(verb, format!("[key]{} added/updated", key)),
            },

            Ok(_) => {
                warn!("{}: round aborted", id);
                Reply::failure(verb, format!("[key]{} aborted", key))
            }

            Err(_) => {
                if abandoned {
                    warn!("{}: round timed out, no quorum of promises", id);
                } else {
                    warn!("{}: round timed out", id);
                }
                Reply::failure(verb, format!("[key]{} timed out", key))
            }
        }
    }
}

fn is_blank(key: &str) -> bool {
    key.trim().is_empty()
}

/// Periodically drop tallies for rounds too old to ever be decided.
async fn purge_settled(
    learner: Arc<Learner>,
    every: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticks = interval(every);

    loop {
        select! {
            _ = ticks.tick() => learner.purge().await,
            _ = shutdown.changed() => return,
        }
    }
}
