// Copyright 2020 nytopop (Eric Izoita)
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! The proposer role.
//!
//! A proposer drives the rounds its node starts: it broadcasts the prepare, tallies the
//! promises that come back, and once a majority has promised, broadcasts a propose for
//! either the value it was asked to write, or a value some acceptor has already accepted.
use super::{messenger::Messenger, NodeId, Promise, Proposal, ProposalId, Propose};

use fnv::{FnvHashMap, FnvHashSet};
use log::{debug, info};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::Mutex,
    task::{self, JoinHandle},
    time::sleep,
};

/// The tally of promises received for a single round.
struct Round {
    voters: FnvHashSet<NodeId>,
    /// The promise with the most recently accepted round seen so far.
    best: Option<Promise>,
    timer: Option<JoinHandle<()>>,
    abandoned: bool,
}

impl Round {
    /// Keep `promise` if it carries a more recently accepted round than the one we have.
    fn offer(&mut self, promise: Promise) {
        match &self.best {
            Some(best) if promise.accepted_id <= best.accepted_id => {}
            _ => self.best = Some(promise),
        }
    }

    /// Returns the propose to broadcast for `proposal` once this round has a quorum.
    ///
    /// If any promise carried a previously accepted value, that value must be proposed in
    /// place of our own.
    fn propose(&self, proposal: &Proposal) -> Propose {
        let recovered = (self.best.as_ref())
            .filter(|p| p.accepted_id.is_some())
            .and_then(|p| p.accepted_value.clone());

        let value = match recovered {
            Some(value) => {
                info!("{}: recovered previously accepted value", proposal.id);
                Some(value)
            }
            None => proposal.value.clone(),
        };

        Propose {
            id: proposal.id,
            key: proposal.key.clone(),
            value,
            op: proposal.op,
        }
    }
}

impl Drop for Round {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// The outcome of handling a promise.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Progress {
    /// The round is unknown or abandoned, or this promise was a duplicate.
    Ignored,
    /// The promise was counted, and the round still needs more.
    Counted(usize),
    /// This promise completed the quorum; the propose has been broadcast.
    Proposed,
    /// The round already had a quorum.
    Surplus,
}

pub(crate) struct Proposer {
    id: NodeId,
    quorum: usize,
    prepare_timeout: Duration,
    messenger: Arc<Messenger>,
    rounds: Arc<Mutex<FnvHashMap<ProposalId, Round>>>,
}

impl Proposer {
    pub(crate) fn new(
        id: NodeId,
        quorum: usize,
        prepare_timeout: Duration,
        messenger: Arc<Messenger>,
    ) -> Self {
        Self {
            id,
            quorum,
            prepare_timeout,
            messenger,
            rounds: Arc::default(),
        }
    }

    /// Start a round for `proposal` by broadcasting its prepare.
    ///
    /// Promises are only counted for rounds started here and not yet forgotten.
    pub(crate) async fn prepare(&self, proposal: &Proposal) {
        self.rounds.lock().await.insert(
            proposal.id,
            Round {
                voters: FnvHashSet::default(),
                best: None,
                timer: None,
                abandoned: false,
            },
        );

        info!("{}: proposer {} is preparing", proposal.id, self.id);
        self.messenger.broadcast(proposal.prepare()).await;
    }

    /// Count a promise received for `proposal`'s round. If it completes a quorum, broadcast
    /// the round's propose.
    pub(crate) async fn on_promise(&self, promise: Promise, proposal: &Proposal) -> Progress {
        let id = promise.id;

        let propose = {
            let mut rounds = self.rounds.lock().await;

            let round = match rounds.get_mut(&id) {
                Some(round) => round,
                None => {
                    debug!("{}: ignoring promise for unknown round", id);
                    return Progress::Ignored;
                }
            };

            if round.abandoned {
                debug!("{}: ignoring promise for abandoned round", id);
                return Progress::Ignored;
            }

            // the first promise for a round starts its timeout
            if round.voters.is_empty() && round.timer.is_none() {
                round.timer = Some(self.arm_timeout(id));
            }
            if !round.voters.insert(promise.sender) {
                debug!("{}: ignoring duplicate promise from {}", id, promise.sender);
                return Progress::Ignored;
            }

            let votes = round.voters.len();
            if votes > self.quorum {
                debug!("{}: promise quorum already reached", id);
                return Progress::Surplus;
            }

            round.offer(promise);

            if votes < self.quorum {
                return Progress::Counted(votes);
            }

            if let Some(timer) = round.timer.take() {
                timer.abort();
            }

            round.propose(proposal)
        };

        info!("{}: proposer {} reached quorum, proposing", id, self.id);
        self.messenger.broadcast(propose).await;
        Progress::Proposed
    }

    /// Abandon round `id` if it doesn't gather a quorum of promises in time.
    fn arm_timeout(&self, id: ProposalId) -> JoinHandle<()> {
        let rounds = Arc::clone(&self.rounds);
        let (quorum, after) = (self.quorum, self.prepare_timeout);

        task::spawn(async move {
            sleep(after).await;

            let mut rounds = rounds.lock().await;
            if let Some(round) = rounds.get_mut(&id) {
                if round.voters.len() < quorum {
                    info!("{}: timed out without a quorum of promises", id);
                    round.abandoned = true;
                    round.timer = None;
                }
            }
        })
    }

    /// Returns true if round `id` has been abandoned.
    pub(crate) async fn is_abandoned(&self, id: &ProposalId) -> bool {
        (self.rounds.lock().await)
            .get(id)
            .map(|r| r.abandoned)
            .unwrap_or(false)
    }

    /// Drop all state associated with round `id`, cancelling its timeout.
    pub(crate) async fn forget(&self, id: &ProposalId) {
        self.rounds.lock().await.remove(id);
    }
}
