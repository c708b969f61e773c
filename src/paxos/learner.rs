// Copyright 2020 nytopop (Eric Izoita)
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! The learner role.
use super::{Accepted, NodeId, Operation, ProposalId};
use crate::{collections::SettledFilter, store::Store};

use fnv::{FnvHashMap, FnvHashSet};
use log::{debug, info};
use std::{sync::Arc, time::Duration};
use tokio::sync::{oneshot, Mutex};

/// A round that this learner has just seen decided.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Decided {
    pub(crate) id: ProposalId,
    pub(crate) key: String,
}

struct Tallies {
    voters: FnvHashMap<ProposalId, FnvHashSet<NodeId>>,
    settled: SettledFilter,
    pending: FnvHashMap<ProposalId, oneshot::Sender<bool>>,
    /// The latest round applied to each key.
    applied: FnvHashMap<String, ProposalId>,
}

/// Tallies accepted messages, and applies each decided round to the store exactly once.
pub(crate) struct Learner {
    id: NodeId,
    quorum: usize,
    retention: Duration,
    store: Arc<dyn Store>,
    tallies: Mutex<Tallies>,
}

impl Learner {
    pub(crate) fn new(id: NodeId, quorum: usize, retention: Duration, store: Arc<dyn Store>) -> Self {
        let tallies = Tallies {
            voters: FnvHashMap::default(),
            settled: SettledFilter::new(retention),
            pending: FnvHashMap::default(),
            applied: FnvHashMap::default(),
        };

        Self {
            id,
            quorum,
            retention,
            store,
            tallies: Mutex::new(tallies),
        }
    }

    /// Register interest in the outcome of round `id`, which this node must have started.
    ///
    /// The returned receiver resolves to `true` once the round is committed locally.
    pub(crate) async fn register(&self, id: ProposalId) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        self.tallies.lock().await.pending.insert(id, tx);
        rx
    }

    /// Stop waiting on round `id`. Anyone still holding its receiver will see it as
    /// aborted.
    pub(crate) async fn unregister(&self, id: &ProposalId) {
        self.tallies.lock().await.pending.remove(id);
    }

    /// Count an accepted message. Returns the decided round if this message is the one
    /// that completed its quorum.
    pub(crate) async fn on_accepted(&self, accepted: Accepted) -> Option<Decided> {
        let Accepted {
            sender,
            id,
            key,
            value,
            op,
        } = accepted;

        debug!("{}: learner {} received ACCEPTED from {}", id, self.id, sender);

        let pending = {
            let mut t = self.tallies.lock().await;

            if t.settled.is_settled(&id) {
                return None;
            }

            let voters = t.voters.entry(id).or_default();
            voters.insert(sender);

            guard! { voters.len() >= self.quorum };

            t.voters.remove(&id);
            t.settled.settle(id);

            info!("{}: learner {} reached a quorum of accepts", id, self.id);

            // decisions for one key may be learned out of order; the latest round wins
            match t.applied.get(&key).copied().filter(|last| *last > id) {
                Some(last) => info!("{}: already applied {} to [key]{}, skipping", id, last, key),
                None => {
                    self.commit(op, &key, value);
                    t.applied.insert(key.clone(), id);
                }
            }

            t.pending.remove(&id)
        };

        // only the node that started a round has anyone waiting on it
        if id.node() == self.id {
            if let Some(tx) = pending {
                let _ = tx.send(true);
            }
        }

        Some(Decided { id, key })
    }

    fn commit(&self, op: Operation, key: &str, value: Option<String>) {
        match (op, value) {
            (Operation::Put, Some(value)) => {
                info!("learner {} committing PUT [key]{}", self.id, key);
                self.store.put(key, value);
            }
            (Operation::Put, None) => {
                info!("learner {} committing PUT [key]{} without a value", self.id, key);
            }
            (Operation::Delete, _) => {
                info!("learner {} committing DELETE [key]{}", self.id, key);
                self.store.delete(key);
            }
        }
    }

    /// Drop tallies for rounds that are too old to ever be decided here.
    ///
    /// Keys whose latest applied round is that old are forgotten too, as nothing older can
    /// be applied after it.
    pub(crate) async fn purge(&self) {
        let retention = self.retention;
        let mut t = self.tallies.lock().await;
        t.voters.retain(|id, _| !id.older_than(retention));
        t.applied.retain(|_, id| !id.older_than(retention));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{paxos::IdGen, store::MemStore};
    use quickcheck_macros::quickcheck;

    fn learner(me: NodeId) -> (Learner, Arc<MemStore>) {
        let store = Arc::new(MemStore::default());
        let l = Learner::new(me, 3, Duration::from_secs(3600), store.clone());
        (l, store)
    }

    fn accepted(id: ProposalId, sender: NodeId, value: Option<&str>, op: Operation) -> Accepted {
        Accepted {
            sender,
            id,
            key: "name".into(),
            value: value.map(str::to_owned),
            op,
        }
    }

    #[tokio::test]
    async fn commits_at_quorum_and_notifies_origin() {
        let (l, store) = learner(0);
        let id = IdGen::new(0).next();
        let mut rx = l.register(id).await;

        for sender in 1..=2 {
            let acc = accepted(id, sender, Some("Harry"), Operation::Put);
            assert_eq!(None, l.on_accepted(acc).await);
        }
        assert_eq!(None, store.get("name"));
        assert!(rx.try_recv().is_err());

        let decided = l.on_accepted(accepted(id, 3, Some("Harry"), Operation::Put)).await;
        assert_eq!(Some(id), decided.map(|d| d.id));
        assert_eq!(Some("Harry".to_owned()), store.get("name"));
        assert_eq!(Ok(true), rx.try_recv());
    }

    #[tokio::test]
    async fn other_nodes_learn_silently() {
        let (l, store) = learner(4);
        let id = IdGen::new(0).next();

        for sender in 0..3 {
            l.on_accepted(accepted(id, sender, Some("Harry"), Operation::Put)).await;
        }
        assert_eq!(Some("Harry".to_owned()), store.get("name"));
    }

    #[tokio::test]
    async fn deletes_are_applied() {
        let (l, store) = learner(0);
        store.put("name", "Harry".into());
        let id = IdGen::new(0).next();

        for sender in 0..3 {
            l.on_accepted(accepted(id, sender, None, Operation::Delete)).await;
        }
        assert_eq!(None, store.get("name"));
    }

    #[tokio::test]
    async fn unregistered_rounds_read_as_aborted() {
        let (l, _) = learner(0);
        let id = IdGen::new(0).next();
        let rx = l.register(id).await;

        l.unregister(&id).await;
        assert!(rx.await.is_err());
    }

    #[quickcheck_async::tokio]
    async fn commits_exactly_once(deliveries: Vec<u8>) -> bool {
        let (l, store) = learner(0);
        let id = IdGen::new(0).next();

        let mut senders = FnvHashSet::default();
        let mut decided = 0;
        for sender in deliveries {
            let sender = sender as NodeId % 5;
            senders.insert(sender);

            if l.on_accepted(accepted(id, sender, Some("v"), Operation::Put)).await.is_some() {
                decided += 1;
                // a commit applied twice would resurrect this key
                store.delete("name");
            }
        }

        let expected = if senders.len() >= 3 { 1 } else { 0 };
        decided == expected && store.get("name").is_none()
    }

    #[tokio::test]
    async fn older_decisions_never_overwrite_newer_ones() {
        let (l, store) = learner(4);
        let ids = IdGen::new(0);
        let (older, newer) = (ids.next(), ids.next());

        for sender in 0..3 {
            l.on_accepted(accepted(newer, sender, Some("new"), Operation::Put)).await;
        }
        for sender in 0..3 {
            l.on_accepted(accepted(older, sender, Some("old"), Operation::Put)).await;
        }
        assert_eq!(Some("new".to_owned()), store.get("name"));

        for sender in 0..3 {
            l.on_accepted(accepted(older, sender, None, Operation::Delete)).await;
        }
        assert_eq!(Some("new".to_owned()), store.get("name"));
    }

    #[tokio::test]
    async fn stale_tallies_are_purged() {
        let store = Arc::new(MemStore::default());
        let l = Learner::new(0, 3, Duration::from_millis(10), store);
        let id = IdGen::new(1).next();

        l.on_accepted(accepted(id, 1, Some("v"), Operation::Put)).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        l.purge().await;

        assert!(l.tallies.lock().await.voters.is_empty());
        // and the round can no longer be decided here
        for sender in 2..=4 {
            assert_eq!(None, l.on_accepted(accepted(id, sender, Some("v"), Operation::Put)).await);
        }
    }

    #[tokio::test]
    async fn applied_rounds_are_purged() {
        let store = Arc::new(MemStore::default());
        let l = Learner::new(0, 3, Duration::from_millis(10), store.clone());
        let ids = IdGen::new(1);
        let (older, newer) = (ids.next(), ids.next());

        for sender in 0..3 {
            l.on_accepted(accepted(newer, sender, None, Operation::Delete)).await;
        }
        assert_eq!(1, l.tallies.lock().await.applied.len());

        tokio::time::sleep(Duration::from_millis(30)).await;
        l.purge().await;
        assert!(l.tallies.lock().await.applied.is_empty());

        // rounds older than the forgotten one stay unapplied
        for sender in 0..3 {
            l.on_accepted(accepted(older, sender, Some("old"), Operation::Put)).await;
        }
        assert_eq!(None, store.get("name"));
    }
}
