// Copyright 2020 nytopop (Eric Izoita)
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! Proposal identifiers.
use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering::SeqCst},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// Identifies a node within a cluster.
pub type NodeId = u32;

/// Milliseconds since the unix epoch, or zero if the clock is set before it.
pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Identifies a single round of consensus.
///
/// The sequence number is derived from the wall clock at the time the round was started,
/// with the owning node folded into its low digits (`millis * MAX_NODES + node`). Because
/// of that composition, comparing sequence numbers alone orders ids exactly as comparing
/// `(seq, node)` does, and two ids share a sequence number only if they share an owner.
/// Equality and hashing nonetheless cover both fields, so a malformed id received off the
/// wire can never alias a round it doesn't belong to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProposalId {
    seq: u64,
    node: NodeId,
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.seq, self.node)
    }
}

impl ProposalId {
    /// Exclusive upper bound on node ids.
    pub const MAX_NODES: u32 = 1024;

    /// Reconstruct a proposal id from its parts.
    pub const fn new(seq: u64, node: NodeId) -> Self {
        Self { seq, node }
    }

    /// Returns the sequence number.
    pub const fn seq(&self) -> u64 {
        self.seq
    }

    /// Returns the id of the node that started this round.
    pub const fn node(&self) -> NodeId {
        self.node
    }

    /// Returns the wall clock time (as milliseconds since the unix epoch) at which this id
    /// was minted.
    pub const fn millis(&self) -> u64 {
        self.seq / Self::MAX_NODES as u64
    }

    /// Returns true if this id was minted more than `age` ago.
    pub(crate) fn older_than(&self, age: Duration) -> bool {
        self.millis() < unix_millis().saturating_sub(age.as_millis() as u64)
    }
}

/// Mints strictly increasing [ProposalId]s for a single node.
pub(crate) struct IdGen {
    node: NodeId,
    last: AtomicU64,
}

impl IdGen {
    pub(crate) fn new(node: NodeId) -> Self {
        assert!(node < ProposalId::MAX_NODES);
        Self {
            node,
            last: AtomicU64::new(0),
        }
    }

    /// Mint a new id. Ids minted within the same millisecond are pushed forward in time
    /// rather than repeated.
    pub(crate) fn next(&self) -> ProposalId {
        let now = unix_millis();
        let prev = (self.last)
            .fetch_update(SeqCst, SeqCst, |last| Some(now.max(last + 1)))
            .unwrap_or_else(|last| last);

        let millis = now.max(prev + 1);
        ProposalId::new(millis * ProposalId::MAX_NODES as u64 + self.node as u64, self.node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::{Arbitrary, Gen};
    use quickcheck_macros::quickcheck;

    impl Arbitrary for ProposalId {
        fn arbitrary(g: &mut Gen) -> Self {
            let node = u32::arbitrary(g) % ProposalId::MAX_NODES;
            let millis = u64::arbitrary(g) >> 12;
            Self::new(millis * ProposalId::MAX_NODES as u64 + node as u64, node)
        }
    }

    #[quickcheck]
    fn seq_order_agrees_with_full_order(a: ProposalId, b: ProposalId) -> bool {
        a.seq().cmp(&b.seq()) == a.cmp(&b)
    }

    #[quickcheck]
    fn equal_seqs_imply_equal_owners(a: ProposalId, b: ProposalId) -> bool {
        a.seq() != b.seq() || a == b
    }

    #[test]
    fn ids_with_different_owners_are_distinct() {
        assert_ne!(ProposalId::new(42, 1), ProposalId::new(42, 2));
    }

    #[test]
    fn minted_ids_are_strictly_increasing() {
        let gen = IdGen::new(3);
        let ids: Vec<_> = (0..1000).map(|_| gen.next()).collect();

        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert!(ids.iter().all(|id| id.node() == 3));
        assert!(ids.iter().all(|id| id.seq() % ProposalId::MAX_NODES as u64 == 3));
    }

    #[test]
    fn minted_ids_track_the_clock() {
        let before = unix_millis();
        let id = IdGen::new(0).next();
        assert!(id.millis() >= before);
        assert!(!id.older_than(Duration::from_secs(60)));
    }
}
