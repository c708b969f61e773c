// Copyright 2020 nytopop (Eric Izoita)
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! Node configuration.
use crate::paxos::{NodeId, ProposalId};
use rand::{thread_rng, Rng};
use std::{sync::Arc, time::Duration};

/// Specifies how often a node's acceptor fails, and how long it takes to come back.
///
/// An acceptor runs in work windows of random length between `min_window` and
/// `max_window`. At the end of each window it halts with probability `crash_probability`,
/// losing all of its state. A halted acceptor is restarted (with empty state) after
/// `recovery_delay`.
#[derive(Copy, Clone, Debug)]
pub struct FaultConfig {
    /// Shortest work window.
    ///
    /// Must be non-zero, and less than or equal to `max_window`.
    ///
    /// Defaults to 5s.
    pub min_window: Duration,

    /// Longest work window.
    ///
    /// Defaults to 15s.
    pub max_window: Duration,

    /// Probability of halting at the end of each work window.
    ///
    /// Must be within `0.0..=1.0`.
    ///
    /// Defaults to 0.05.
    pub crash_probability: f64,

    /// Delay between an acceptor halting and its replacement starting.
    ///
    /// Defaults to 5s.
    pub recovery_delay: Duration,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl FaultConfig {
    /// Returns the default configuration.
    pub const fn new() -> Self {
        Self {
            min_window: Duration::from_secs(5),
            max_window: Duration::from_secs(15),
            crash_probability: 0.05,
            recovery_delay: Duration::from_secs(5),
        }
    }

    /// Returns a configuration in which acceptors never fail on their own. They can still
    /// be crashed explicitly.
    pub const fn disabled() -> Self {
        Self {
            crash_probability: 0.0,
            ..Self::new()
        }
    }

    /// Pick the length of the next work window.
    pub(crate) fn sample_window(&self) -> Duration {
        thread_rng().gen_range(self.min_window..=self.max_window)
    }
}

/// Configuration for a single node.
#[derive(Clone, Debug)]
pub struct Config {
    pub(crate) id: NodeId,
    pub(crate) members: Arc<[NodeId]>,
    pub(crate) prepare_timeout: Duration,
    pub(crate) commit_timeout: Duration,
    pub(crate) broadcast_timeout: Duration,
    pub(crate) settled_retention: Duration,
    pub(crate) faults: FaultConfig,
}

impl Config {
    /// Create a configuration for node `id` in a cluster of `members`.
    ///
    /// # Panics
    /// Panics if `members` is empty, contains duplicates, doesn't contain `id`, or if any
    /// node id is at least [ProposalId::MAX_NODES].
    pub fn new<I: IntoIterator<Item = NodeId>>(id: NodeId, members: I) -> Self {
        let mut members: Vec<NodeId> = members.into_iter().collect();
        members.sort_unstable();

        assert!(!members.is_empty(), "cluster must have members");
        assert!(
            members.windows(2).all(|w| w[0] != w[1]),
            "cluster members must be unique"
        );
        assert!(members.binary_search(&id).is_ok(), "node must be a member");
        assert!(
            members.iter().all(|&m| m < ProposalId::MAX_NODES),
            "node ids must be less than {}",
            ProposalId::MAX_NODES
        );

        Self {
            id,
            members: members.into(),
            prepare_timeout: Duration::from_secs(30),
            commit_timeout: Duration::from_secs(60),
            broadcast_timeout: Duration::from_secs(20),
            settled_retention: Duration::from_secs(3600),
            faults: FaultConfig::new(),
        }
    }

    /// Returns this node's id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Returns the ids of every node in the cluster, in ascending order.
    pub fn members(&self) -> &[NodeId] {
        &self.members
    }

    /// Returns the number of nodes that constitute a majority of the cluster.
    pub fn quorum(&self) -> usize {
        self.members.len() / 2 + 1
    }

    /// Set how long a round may wait for a quorum of promises before it is abandoned.
    ///
    /// Defaults to 30s.
    pub fn prepare_timeout(mut self, timeout: Duration) -> Self {
        self.prepare_timeout = timeout;
        self
    }

    /// Set how long a write may wait for its round to be committed.
    ///
    /// Defaults to 60s.
    pub fn commit_timeout(mut self, timeout: Duration) -> Self {
        self.commit_timeout = timeout;
        self
    }

    /// Set how long a broadcast may wait for all of its sends to finish.
    ///
    /// Defaults to 20s.
    pub fn broadcast_timeout(mut self, timeout: Duration) -> Self {
        self.broadcast_timeout = timeout;
        self
    }

    /// Set how long committed rounds are remembered (and redundant messages for them
    /// recognized as such).
    ///
    /// Defaults to 1h.
    ///
    /// # Panics
    /// Panics if `retention` is zero.
    pub fn settled_retention(mut self, retention: Duration) -> Self {
        assert_ne!(Duration::from_secs(0), retention);
        self.settled_retention = retention;
        self
    }

    /// Configure acceptor fault injection.
    ///
    /// # Panics
    /// Panics if any invariants (listed at [FaultConfig]) are not upheld.
    pub fn faults(mut self, cfg: FaultConfig) -> Self {
        assert_ne!(Duration::from_secs(0), cfg.min_window);
        assert!(cfg.min_window <= cfg.max_window);
        assert!((0.0..=1.0).contains(&cfg.crash_probability));

        self.faults = cfg;
        self
    }
}
