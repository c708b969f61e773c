// Copyright 2020 nytopop (Eric Izoita)
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! Shared code referred to by multiple test modules.
#![allow(dead_code)]

use paxkv::{Config, FaultConfig, MemStore, Network, Node, NodeId, Store};
use simplelog::{LevelFilter, TestLogger};
use std::{sync::Arc, time::Duration};
use tokio::time::{sleep, timeout};

pub const JIFFY: Duration = Duration::from_millis(25);

pub fn init_logger() {
    let _ = TestLogger::init(LevelFilter::Info, simplelog::Config::default());
}

/// Returns a configuration for node `id` of an `n` node cluster, with short timeouts and
/// without random failures.
pub fn low_latency(id: NodeId, n: NodeId) -> Config {
    Config::new(id, 0..n)
        .prepare_timeout(Duration::from_millis(500))
        .commit_timeout(Duration::from_secs(1))
        .broadcast_timeout(Duration::from_millis(500))
        .faults(FaultConfig::disabled())
}

/// A cluster of nodes connected over a simulated network.
pub struct Cluster {
    pub net: Network,
    pub nodes: Vec<Arc<Node>>,
}

impl Cluster {
    /// Start an `n` node cluster, configured by `cfg`.
    pub async fn start<F: Fn(NodeId, NodeId) -> Config>(n: NodeId, cfg: F) -> Self {
        let net = Network::default();
        let mut nodes = Vec::new();

        for id in 0..n {
            let node = Node::start(
                cfg(id, n),
                Arc::new(MemStore::default()),
                Arc::new(net.transport(id)),
            )
            .await;

            net.attach(&node).await;
            nodes.push(node);
        }

        Self { net, nodes }
    }

    /// Blocks until every node agrees on the value of `key`, and returns it.
    pub async fn converged(&self, key: &str) -> Option<String> {
        let agree = async {
            loop {
                let mut values = self.nodes.iter().map(|n| n.store().get(key));
                let first = values.next().flatten();

                if values.all(|v| v == first) {
                    return first;
                }
                sleep(JIFFY).await;
            }
        };

        timeout(Duration::from_secs(5), agree)
            .await
            .expect("cluster never converged")
    }
}
