// Copyright 2020 nytopop (Eric Izoita)
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
mod shared;

use paxkv::{FaultConfig, Health, NodeId};
use shared::{init_logger, low_latency, Cluster};
use std::time::Duration;
use tokio::time::timeout;

fn slow_recovery(id: NodeId, n: NodeId) -> paxkv::Config {
    low_latency(id, n).faults(FaultConfig {
        recovery_delay: Duration::from_secs(30),
        ..FaultConfig::disabled()
    })
}

async fn wait_for_health(c: &Cluster, i: usize, want: Health) {
    let mut rx = c.nodes[i].watch_acceptor_health();

    timeout(Duration::from_secs(2), async {
        while *rx.borrow() != want {
            rx.changed().await.unwrap();
        }
    })
    .await
    .expect("acceptor never reached the expected health");
}

/// Tests that a cluster keeps deciding writes while a minority of its acceptors are down.
#[tokio::test]
async fn minority_acceptor_failures_are_tolerated() {
    init_logger();
    let c = Cluster::start(5, slow_recovery).await;

    for i in 0..2 {
        c.nodes[i].crash_acceptor().await;
        wait_for_health(&c, i, Health::Recovering).await;
    }

    let r = c.nodes[0].put("name", Some("Harry")).await;
    assert_eq!("Success: PUT - [key]name added/updated", r.to_string());
    assert_eq!(Some("Harry".to_owned()), c.converged("name").await);
}

/// Tests that writes time out once a majority of acceptors are down.
#[tokio::test]
async fn majority_acceptor_failures_time_out() {
    init_logger();
    let c = Cluster::start(5, slow_recovery).await;

    for i in 2..5 {
        c.nodes[i].crash_acceptor().await;
        wait_for_health(&c, i, Health::Recovering).await;
    }

    let r = c.nodes[0].put("name", Some("Harry")).await;
    assert_eq!("Failure: PUT - [key]name timed out", r.to_string());

    // nothing was decided, so nothing was learned
    assert_eq!(None, c.converged("name").await);
}

/// Tests that crashed acceptors come back, and take part in rounds again.
#[tokio::test]
async fn crashed_acceptors_recover() {
    init_logger();
    let c = Cluster::start(5, |id, n| {
        low_latency(id, n).faults(FaultConfig {
            recovery_delay: Duration::from_millis(200),
            ..FaultConfig::disabled()
        })
    })
    .await;

    for i in 0..3 {
        c.nodes[i].crash_acceptor().await;
        wait_for_health(&c, i, Health::Recovering).await;
    }
    for i in 0..3 {
        wait_for_health(&c, i, Health::Running).await;
    }
    assert_eq!(Health::Running, c.nodes[0].acceptor_health());

    assert!(c.nodes[4].put("k", Some("v")).await.is_success());
    assert_eq!(Some("v".to_owned()), c.converged("k").await);
}

/// Tests that a node cut off from the rest of the cluster can't decide writes, and that
/// it can once the partition heals.
#[tokio::test]
async fn partitioned_majorities_block_writes() {
    init_logger();
    let c = Cluster::start(5, low_latency).await;

    for id in 2..5 {
        c.net.block(id).await;
    }

    let r = c.nodes[0].put("k", Some("v")).await;
    assert_eq!("Failure: PUT - [key]k timed out", r.to_string());

    for id in 2..5 {
        c.net.allow(id).await;
    }

    assert!(c.nodes[0].put("k", Some("w")).await.is_success());
    assert_eq!(Some("w".to_owned()), c.converged("k").await);
}

/// Tests that clients retrying through random acceptor failures eventually get their
/// writes decided, and that the cluster agrees on the result.
#[tokio::test]
async fn random_failures_are_survivable() {
    init_logger();
    let c = Cluster::start(5, |id, n| {
        low_latency(id, n).faults(FaultConfig {
            min_window: Duration::from_millis(20),
            max_window: Duration::from_millis(40),
            crash_probability: 0.2,
            recovery_delay: Duration::from_millis(30),
        })
    })
    .await;

    let mut decided = false;
    for attempt in 0..10 {
        let node = &c.nodes[attempt % 5];
        if node.put("k", Some("v")).await.is_success() {
            decided = true;
            break;
        }
    }

    assert!(decided);
    assert_eq!(Some("v".to_owned()), c.converged("k").await);
}
