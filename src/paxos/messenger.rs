// Copyright 2020 nytopop (Eric Izoita)
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! Unicast and broadcast of consensus messages.
use super::{Message, NodeId};
use crate::transport::Transport;

use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, warn};
use std::{sync::Arc, time::Duration};
use tokio::time::timeout;

/// Sends messages on behalf of a single node's roles.
///
/// Failures are logged and dropped; nothing is ever retried. A round whose messages
/// don't get through simply fails to reach quorum and times out.
pub(crate) struct Messenger {
    transport: Arc<dyn Transport>,
    members: Arc<[NodeId]>,
    broadcast_timeout: Duration,
}

impl Messenger {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        members: Arc<[NodeId]>,
        broadcast_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            members,
            broadcast_timeout,
        }
    }

    /// Send `msg` to node `to`.
    pub(crate) async fn send(&self, to: NodeId, msg: Message) {
        let (id, kind) = (msg.id(), msg.kind());
        debug!("{}: sending {} to node {}", id, kind, to);

        if let Err(e) = self.transport.deliver(to, msg).await {
            warn!("{}: failed to send {} to node {}: {}", id, kind, to, e);
        }
    }

    /// Send `msg` to every member of the cluster (including ourselves), concurrently.
    ///
    /// Resolves once every send has finished, or the broadcast timeout elapses.
    pub(crate) async fn broadcast<M: Into<Message>>(&self, msg: M) {
        let msg = msg.into();
        let (id, kind) = (msg.id(), msg.kind());

        let sends = (self.members.iter())
            .map(|&to| self.send(to, msg.clone()))
            .collect::<FuturesUnordered<_>>()
            .for_each(|_| async {});

        if timeout(self.broadcast_timeout, sends).await.is_err() {
            warn!("{}: broadcast of {} timed out", id, kind);
        }
    }
}
