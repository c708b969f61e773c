// Copyright 2020 nytopop (Eric Izoita)
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! An in-process network, for running entire clusters inside one process.
use super::{Transport, TransportError};
use crate::{
    node::Node,
    paxos::{Message, NodeId},
};

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Weak},
};
use tokio::{sync::Mutex, task};

/// A simulated network.
///
/// Nodes are registered with [Network::attach], and send through the [LocalTransport]
/// returned by [Network::transport]. Any node may be cut off from the rest of the network
/// with [Network::block].
#[derive(Clone, Default)]
pub struct Network {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    nodes: HashMap<NodeId, Weak<Node>>,
    blocked: HashSet<NodeId>,
}

impl Network {
    /// Returns a transport that sends messages from node `id` over this network.
    pub fn transport(&self, id: NodeId) -> LocalTransport {
        LocalTransport {
            src: id,
            net: self.clone(),
        }
    }

    /// Make `node` reachable over this network.
    ///
    /// The network only holds a weak reference; dropping every other handle to the node
    /// detaches it.
    pub async fn attach(&self, node: &Arc<Node>) {
        let mut inner = self.inner.lock().await;
        inner.nodes.insert(node.id(), Arc::downgrade(node));
    }

    /// Make node `id` unreachable over this network.
    pub async fn detach(&self, id: NodeId) {
        let mut inner = self.inner.lock().await;
        inner.nodes.remove(&id);
    }

    /// Drop all messages sent to or from node `id`.
    pub async fn block(&self, id: NodeId) {
        let mut inner = self.inner.lock().await;
        inner.blocked.insert(id);
    }

    /// Stop dropping messages sent to or from node `id`.
    pub async fn allow(&self, id: NodeId) {
        let mut inner = self.inner.lock().await;
        inner.blocked.remove(&id);
    }
}

impl Inner {
    fn route(&self, src: NodeId, dst: NodeId) -> Result<Arc<Node>, TransportError> {
        if self.blocked.contains(&src) || self.blocked.contains(&dst) {
            return Err(TransportError::Blocked(dst));
        }

        (self.nodes.get(&dst))
            .and_then(Weak::upgrade)
            .ok_or(TransportError::Unreachable(dst))
    }
}

/// A node's handle to a [Network].
#[derive(Clone)]
pub struct LocalTransport {
    src: NodeId,
    net: Network,
}

#[crate::async_trait]
impl Transport for LocalTransport {
    async fn deliver(&self, to: NodeId, msg: Message) -> Result<(), TransportError> {
        let node = self.net.inner.lock().await.route(self.src, to)?;

        // handled on a task of its own, like an inbound rpc would be
        task::spawn(async move { node.handle_message(msg).await })
            .await
            .map_err(|_| TransportError::Unreachable(to))
    }
}
