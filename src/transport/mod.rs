// Copyright 2020 nytopop (Eric Izoita)
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! Delivery of consensus messages between nodes.
//!
//! A [Transport] only needs to get a [Message] to a named node; everything else (fan-out,
//! timeouts, logging of failures) is layered on top by the node itself.
pub mod grpc;
pub mod local;

use crate::paxos::{Message, NodeId};
use thiserror::Error;
use tonic::Status;

/// An error encountered while delivering a message to a single node.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No route to the node is known.
    #[error("node {} is not reachable", .0)]
    Unreachable(NodeId),

    /// The node is partitioned off by a simulated network.
    #[error("node {} is blocked by simulation", .0)]
    Blocked(NodeId),

    /// A connection to the node couldn't be made.
    #[error("failed to connect: {}", .0)]
    Connect(#[from] tonic::transport::Error),

    /// The node rejected the message.
    #[error("rpc failed: {}", .0)]
    Rpc(#[from] Status),
}

/// Directed delivery of consensus messages.
#[crate::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Deliver `msg` to the node identified by `to`, resolving once the receiving node
    /// has handled it.
    async fn deliver(&self, to: NodeId, msg: Message) -> Result<(), TransportError>;
}
