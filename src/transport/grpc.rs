// Copyright 2020 nytopop (Eric Izoita)
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! Message delivery over grpc.
use super::{Transport, TransportError};
use crate::{
    paxos::{Message, NodeId},
    proto::{kv_node_client::KvNodeClient, Envelope},
};

use fnv::FnvHashMap;
use std::{net::SocketAddr, time::Duration};
use tonic::transport::Endpoint;

/// Delivers messages to peers by calling their `HandleMessage` rpc.
///
/// A fresh connection is made for each message.
#[derive(Clone, Debug)]
pub struct GrpcTransport {
    peers: FnvHashMap<NodeId, Endpoint>,
}

impl GrpcTransport {
    /// Create a transport that can reach each `(node, addr)` in `peers`. Calls to
    /// addresses that don't respond within `timeout` fail.
    pub fn new<I>(peers: I, timeout: Duration) -> Result<Self, TransportError>
    where I: IntoIterator<Item = (NodeId, SocketAddr)> {
        let peers = (peers.into_iter())
            .map(|(id, addr)| {
                let e = Endpoint::from_shared(format!("http://{}", addr))?
                    .connect_timeout(timeout)
                    .timeout(timeout);
                Ok((id, e))
            })
            .collect::<Result<_, TransportError>>()?;

        Ok(Self { peers })
    }
}

#[crate::async_trait]
impl Transport for GrpcTransport {
    async fn deliver(&self, to: NodeId, msg: Message) -> Result<(), TransportError> {
        let endpoint = self.peers.get(&to).ok_or(TransportError::Unreachable(to))?;

        let mut client = KvNodeClient::new(endpoint.connect().await?);
        client.handle_message(Envelope::from(msg)).await?;

        Ok(())
    }
}
