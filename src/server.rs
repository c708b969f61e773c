// Copyright 2020 nytopop (Eric Izoita)
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! The grpc surface of a [Node].
use crate::{
    node::Node,
    proto::{
        kv_node_server::{KvNode, KvNodeServer},
        Ack, DeleteReq, Envelope, GetReq, PutReq, Reply as WireReply,
    },
    reply::Reply,
};

use log::info;
use std::{future::Future, net::SocketAddr, sync::Arc};
use tonic::{
    transport::{self, Server},
    Request, Response, Status,
};

type GrpcResponse<T> = Result<Response<T>, Status>;

/// Serves client requests and peer messages for a [Node].
#[derive(Clone)]
pub struct KvService {
    node: Arc<Node>,
}

impl KvService {
    /// Create a service backed by `node`.
    pub fn new(node: Arc<Node>) -> Self {
        Self { node }
    }

    /// Wrap this service for use with a [tonic] server.
    pub fn into_service(self) -> KvNodeServer<Self> {
        KvNodeServer::new(self)
    }
}

fn reply(r: Reply) -> GrpcResponse<WireReply> {
    Ok(Response::new(WireReply {
        body: r.to_string(),
    }))
}

#[crate::async_trait]
impl KvNode for KvService {
    async fn get(&self, req: Request<GetReq>) -> GrpcResponse<WireReply> {
        let GetReq { client_id, key } = req.into_inner();
        info!("GET from client {}: [key]{}", client_id, key);

        reply(self.node.get(&key).await)
    }

    async fn put(&self, req: Request<PutReq>) -> GrpcResponse<WireReply> {
        let PutReq {
            client_id,
            key,
            value,
        } = req.into_inner();
        info!("PUT from client {}: [key]{}", client_id, key);

        let value = value.map(|v| v.data);
        reply(self.node.put(&key, value.as_deref()).await)
    }

    async fn delete(&self, req: Request<DeleteReq>) -> GrpcResponse<WireReply> {
        let DeleteReq { client_id, key } = req.into_inner();
        info!("DELETE from client {}: [key]{}", client_id, key);

        reply(self.node.delete(&key).await)
    }

    async fn handle_message(&self, req: Request<Envelope>) -> GrpcResponse<Ack> {
        let msg = req.into_inner().into_message()?;
        self.node.handle_message(msg).await;

        Ok(Response::new(Ack {}))
    }
}

/// Serve `node` on `addr`.
///
/// Resolves once the server has exited.
pub async fn serve(node: Arc<Node>, addr: SocketAddr) -> Result<(), transport::Error> {
    serve_with_shutdown(node, addr, futures::future::pending()).await
}

/// Serve `node` on `addr`, shutting down once `signal` resolves. The node's background
/// tasks are stopped along with the server.
///
/// Resolves once the server has exited.
pub async fn serve_with_shutdown<F>(
    node: Arc<Node>,
    addr: SocketAddr,
    signal: F,
) -> Result<(), transport::Error>
where
    F: Future<Output = ()>,
{
    info!("node {} serving on {}", node.id(), addr);

    let svc = KvService::new(Arc::clone(&node)).into_service();
    let r = Server::builder()
        .add_service(svc)
        .serve_with_shutdown(addr, signal)
        .await;

    node.shutdown();
    r
}
