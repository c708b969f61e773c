// Copyright 2020 nytopop (Eric Izoita)
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! A replicated key-value store, kept consistent by running paxos once per write.
//!
//! # Overview
//! `paxkv` nodes form a fixed cluster. Any node may serve any request: reads are answered
//! from local storage, and each write (a put or a delete) is decided by a fresh round of
//! single-decree paxos among every member of the cluster, after which every node that
//! learns of the decision applies it to its own storage.
//!
//! Each key behaves as an independently replicated register. There is no replicated log,
//! no leader, and no multi-key transactions; any node may propose a write to any key at
//! any time, and a write succeeds once a majority of the cluster has accepted it.
//!
//! # Fault Injection
//! To exercise the protocol's tolerance of failures, every node's acceptor crashes at
//! random (see [FaultConfig]), forgets everything it knew, and is restarted after a short
//! delay. Clusters can also be partitioned with the in-process [Network].
//!
//! # Transports
//! Nodes talk to each other through a [Transport]. Two are provided: [Network], which
//! connects nodes running in the same process, and [GrpcTransport], which connects nodes
//! served over grpc with [server::serve].
//!
//! # References
//! * [Paxos Made Simple][pms]
//!
//! [pms]: https://lamport.azurewebsites.net/pubs/paxos-simple.pdf
#![warn(rust_2018_idioms, missing_docs)]
#![doc(
    html_root_url = "https://docs.rs/paxkv/0.1.0",
    test(
        no_crate_inject,
        attr(
            deny(rust_2018_idioms, unused_imports, unused_mut),
            allow(unused_variables)
        )
    )
)]

#[cfg(test)]
#[test]
fn test_html_root_url() {
    version_sync::assert_html_root_url_updated!("src/lib.rs");
}

#[macro_use]
mod macros;

mod collections;

pub mod config;
pub mod node;
pub mod paxos;
pub mod proto;
pub mod reply;
pub mod server;
pub mod store;
pub mod transport;

#[doc(inline)]
pub use config::{Config, FaultConfig};
#[doc(inline)]
pub use node::Node;
#[doc(inline)]
pub use paxos::{Health, NodeId, ProposalId};
#[doc(inline)]
pub use reply::Reply;
#[doc(inline)]
pub use store::{MemStore, Store};
#[doc(inline)]
pub use transport::{grpc::GrpcTransport, local::Network, Transport, TransportError};

/// A re-export of [async_trait] for convenience.
///
/// [async_trait]: https://docs.rs/async-trait/latest/async_trait/attr.async_trait.html
#[doc(inline)]
pub use tonic::async_trait;
