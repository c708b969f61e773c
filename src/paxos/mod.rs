// Copyright 2020 nytopop (Eric Izoita)
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! Single-decree paxos, run once per write to a key.
//!
//! Every node plays all three roles. A [proposer::Proposer] opens a round for each write
//! its node receives, the node's [acceptor::Acceptor] votes on rounds opened anywhere in
//! the cluster, and a [learner::Learner] watches for a majority of those votes and
//! applies the decided write to local storage.
//!
//! There is no replicated log. Each key behaves as a register that is repeatedly
//! overwritten by fresh rounds, so rounds for different keys never interact, and rounds
//! for the same key only interact through the values acceptors report in their promises.
pub(crate) mod acceptor;
pub(crate) mod learner;
pub(crate) mod messenger;
pub(crate) mod monitor;
pub(crate) mod proposer;

mod id;
mod message;

pub use acceptor::Health;
pub(crate) use id::IdGen;
pub use id::{NodeId, ProposalId};
pub use message::{Accepted, Message, Operation, Prepare, Promise, Proposal, Propose};
