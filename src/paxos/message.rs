// Copyright 2020 nytopop (Eric Izoita)
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! Proposals, and the messages exchanged between roles while deciding them.
use super::id::{NodeId, ProposalId};
use std::fmt;

/// A write operation that can be decided by a round of consensus.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Associate a value with a key.
    Put,
    /// Remove a key.
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Put => "PUT",
            Operation::Delete => "DELETE",
        })
    }
}

/// A write that some node wants decided. Owned by the node that created it until its
/// round completes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proposal {
    /// The round that will decide this proposal.
    pub id: ProposalId,
    /// The key being written.
    pub key: String,
    /// Always `None` for deletes.
    pub value: Option<String>,
    /// Whether this is a put or a delete.
    pub op: Operation,
}

impl Proposal {
    /// Returns a proposal to associate `value` with `key`.
    pub fn put(id: ProposalId, key: String, value: String) -> Self {
        Self {
            id,
            key,
            value: Some(value),
            op: Operation::Put,
        }
    }

    /// Returns a proposal to remove `key`.
    pub fn delete(id: ProposalId, key: String) -> Self {
        Self {
            id,
            key,
            value: None,
            op: Operation::Delete,
        }
    }

    /// Returns the message that opens this proposal's round.
    pub fn prepare(&self) -> Prepare {
        Prepare {
            id: self.id,
            key: self.key.clone(),
        }
    }
}

/// Phase 1a: asks acceptors to promise `id` for `key`.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct Prepare {
    pub id: ProposalId,
    pub key: String,
}

/// Phase 1b: an acceptor's promise to ignore rounds older than `id` for `key`.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct Promise {
    pub sender: NodeId,
    pub key: String,
    pub id: ProposalId,
    /// The most recent round this acceptor accepted for `key`, if any.
    pub accepted_id: Option<ProposalId>,
    /// The value accepted in `accepted_id`. `None` if that round was a delete.
    pub accepted_value: Option<String>,
}

/// Phase 2a: asks acceptors to accept a value for `key` in round `id`.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct Propose {
    pub id: ProposalId,
    pub key: String,
    pub value: Option<String>,
    pub op: Operation,
}

/// Phase 2b: an acceptor accepted round `id`. Broadcast to every learner.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct Accepted {
    pub sender: NodeId,
    pub id: ProposalId,
    pub key: String,
    pub value: Option<String>,
    pub op: Operation,
}

/// Any message exchanged between nodes while deciding a proposal.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Message {
    Prepare(Prepare),
    Promise(Promise),
    Propose(Propose),
    Accepted(Accepted),
}

impl Message {
    /// Returns the round this message belongs to.
    pub fn id(&self) -> ProposalId {
        match self {
            Message::Prepare(m) => m.id,
            Message::Promise(m) => m.id,
            Message::Propose(m) => m.id,
            Message::Accepted(m) => m.id,
        }
    }

    /// Returns the key this message refers to.
    pub fn key(&self) -> &str {
        match self {
            Message::Prepare(m) => &m.key,
            Message::Promise(m) => &m.key,
            Message::Propose(m) => &m.key,
            Message::Accepted(m) => &m.key,
        }
    }

    /// Returns a short, upper-case name for this message's kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Prepare(_) => "PREPARE",
            Message::Promise(_) => "PROMISE",
            Message::Propose(_) => "PROPOSE",
            Message::Accepted(_) => "ACCEPTED",
        }
    }
}

macro_rules! impl_from_variant {
    ($($v:ident),*) => {$(
        impl From<$v> for Message {
            #[inline]
            fn from(m: $v) -> Self {
                Message::$v(m)
            }
        }
    )*};
}

impl_from_variant!(Prepare, Promise, Propose, Accepted);
