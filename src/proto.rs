// Copyright 2020 nytopop (Eric Izoita)
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! Protocol buffers definitions for the client and peer rpc surface.
#![allow(missing_docs)]

use crate::paxos;
use std::convert::{TryFrom, TryInto};
use thiserror::Error;
use tonic::Status;

tonic::include_proto!("paxkv");

/// A message received over the wire that doesn't describe a valid [paxos::Message].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum ProtoError {
    #[error("missing field: {}", .0)]
    Missing(&'static str),
    #[error("invalid operation: {}", .0)]
    InvalidOperation(i32),
}

impl From<ProtoError> for Status {
    fn from(e: ProtoError) -> Self {
        Status::invalid_argument(e.to_string())
    }
}

impl From<paxos::ProposalId> for ProposalId {
    fn from(id: paxos::ProposalId) -> Self {
        Self {
            seq: id.seq(),
            node: id.node(),
        }
    }
}

impl From<ProposalId> for paxos::ProposalId {
    fn from(ProposalId { seq, node }: ProposalId) -> Self {
        Self::new(seq, node)
    }
}

impl From<paxos::Operation> for Operation {
    fn from(op: paxos::Operation) -> Self {
        match op {
            paxos::Operation::Put => Operation::Put,
            paxos::Operation::Delete => Operation::Delete,
        }
    }
}

fn op_from_wire(op: i32) -> Result<paxos::Operation, ProtoError> {
    match Operation::from_i32(op) {
        Some(Operation::Put) => Ok(paxos::Operation::Put),
        Some(Operation::Delete) => Ok(paxos::Operation::Delete),
        None => Err(ProtoError::InvalidOperation(op)),
    }
}

fn id_from_wire(id: Option<ProposalId>) -> Result<paxos::ProposalId, ProtoError> {
    id.map(Into::into).ok_or(ProtoError::Missing("id"))
}

fn value(v: Option<String>) -> Option<Value> {
    v.map(|data| Value { data })
}

impl From<paxos::Message> for Envelope {
    fn from(msg: paxos::Message) -> Self {
        use envelope::Msg;

        let msg = match msg {
            paxos::Message::Prepare(m) => Msg::Prepare(Prepare {
                id: Some(m.id.into()),
                key: m.key,
            }),

            paxos::Message::Promise(m) => Msg::Promise(Promise {
                sender: m.sender,
                key: m.key,
                id: Some(m.id.into()),
                accepted_id: m.accepted_id.map(Into::into),
                accepted_value: value(m.accepted_value),
            }),

            paxos::Message::Propose(m) => Msg::Propose(Propose {
                id: Some(m.id.into()),
                key: m.key,
                value: value(m.value),
                op: Operation::from(m.op) as i32,
            }),

            paxos::Message::Accepted(m) => Msg::Accepted(Accepted {
                sender: m.sender,
                id: Some(m.id.into()),
                key: m.key,
                value: value(m.value),
                op: Operation::from(m.op) as i32,
            }),
        };

        Self { msg: Some(msg) }
    }
}

impl TryFrom<Envelope> for paxos::Message {
    type Error = ProtoError;

    fn try_from(e: Envelope) -> Result<Self, Self::Error> {
        use envelope::Msg;

        let msg = match e.msg.ok_or(ProtoError::Missing("msg"))? {
            Msg::Prepare(m) => paxos::Prepare {
                id: id_from_wire(m.id)?,
                key: m.key,
            }
            .into(),

            Msg::Promise(m) => paxos::Promise {
                sender: m.sender,
                key: m.key,
                id: id_from_wire(m.id)?,
                accepted_id: m.accepted_id.map(Into::into),
                accepted_value: m.accepted_value.map(|v| v.data),
            }
            .into(),

            Msg::Propose(m) => paxos::Propose {
                id: id_from_wire(m.id)?,
                key: m.key,
                value: m.value.map(|v| v.data),
                op: op_from_wire(m.op)?,
            }
            .into(),

            Msg::Accepted(m) => paxos::Accepted {
                sender: m.sender,
                id: id_from_wire(m.id)?,
                key: m.key,
                value: m.value.map(|v| v.data),
                op: op_from_wire(m.op)?,
            }
            .into(),
        };

        Ok(msg)
    }
}

impl Envelope {
    /// Decode the message carried by this envelope.
    pub fn into_message(self) -> Result<paxos::Message, ProtoError> {
        self.try_into()
    }
}
