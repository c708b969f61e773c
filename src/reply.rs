// Copyright 2020 nytopop (Eric Izoita)
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! Responses returned to callers.
use crate::paxos::Operation;
use std::fmt;

/// A caller-facing operation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Verb {
    Get,
    Put,
    Delete,
}

impl From<Operation> for Verb {
    fn from(op: Operation) -> Self {
        match op {
            Operation::Put => Verb::Put,
            Operation::Delete => Verb::Delete,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verb::Get => "GET",
            Verb::Put => "PUT",
            Verb::Delete => "DELETE",
        })
    }
}

/// The outcome of a client request.
///
/// Renders as `<Success|Failure>: <VERB> - <message>`, followed by ` [value]<data>` if
/// the reply carries data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    success: bool,
    verb: Verb,
    message: String,
    data: Option<String>,
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.success { "Success" } else { "Failure" };
        write!(f, "{}: {} - {}", status, self.verb, self.message)?;

        if let Some(data) = &self.data {
            write!(f, " [value]{}", data)?;
        }
        Ok(())
    }
}

impl Reply {
    /// Returns a successful reply to a `verb` request.
    pub fn success<M: Into<String>>(verb: Verb, message: M) -> Self {
        Self {
            success: true,
            verb,
            message: message.into(),
            data: None,
        }
    }

    /// Returns a failed reply to a `verb` request.
    pub fn failure<M: Into<String>>(verb: Verb, message: M) -> Self {
        Self {
            success: false,
            ..Self::success(verb, message)
        }
    }

    /// Attach data to this reply.
    pub fn with_data<D: Into<String>>(mut self, data: D) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Returns true if the request succeeded.
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Returns the kind of request this is a reply to.
    pub fn verb(&self) -> Verb {
        self.verb
    }

    /// Returns the human readable outcome of the request.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the data attached to this reply, if any.
    pub fn data(&self) -> Option<&str> {
        self.data.as_deref()
    }
}
