// Copyright 2020 nytopop (Eric Izoita)
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
use crate::paxos::ProposalId;
use std::{collections::BTreeSet, time::Duration};

/// A filter for ignoring messages that belong to rounds which have already been settled.
///
/// Settled rounds are remembered for a configurable amount of time, after which they are
/// purged. Rounds that were minted before that horizon are considered settled whether or
/// not they were ever inserted, so a message from a round we've forgotten about can never
/// cause it to be settled a second time.
pub struct Filter {
    rounds: BTreeSet<ProposalId>,
    retention: Duration,
}

impl Filter {
    /// Create a new filter that will remember settled rounds for `retention`.
    pub fn new(retention: Duration) -> Self {
        Self {
            rounds: BTreeSet::new(),
            retention,
        }
    }

    /// Returns true if `id` has been settled, or is too old to be remembered.
    pub fn is_settled(&self, id: &ProposalId) -> bool {
        id.older_than(self.retention) || self.rounds.contains(id)
    }

    /// Mark `id` as settled.
    ///
    /// Returns `true` if it wasn't already settled.
    pub fn settle(&mut self, id: ProposalId) -> bool {
        self.purge();

        if id.older_than(self.retention) {
            return false;
        }

        self.rounds.insert(id)
    }

    /// Returns the number of rounds currently remembered.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    /// Forget about any rounds older than the retention period.
    fn purge(&mut self) {
        //    v-- oldest                                  v-- newest
        // [ (1, a), (2, b), (2, c), (3, a), (4, b), (5, c) ]
        // |----- purged ----------|--------- kept ---------|
        //                         ^-- first id where !older_than
        let keep = (self.rounds.iter())
            .find(|id| !id.older_than(self.retention))
            .copied();

        self.rounds = match keep {
            Some(first) => self.rounds.split_off(&first),
            None => BTreeSet::new(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paxos::IdGen;
    use quickcheck_macros::quickcheck;

    #[quickcheck]
    fn fresh_rounds_settle_exactly_once(n: u8) -> bool {
        let gen = IdGen::new(1);
        let mut f = Filter::new(Duration::from_secs(3600));

        (0..n)
            .map(|_| gen.next())
            .all(|id| !f.is_settled(&id) && f.settle(id) && f.is_settled(&id) && !f.settle(id))
    }

    #[quickcheck]
    fn ancient_rounds_are_always_settled(seqs: Vec<u16>) -> bool {
        let mut f = Filter::new(Duration::from_secs(3600));

        (seqs.into_iter())
            .map(|s| ProposalId::new(s as u64, 0))
            .all(|id| f.is_settled(&id) && !f.settle(id))
    }

    #[test]
    fn expired_rounds_are_purged() {
        let gen = IdGen::new(1);
        let mut f = Filter::new(Duration::from_millis(20));

        assert!(f.settle(gen.next()));
        std::thread::sleep(Duration::from_millis(40));
        assert!(f.settle(gen.next()));
        assert_eq!(1, f.len());
    }
}
