//! Event-sourced document traits.
//!
//! Every workflow document (inbound order, transfer order, count plan) is an
//! aggregate: commands are decided against its current state, and the
//! resulting events are the only way that state changes.

use crate::error::{DomainError, DomainResult};

/// Identity and stream position of a document.
pub trait AggregateRoot {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Events applied so far. Equals the last sequence number of a
    /// rehydrated stream.
    fn version(&self) -> u64;
}

/// What a writer believes the stream looks like before appending.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// The document has no events yet.
    New,
    /// The last committed event has this sequence number.
    At(u64),
}

impl ExpectedVersion {
    /// Expectation for a writer that has seen `version` events.
    pub fn after(version: u64) -> Self {
        if version == 0 {
            ExpectedVersion::New
        } else {
            ExpectedVersion::At(version)
        }
    }

    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::New => actual == 0,
            ExpectedVersion::At(v) => v == actual,
        }
    }

    /// A mismatch means another writer committed in between.
    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            return Ok(());
        }
        Err(DomainError::conflict(format!(
            "document changed concurrently (expected {self:?}, stream is at {actual})"
        )))
    }
}

/// Decide/evolve contract of a workflow document.
///
/// `handle` is pure: it checks the document's guards and returns the events a
/// command produces, or a domain error. `apply` folds one committed event into
/// the state and must never fail. Ledger effects are described by the events
/// and committed by the dispatcher, never by the aggregate.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    fn apply(&mut self, event: &Self::Event);

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    /// Decide and immediately fold the outcome into `self`, without any
    /// persistence. State is untouched when the command is rejected.
    fn process(&mut self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        let events = self.handle(command)?;
        for event in &events {
            self.apply(event);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn after_zero_expects_a_new_document() {
        assert_eq!(ExpectedVersion::after(0), ExpectedVersion::New);
        assert_eq!(ExpectedVersion::after(4), ExpectedVersion::At(4));
        assert!(ExpectedVersion::New.matches(0));
        assert!(!ExpectedVersion::New.matches(1));
    }

    #[test]
    fn stale_writers_get_a_conflict() {
        assert!(ExpectedVersion::At(3).check(3).is_ok());
        let err = ExpectedVersion::At(3).check(4).unwrap_err();
        assert_eq!(err.code(), "concurrency_conflict");
    }
}
