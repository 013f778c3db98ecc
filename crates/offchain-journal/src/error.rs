//! Journal errors

use crate::sequence::Disposition;
use offchain_core::{Party, TransitionError};

/// Failure to mutate or rebuild channel state
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JournalError {
    #[error("no {party:?} command at offset {offset}")]
    UnknownOffset { party: Party, offset: u64 },

    #[error("{party:?} record at offset {found}, expected {expected}")]
    OffsetGap {
        party: Party,
        expected: u64,
        found: u64,
    },

    #[error("local offset {offset} is already {current:?}")]
    Contradiction { offset: u64, current: Disposition },

    #[error("cannot roll back local offset {offset}: version built by {author:?} offset {blocking_offset}")]
    RetractBlocked {
        offset: u64,
        blocking_offset: u64,
        author: Party,
    },

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// A journal record that does not fit the state rebuilt so far
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("journal record {index}: {source}")]
pub struct ReplayError {
    pub index: usize,
    #[source]
    pub source: JournalError,
}
