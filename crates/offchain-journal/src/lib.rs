//! # Off-chain Journal
//!
//! Per-channel state of the off-chain protocol: the two command sequences,
//! the version chain of every shared object, the durable record format and
//! the storage interface used to persist it.
//!
//! Everything here is synchronous and free of I/O except the storage trait
//! implementations.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

pub mod chain;
pub mod channel;
pub mod error;
pub mod record;
pub mod sequence;
pub mod store;

pub use chain::{Link, ObjectChain};
pub use channel::{ChannelState, RemoteClass};
pub use error::{JournalError, ReplayError};
pub use record::{JournalRecord, RemoteVerdict};
pub use sequence::{Disposition, Sequence, SequenceEntry};
pub use store::{sequence_from_records, CommandStore, MemoryCommandStore, ObjectSnapshot, StoreError};
