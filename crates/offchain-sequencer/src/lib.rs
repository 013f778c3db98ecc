//! # Off-chain Sequencer
//!
//! Sequencing and conflict resolution for one bilateral channel:
//!
//! - [`Sequencer::propose`] sequences locally authored commands
//! - [`Sequencer::receive`] sequences remote commands, detecting duplicates,
//!   gaps and races against local pending commands
//! - [`Sequencer::apply_verdict`] settles local commands with the
//!   counterparty's answer
//!
//! Every state change is persisted through a [`offchain_journal::CommandStore`]
//! before the call returns. [`ChannelRegistry`] holds one sequencer per
//! counterparty.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

pub mod error;
pub mod outcome;
pub mod recovery;
pub mod registry;
pub mod sequencer;

pub use error::SequencerError;
pub use outcome::{ProposeOutcome, ReceiveOutcome, Verdict, VerdictOutcome};
pub use recovery::RecoveryReport;
pub use registry::{ChannelRegistry, SharedSequencer};
pub use sequencer::Sequencer;
