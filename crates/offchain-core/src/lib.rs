//! # Off-chain Core - Object & Command Model
//!
//! Foundation of the two-party off-chain protocol between VASPs:
//!
//! - **Identifiers**: `VaspId`, `ChannelId`, `ObjectId`, content-derived `CommandId`
//! - **Object model**: versioned `OffChainObject`s with a payment status ladder
//! - **Commands**: immutable intents moving one object from version `N` to `N + 1`,
//!   applied by the pure [`apply`] / [`transition`] functions
//! - **Policies**: conflict tie-break and retry/backoff, both configurable
//!
//! Nothing in this crate performs I/O other than configuration loading.

#![forbid(unsafe_code)]

pub mod command;
pub mod config;
pub mod conflict;
pub mod errors;
pub mod hash;
pub mod identifiers;
pub mod object;
pub mod reliability;
pub mod validator;

pub use command::{apply, transition, Command};
pub use config::{OffchainConfig, ProtocolConfig};
pub use conflict::TieBreak;
pub use errors::{OffchainError, RejectReason, Result, TransitionError};
pub use hash::{hash, Hash32};
pub use identifiers::{ChannelId, CommandId, ObjectId, Party, VaspId};
pub use object::{ObjectState, ObjectStatus, OffChainObject, UnknownStatus};
pub use reliability::{BackoffStrategy, RetryPolicy};
pub use validator::{AcceptAll, ValidationFailure, Validator};

/// Milliseconds since the Unix epoch, for command timestamps
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
