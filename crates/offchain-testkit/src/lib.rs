//! # Off-chain Testkit
//!
//! Shared test infrastructure for the protocol crates:
//!
//! - [`fixtures`]: deterministic VASP identities, keys and payment states
//! - [`FaultyTransport`]: transport that drops or duplicates exchanges on demand
//! - [`SimulatedPair`]: two complete nodes wired to each other
//! - [`strategies`]: proptest strategies for random schedules
//!
//! Add it as a dev-dependency:
//! ```toml
//! [dev-dependencies]
//! offchain-testkit = { path = "../offchain-testkit" }
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(missing_docs)]

pub mod faulty;
pub mod fixtures;
pub mod pair;
pub mod strategies;

pub use faulty::{Fault, FaultStats, FaultyTransport};
pub use fixtures::*;
pub use pair::{Side, SimulatedPair, SimulationError, Step};
