//! # Off-chain Effects
//!
//! Concrete handlers for the interfaces the protocol layers depend on:
//!
//! - [`FileCommandStore`]: durable JSON-lines journal per channel with tail repair
//! - [`Ed25519Signer`] / [`KeyRing`]: envelope signatures
//! - [`MemoryNetwork`] / [`MemoryTransport`]: in-process transport
//! - [`PaymentValidator`]: payment status ladder, per-role edit rights and KYC
//!   payload rules

#![forbid(unsafe_code)]
#![allow(missing_docs)]

pub mod file_store;
pub mod memory_transport;
pub mod payment;
pub mod signing;

pub use file_store::{FileCommandStore, FileRecovery};
pub use memory_transport::{MemoryNetwork, MemoryTransport};
pub use payment::{
    payment_between, role_of, PaymentValidator, Role, KYC_DATA, RECEIVER, REFERENCE_ID, SENDER,
};
pub use signing::{Ed25519Signer, KeyRing};
