//! # Off-chain Sync
//!
//! Exchange of sequenced commands between the two VASPs of a channel.
//!
//! - **Wire**: [`CommandRequest`] / [`CommandResponse`] carrying
//!   [`SignedEnvelope`]s and per-command [`CommandVerdict`]s
//! - **Processing**: synchronous [`process_request`] / [`process_response`]
//!   run under the channel lock
//! - **Driving**: [`ChannelExchange`] sends batches with timeout and
//!   backoff, tracked by an explicit [`RequestTracker`] state machine;
//!   [`ExchangeWorker`] runs it periodically or on demand
//!
//! Retransmission is idempotent: retries carry the same envelopes and the
//! receiving sequencer answers already committed offsets as duplicates.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

pub mod envelope;
pub mod error;
pub mod exchange;
pub mod messages;
pub mod process;
pub mod responder;
pub mod tracker;
pub mod transport;
pub mod worker;

pub use envelope::{EnvelopeSigner, EnvelopeVerifier, SignedEnvelope};
pub use error::{ExchangeError, SignatureError, SyncError, TransportError};
pub use exchange::{ChannelExchange, SyncReport};
pub use messages::{decode, encode, CommandRequest, CommandResponse, CommandResult, CommandVerdict};
pub use process::{
    build_batch, build_request, process_request, process_response, OutboundBatch, ResponseSummary,
};
pub use responder::ExchangeResponder;
pub use tracker::{InFlightRequest, RequestState, RequestTracker};
pub use transport::Transport;
pub use worker::{ExchangeHandle, ExchangeWorker};
