//! Exchange errors

use crate::tracker::RequestState;
use offchain_core::{ChannelId, CommandId, VaspId};
use offchain_sequencer::SequencerError;
use uuid::Uuid;

/// Envelope could not be trusted
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("no verification key for {0}")]
    UnknownSigner(VaspId),

    #[error("signature does not verify for {0}")]
    BadSignature(VaspId),

    #[error("malformed envelope: {0}")]
    Malformed(String),

    #[error("envelope content mismatch: {0}")]
    Mismatch(String),
}

/// Failure delivering a request or receiving its response
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("peer {0} unreachable")]
    Unreachable(VaspId),

    #[error("connection closed")]
    Disconnected,

    #[error("request dropped")]
    Dropped,

    #[error("wire encoding: {0}")]
    Encoding(String),

    #[error("peer refused request: {0}")]
    Refused(String),
}

/// Failure processing a request or response under the channel lock
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Sequencer(#[from] SequencerError),

    #[error("request for channel {channel} ({sender} -> {receiver}) reached the wrong endpoint")]
    Misrouted {
        channel: ChannelId,
        sender: VaspId,
        receiver: VaspId,
    },

    #[error("response to {actual} does not answer request {expected}")]
    ResponseMismatch { expected: Uuid, actual: Uuid },

    #[error("request {0} is not tracked")]
    UnknownRequest(Uuid),

    #[error("request {request_id}: illegal transition {from:?} -> {to:?}")]
    IllegalTransition {
        request_id: Uuid,
        from: RequestState,
        to: RequestState,
    },
}

/// Surfaced to callers of the exchange driver
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExchangeError {
    /// Retries exhausted; the commands stay committed and pending
    #[error("exchange failed after {attempts} attempts ({} commands): {reason}", .command_ids.len())]
    Failed {
        command_ids: Vec<CommandId>,
        attempts: u32,
        reason: String,
    },

    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Peer could not verify our envelopes; retrying cannot help
    #[error("peer refused envelopes of request {request_id}")]
    Unverified { request_id: Uuid },

    #[error("channel not settled after {rounds} rounds")]
    NotSettled { rounds: usize },

    #[error("exchange worker stopped")]
    Shutdown,
}
