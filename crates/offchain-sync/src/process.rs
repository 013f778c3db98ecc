//! Synchronous request and response processing
//!
//! These functions run under the channel lock and never suspend. The async
//! driver in [`crate::exchange`] calls them before and after each network
//! round-trip.

use crate::envelope::{EnvelopeSigner, EnvelopeVerifier, SignedEnvelope};
use crate::error::SyncError;
use crate::messages::{CommandRequest, CommandResponse, CommandResult, CommandVerdict};
use offchain_core::{CommandId, Party};
use offchain_sequencer::{ReceiveOutcome, Sequencer, VerdictOutcome};
use uuid::Uuid;

/// What a response changed on the sender side
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseSummary {
    /// Local commands now applied on both sides
    pub acknowledged: usize,
    /// Local commands rolled back, cascades included
    pub retracted: usize,
    /// Receiver asked for retransmission from this offset
    pub out_of_order: Option<u64>,
    /// Receiver refused an envelope signature
    pub unverified: bool,
    /// Receiver holds commands this side has not received yet
    pub peer_has_more: bool,
}

/// A request and the ids of the commands it carries, in offset order
#[derive(Debug, Clone)]
pub struct OutboundBatch {
    pub request: CommandRequest,
    pub command_ids: Vec<CommandId>,
}

/// Build the next batch: up to `max_batch` envelopes from the peer cursor.
///
/// An empty batch is a heartbeat; its response still reports the peer's
/// position.
pub fn build_batch(
    sequencer: &Sequencer,
    signer: &dyn EnvelopeSigner,
    max_batch: usize,
) -> Result<OutboundBatch, SyncError> {
    let outbound = sequencer.outbound(max_batch);
    let envelopes = outbound
        .iter()
        .map(|entry| SignedEnvelope::seal(signer, entry.offset, &entry.command))
        .collect::<Result<Vec<_>, _>>()?;
    let command_ids = outbound
        .iter()
        .map(|entry| entry.command.command_id)
        .collect();
    let request = CommandRequest {
        request_id: Uuid::new_v4(),
        channel_id: sequencer.channel_id(),
        sender: sequencer.local_id(),
        receiver: sequencer.remote_id(),
        sender_next_offset: sequencer.next_expected_offset(Party::Local),
        sender_expects: sequencer.next_expected_offset(Party::Remote),
        envelopes,
    };
    Ok(OutboundBatch {
        request,
        command_ids,
    })
}

/// [`build_batch`] without the command ids
pub fn build_request(
    sequencer: &Sequencer,
    signer: &dyn EnvelopeSigner,
    max_batch: usize,
) -> Result<CommandRequest, SyncError> {
    build_batch(sequencer, signer, max_batch).map(|batch| batch.request)
}

/// Sequence every envelope of an inbound request and answer it
pub fn process_request(
    sequencer: &mut Sequencer,
    verifier: &dyn EnvelopeVerifier,
    request: &CommandRequest,
) -> Result<CommandResponse, SyncError> {
    if request.receiver != sequencer.local_id()
        || request.sender != sequencer.remote_id()
        || request.channel_id != sequencer.channel_id()
    {
        return Err(SyncError::Misrouted {
            channel: request.channel_id,
            sender: request.sender,
            receiver: request.receiver,
        });
    }

    // The sender is missing some of our commands: resend from there
    if request.sender_expects < sequencer.peer_cursor() {
        tracing::debug!(
            channel = %sequencer.channel_id(),
            peer = %request.sender,
            cursor = sequencer.peer_cursor(),
            sender_expects = request.sender_expects,
            "peer behind, rewinding cursor"
        );
        sequencer.set_peer_cursor(request.sender_expects);
    }

    let mut results = Vec::with_capacity(request.envelopes.len());
    for envelope in &request.envelopes {
        let opened = envelope.open(verifier).and_then(|(offset, command)| {
            if command.author != request.sender {
                return Err(crate::error::SignatureError::Mismatch(format!(
                    "request from {} carries command of {}",
                    request.sender, command.author
                )));
            }
            Ok((offset, command))
        });
        let (offset, command) = match opened {
            Ok(opened) => opened,
            Err(err) => {
                tracing::warn!(
                    channel = %sequencer.channel_id(),
                    peer = %request.sender,
                    offset = envelope.offset,
                    error = %err,
                    "unverifiable envelope, dropping rest of batch"
                );
                results.push(CommandResult {
                    offset: envelope.offset,
                    command_id: None,
                    verdict: CommandVerdict::Unverified,
                });
                break;
            }
        };

        let command_id = command.command_id;
        let verdict = match sequencer.receive(command, offset)? {
            ReceiveOutcome::Accepted { .. } => CommandVerdict::Accepted,
            ReceiveOutcome::Rejected { reason, .. } => CommandVerdict::Rejected { reason },
            ReceiveOutcome::Conflict { winner, .. } => CommandVerdict::Conflict {
                winner: sequencer.state().party_id(winner),
            },
            ReceiveOutcome::DuplicateIgnored { disposition, .. } => CommandVerdict::Duplicate {
                accepted: disposition.is_applied(),
                reason: match disposition {
                    offchain_journal::Disposition::Rejected { reason } => Some(reason),
                    _ => None,
                },
            },
            ReceiveOutcome::OutOfOrder { next_expected } => {
                CommandVerdict::OutOfOrder { next_expected }
            }
        };
        let stop = matches!(verdict, CommandVerdict::OutOfOrder { .. });
        results.push(CommandResult {
            offset,
            command_id: Some(command_id),
            verdict,
        });
        if stop {
            break;
        }
    }

    Ok(CommandResponse {
        request_id: request.request_id,
        results,
        next_expected: sequencer.next_expected_offset(Party::Remote),
        receiver_next_offset: sequencer.next_expected_offset(Party::Local),
    })
}

/// Settle local commands from a response and move the peer cursor
pub fn process_response(
    sequencer: &mut Sequencer,
    request: &CommandRequest,
    response: &CommandResponse,
) -> Result<ResponseSummary, SyncError> {
    if response.request_id != request.request_id {
        return Err(SyncError::ResponseMismatch {
            expected: request.request_id,
            actual: response.request_id,
        });
    }

    let mut summary = ResponseSummary::default();
    let local = sequencer.local_id();
    for result in &response.results {
        match &result.verdict {
            CommandVerdict::OutOfOrder { next_expected } => {
                summary.out_of_order = Some(*next_expected);
            }
            CommandVerdict::Unverified => summary.unverified = true,
            verdict => {
                if let Some(settlement) = verdict.settlement(local) {
                    match sequencer.apply_verdict(result.offset, settlement)? {
                        VerdictOutcome::Acknowledged => summary.acknowledged += 1,
                        VerdictOutcome::Retracted { offsets } => summary.retracted += offsets.len(),
                        VerdictOutcome::AlreadySettled | VerdictOutcome::Ignored => {}
                    }
                }
            }
        }
    }

    sequencer.set_peer_cursor(response.next_expected);
    summary.peer_has_more =
        response.receiver_next_offset > sequencer.next_expected_offset(Party::Remote);

    tracing::debug!(
        channel = %sequencer.channel_id(),
        request_id = %request.request_id,
        acknowledged = summary.acknowledged,
        retracted = summary.retracted,
        cursor = sequencer.peer_cursor(),
        "response processed"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::tests::{DigestSigner, DigestVerifier};
    use offchain_core::{AcceptAll, ObjectId, ObjectState, ObjectStatus, TieBreak, VaspId};
    use offchain_journal::MemoryCommandStore;
    use std::sync::Arc;

    fn open(local: VaspId, remote: VaspId) -> Sequencer {
        Sequencer::open(
            local,
            remote,
            Arc::new(MemoryCommandStore::new()),
            Arc::new(AcceptAll),
            TieBreak::default(),
        )
        .unwrap()
    }

    fn vasps() -> (VaspId, VaspId) {
        (
            VaspId::new_from_entropy([1u8; 32]),
            VaspId::new_from_entropy([2u8; 32]),
        )
    }

    #[test]
    fn test_lost_response_is_retried_idempotently() {
        let (a, b) = vasps();
        let mut alice = open(a, b);
        let mut bob = open(b, a);
        let c = alice.draft(ObjectId::new("p1"), ObjectState::new(ObjectStatus::NeedsKycData));
        alice.propose(c).unwrap();

        let request = build_request(&alice, &DigestSigner(a), 16).unwrap();
        let lost = process_request(&mut bob, &DigestVerifier, &request).unwrap();
        assert_eq!(lost.results[0].verdict, CommandVerdict::Accepted);

        // Same request again after the first response was lost
        let retry = process_request(&mut bob, &DigestVerifier, &request).unwrap();
        assert_eq!(
            retry.results[0].verdict,
            CommandVerdict::Duplicate {
                accepted: true,
                reason: None
            }
        );
        assert_eq!(bob.next_expected_offset(Party::Remote), 1);

        let summary = process_response(&mut alice, &request, &retry).unwrap();
        assert_eq!(summary.acknowledged, 1);
        assert!(alice.is_settled());
    }

    #[test]
    fn test_batch_names_the_commands_it_carries() {
        let (a, b) = vasps();
        let mut alice = open(a, b);
        let mut ids = Vec::new();
        for name in ["p1", "p2", "p3"] {
            let c = alice.draft(ObjectId::new(name), ObjectState::new(ObjectStatus::NeedsKycData));
            ids.push(c.command_id);
            alice.propose(c).unwrap();
        }

        let batch = build_batch(&alice, &DigestSigner(a), 2).unwrap();
        assert_eq!(batch.command_ids, ids[..2]);
        assert_eq!(batch.request.envelopes.len(), 2);

        let heartbeat = build_batch(&open(a, b), &DigestSigner(a), 2).unwrap();
        assert!(heartbeat.command_ids.is_empty());
        assert!(heartbeat.request.envelopes.is_empty());
    }

    #[test]
    fn test_unverified_envelope_stops_batch() {
        let (a, b) = vasps();
        let mut alice = open(a, b);
        let mut bob = open(b, a);
        for name in ["p1", "p2"] {
            let c = alice.draft(ObjectId::new(name), ObjectState::new(ObjectStatus::NeedsKycData));
            alice.propose(c).unwrap();
        }
        let mut request = build_request(&alice, &DigestSigner(a), 16).unwrap();
        request.envelopes[0].signature[0] ^= 0xff;

        let response = process_request(&mut bob, &DigestVerifier, &request).unwrap();
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].verdict, CommandVerdict::Unverified);
        assert_eq!(response.next_expected, 0);

        let summary = process_response(&mut alice, &request, &response).unwrap();
        assert!(summary.unverified);
        assert_eq!(alice.peer_cursor(), 0);
        assert_eq!(alice.pending_local(), 2);
    }

    #[test]
    fn test_sender_expects_rewinds_cursor() {
        let (a, b) = vasps();
        let mut alice = open(a, b);
        let mut bob = open(b, a);
        let c = bob.draft(ObjectId::new("p1"), ObjectState::new(ObjectStatus::NeedsKycData));
        bob.propose(c).unwrap();
        bob.set_peer_cursor(1);

        // Alice has not received bob's offset 0
        let heartbeat = build_request(&alice, &DigestSigner(a), 16).unwrap();
        assert!(heartbeat.envelopes.is_empty());
        assert_eq!(heartbeat.sender_expects, 0);
        let response = process_request(&mut bob, &DigestVerifier, &heartbeat).unwrap();
        assert!(response.results.is_empty());
        assert_eq!(bob.peer_cursor(), 0);

        let summary = process_response(&mut alice, &heartbeat, &response).unwrap();
        assert!(summary.peer_has_more);
    }

    #[test]
    fn test_misrouted_and_mismatched() {
        let (a, b) = vasps();
        let c_id = VaspId::new_from_entropy([3u8; 32]);
        let alice = open(a, b);
        let mut carol = open(c_id, a);
        let request = build_request(&alice, &DigestSigner(a), 16).unwrap();
        assert!(matches!(
            process_request(&mut carol, &DigestVerifier, &request),
            Err(SyncError::Misrouted { .. })
        ));

        let mut alice = alice;
        let response = CommandResponse {
            request_id: Uuid::new_v4(),
            results: Vec::new(),
            next_expected: 0,
            receiver_next_offset: 0,
        };
        assert!(matches!(
            process_response(&mut alice, &request, &response),
            Err(SyncError::ResponseMismatch { .. })
        ));
    }
}
