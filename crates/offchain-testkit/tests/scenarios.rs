//! Hand-written two-party scenarios

#![allow(clippy::unwrap_used)]

use assert_matches::assert_matches;
use offchain_core::{ObjectStatus, Party, RejectReason, TieBreak};
use offchain_effects::{payment_between, Role};
use offchain_journal::Disposition;
use offchain_sequencer::ProposeOutcome;
use offchain_testkit::{kyc_blob, object, Fault, Side, SimulatedPair, Step};

#[tokio::test]
async fn concurrent_updates_resolve_to_the_designated_winner() {
    let pair = SimulatedPair::new(TieBreak::LowerPartyWins);
    let id = object(0);
    pair.advance(Side::Alice, &id, ObjectStatus::NeedsKycData).unwrap();
    pair.settle(8).await.unwrap();

    // Both sides extend version 1 before hearing from each other
    pair.advance(Side::Alice, &id, ObjectStatus::SoftMatch).unwrap();
    pair.advance(Side::Bob, &id, ObjectStatus::NeedsRecipientSignature).unwrap();
    pair.settle(8).await.unwrap();

    let alice = pair.objects(Side::Alice);
    assert_eq!(alice, pair.objects(Side::Bob));
    let object = &alice[&id];
    assert_eq!(object.version, 2);

    let winner = TieBreak::LowerPartyWins
        .designated_winner(pair.id(Side::Alice), pair.id(Side::Bob))
        .unwrap();
    let expected = if winner == pair.id(Side::Alice) {
        ObjectStatus::SoftMatch
    } else {
        ObjectStatus::NeedsRecipientSignature
    };
    assert_eq!(object.status(), expected);
}

#[tokio::test]
async fn losing_side_sees_its_command_rejected() {
    let pair = SimulatedPair::new(TieBreak::LowerPartyWins);
    let id = object(1);
    pair.advance(Side::Alice, &id, ObjectStatus::NeedsKycData).unwrap();
    pair.settle(8).await.unwrap();
    pair.advance(Side::Alice, &id, ObjectStatus::SoftMatch).unwrap();
    pair.advance(Side::Bob, &id, ObjectStatus::SoftMatch).unwrap();
    pair.settle(8).await.unwrap();

    let winner = TieBreak::LowerPartyWins
        .designated_winner(pair.id(Side::Alice), pair.id(Side::Bob))
        .unwrap();
    let loser = if winner == pair.id(Side::Alice) {
        Side::Bob
    } else {
        Side::Alice
    };
    let channel = pair.sequencer(loser);
    let sequencer = channel.lock();
    let last = sequencer.state().sequence(Party::Local).iter().last().unwrap().clone();
    assert_matches!(last.disposition, Disposition::Rejected { .. });
}

#[tokio::test]
async fn lost_response_is_recovered_through_duplicates() {
    let mut pair = SimulatedPair::new(TieBreak::default());
    let id = object(2);
    pair.advance(Side::Alice, &id, ObjectStatus::NeedsKycData).unwrap();
    pair.step(&Step::Sync {
        side: Side::Alice,
        fault: Fault::DropResponse,
    })
    .await
    .unwrap();

    // Bob applied it; Alice still waits for the verdict
    assert!(pair.objects(Side::Bob).contains_key(&id));
    assert_eq!(pair.sequencer(Side::Alice).lock().pending_local(), 1);

    pair.settle(4).await.unwrap();
    assert!(pair.converged());
    assert_eq!(pair.transport(Side::Alice).stats().dropped_responses, 1);
}

#[tokio::test]
async fn terminal_objects_refuse_updates() {
    let pair = SimulatedPair::new(TieBreak::default());
    let id = object(3);
    pair.advance(Side::Alice, &id, ObjectStatus::NeedsKycData).unwrap();
    pair.advance(Side::Alice, &id, ObjectStatus::Abort).unwrap();
    pair.settle(8).await.unwrap();

    assert_matches!(
        pair.advance(Side::Bob, &id, ObjectStatus::SoftMatch).unwrap(),
        ProposeOutcome::Rejected {
            reason: RejectReason::TerminalObject,
            ..
        }
    );
    assert!(pair.converged());
}

#[tokio::test]
async fn restart_with_pending_commands_resends_them() {
    let mut pair = SimulatedPair::new(TieBreak::default());
    pair.advance(Side::Bob, &object(4), ObjectStatus::NeedsKycData).unwrap();
    pair.advance(Side::Bob, &object(5), ObjectStatus::NeedsKycData).unwrap();
    pair.restart(Side::Bob).unwrap();
    assert_eq!(pair.sequencer(Side::Bob).lock().pending_local(), 2);

    pair.settle(8).await.unwrap();
    assert!(pair.converged());
    assert_eq!(pair.objects(Side::Alice).len(), 2);
}

#[tokio::test]
async fn each_party_fills_in_only_its_own_side() {
    let pair = SimulatedPair::new(TieBreak::default());
    let id = object(6);
    let created = payment_between(id.as_str(), pair.id(Side::Alice), pair.id(Side::Bob));
    assert_matches!(
        pair.propose(Side::Alice, &id, created).unwrap(),
        ProposeOutcome::Accepted { .. }
    );
    pair.settle(8).await.unwrap();

    let current = pair.objects(Side::Bob)[&id].state.clone();
    let meddling = current
        .clone()
        .with_field(Role::Sender.status_field(), ObjectStatus::Abort.as_str());
    assert_matches!(
        pair.propose(Side::Bob, &id, meddling).unwrap(),
        ProposeOutcome::Rejected {
            reason: RejectReason::SchemaViolation { code, .. },
            ..
        } if code == "foreign_role_change"
    );

    let answered = current
        .with_field(Role::Receiver.kyc_field(), kyc_blob(id.as_str()))
        .with_field(Role::Receiver.status_field(), ObjectStatus::SoftMatch.as_str());
    assert_matches!(
        pair.propose(Side::Bob, &id, answered).unwrap(),
        ProposeOutcome::Accepted { .. }
    );
    pair.settle(8).await.unwrap();

    assert!(pair.converged());
    let alice = pair.objects(Side::Alice);
    assert_eq!(
        Role::Receiver.status(&alice[&id].state).unwrap(),
        ObjectStatus::SoftMatch
    );
}
