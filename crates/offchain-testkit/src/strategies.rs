//! Property test strategies for simulation schedules
//!
//! Schedules mix proposals from both sides over a small set of objects, so
//! races on the same object version are frequent.

use crate::faulty::Fault;
use crate::fixtures::object;
use crate::pair::{Side, Step};
use offchain_core::{ObjectStatus, TieBreak};
use proptest::prelude::*;

pub use proptest;

pub fn arb_side() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Alice), Just(Side::Bob)]
}

/// Mostly clean delivery, with every fault represented
pub fn arb_fault() -> impl Strategy<Value = Fault> {
    prop_oneof![
        4 => Just(Fault::Deliver),
        1 => Just(Fault::DropRequest),
        1 => Just(Fault::DropResponse),
        1 => Just(Fault::Duplicate),
    ]
}

/// Target statuses, including regressions and aborts the validator refuses
pub fn arb_status() -> impl Strategy<Value = ObjectStatus> {
    prop_oneof![
        Just(ObjectStatus::NeedsStableId),
        Just(ObjectStatus::NeedsKycData),
        Just(ObjectStatus::SoftMatch),
        Just(ObjectStatus::NeedsRecipientSignature),
        Just(ObjectStatus::ReadyForSettlement),
        Just(ObjectStatus::Settled),
        Just(ObjectStatus::Abort),
    ]
}

pub fn arb_tie_break() -> impl Strategy<Value = TieBreak> {
    prop_oneof![
        Just(TieBreak::LowerPartyWins),
        Just(TieBreak::LowerCommandIdWins),
        Just(TieBreak::ParityBalanced),
    ]
}

/// One step touching one of `objects` objects
pub fn arb_step(objects: u8) -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => (arb_side(), 0..objects, arb_status()).prop_map(|(side, index, status)| {
            Step::Advance {
                side,
                object: object(index),
                status,
            }
        }),
        3 => (arb_side(), arb_fault()).prop_map(|(side, fault)| Step::Sync { side, fault }),
        1 => arb_side().prop_map(|side| Step::Restart { side }),
    ]
}

pub fn arb_schedule(objects: u8, len: std::ops::Range<usize>) -> impl Strategy<Value = Vec<Step>> {
    prop::collection::vec(arb_step(objects), len)
}
