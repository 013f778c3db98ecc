//! Deterministic fixtures

use offchain_core::{ObjectId, ObjectState, ObjectStatus, VaspId};
use offchain_effects::{Ed25519Signer, KYC_DATA, REFERENCE_ID};

/// VASP id derived from a single seed byte
pub fn vasp(seed: u8) -> VaspId {
    VaspId::new_from_entropy([seed; 32])
}

pub fn alice() -> VaspId {
    vasp(1)
}

pub fn bob() -> VaspId {
    vasp(2)
}

/// Signer whose key is derived from the same seed as [`vasp`]
pub fn signer(seed: u8) -> Ed25519Signer {
    Ed25519Signer::from_seed(vasp(seed), [seed; 32])
}

/// Fresh payment awaiting KYC data
pub fn payment(reference: &str) -> ObjectState {
    ObjectState::new(ObjectStatus::NeedsKycData).with_field(REFERENCE_ID, reference)
}

/// Well-formed KYC blob for `reference`
pub fn kyc_blob(reference: &str) -> String {
    serde_json::json!({
        "payment_reference_id": reference,
        "type": "individual",
        "given_name": "Alice",
        "surname": "Smith",
    })
    .to_string()
}

/// Payment state carrying KYC data
pub fn payment_with_kyc(reference: &str) -> ObjectState {
    payment(reference)
        .with_status(ObjectStatus::SoftMatch)
        .with_field(KYC_DATA, kyc_blob(reference))
}

pub fn object(index: u8) -> ObjectId {
    ObjectId::new(format!("payment-{index}"))
}

/// Install a test-friendly subscriber once; `RUST_LOG` selects the level
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
