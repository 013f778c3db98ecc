//! Ed25519 envelope signing

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use offchain_core::VaspId;
use offchain_sync::{EnvelopeSigner, EnvelopeVerifier, SignatureError};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Signs envelopes with the local VASP's Ed25519 key
pub struct Ed25519Signer {
    id: VaspId,
    key: SigningKey,
}

impl Ed25519Signer {
    pub fn generate(id: VaspId) -> Self {
        Self {
            id,
            key: SigningKey::generate(&mut rand::rngs::OsRng),
        }
    }

    /// Deterministic key, for tests and demos
    pub fn from_seed(id: VaspId, seed: [u8; 32]) -> Self {
        Self {
            id,
            key: SigningKey::from_bytes(&seed),
        }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }
}

impl EnvelopeSigner for Ed25519Signer {
    fn signer_id(&self) -> VaspId {
        self.id
    }

    fn sign(&self, payload: &[u8]) -> Vec<u8> {
        self.key.sign(payload).to_bytes().to_vec()
    }
}

/// Verification keys of known counterparties
#[derive(Default)]
pub struct KeyRing {
    keys: RwLock<HashMap<VaspId, VerifyingKey>>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: VaspId, key: VerifyingKey) {
        self.keys.write().insert(id, key);
    }

    pub fn remove(&self, id: &VaspId) -> bool {
        self.keys.write().remove(id).is_some()
    }
}

impl EnvelopeVerifier for KeyRing {
    fn verify(&self, signer: VaspId, payload: &[u8], signature: &[u8]) -> Result<(), SignatureError> {
        let key = self
            .keys
            .read()
            .get(&signer)
            .copied()
            .ok_or(SignatureError::UnknownSigner(signer))?;
        let signature = Signature::from_slice(signature)
            .map_err(|e| SignatureError::Malformed(e.to_string()))?;
        key.verify(payload, &signature)
            .map_err(|_| SignatureError::BadSignature(signer))
    }
}
