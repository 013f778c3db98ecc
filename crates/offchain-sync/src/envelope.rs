//! Signed command envelopes
//!
//! The signed payload is the bincode encoding of `(offset, command)`, so an
//! envelope cannot be replayed at another offset.

use crate::error::SignatureError;
use offchain_core::{Command, VaspId};
use serde::{Deserialize, Serialize};

/// Produces signatures for the local VASP
pub trait EnvelopeSigner: Send + Sync {
    /// Identity the signatures belong to
    fn signer_id(&self) -> VaspId;

    fn sign(&self, payload: &[u8]) -> Vec<u8>;
}

/// Checks signatures of counterparties
pub trait EnvelopeVerifier: Send + Sync {
    fn verify(&self, signer: VaspId, payload: &[u8], signature: &[u8]) -> Result<(), SignatureError>;
}

/// A sequenced command as it travels between VASPs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEnvelope {
    pub signer: VaspId,
    pub offset: u64,
    pub payload: Vec<u8>,
    pub signature: Vec<u8>,
}

impl SignedEnvelope {
    /// Sign `command` at `offset`
    pub fn seal(
        signer: &dyn EnvelopeSigner,
        offset: u64,
        command: &Command,
    ) -> Result<Self, SignatureError> {
        let payload = bincode::serialize(&(offset, command))
            .map_err(|e| SignatureError::Malformed(e.to_string()))?;
        let signature = signer.sign(&payload);
        Ok(Self {
            signer: signer.signer_id(),
            offset,
            payload,
            signature,
        })
    }

    /// Verify and decode, returning the offset and command
    pub fn open(&self, verifier: &dyn EnvelopeVerifier) -> Result<(u64, Command), SignatureError> {
        verifier.verify(self.signer, &self.payload, &self.signature)?;
        let (offset, command): (u64, Command) = bincode::deserialize(&self.payload)
            .map_err(|e| SignatureError::Malformed(e.to_string()))?;
        if offset != self.offset {
            return Err(SignatureError::Mismatch(format!(
                "envelope offset {} signs offset {offset}",
                self.offset
            )));
        }
        if command.author != self.signer {
            return Err(SignatureError::Mismatch(format!(
                "{} signed a command authored by {}",
                self.signer, command.author
            )));
        }
        Ok((offset, command))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use offchain_core::{hash, ObjectId, ObjectState, ObjectStatus};

    /// Digest standing in for a signature
    pub(crate) struct DigestSigner(pub VaspId);

    fn digest(signer: VaspId, payload: &[u8]) -> Vec<u8> {
        let mut data = signer.to_bytes().to_vec();
        data.extend_from_slice(payload);
        hash(&data).as_bytes().to_vec()
    }

    impl EnvelopeSigner for DigestSigner {
        fn signer_id(&self) -> VaspId {
            self.0
        }

        fn sign(&self, payload: &[u8]) -> Vec<u8> {
            digest(self.0, payload)
        }
    }

    pub(crate) struct DigestVerifier;

    impl EnvelopeVerifier for DigestVerifier {
        fn verify(&self, signer: VaspId, payload: &[u8], signature: &[u8]) -> Result<(), SignatureError> {
            if digest(signer, payload) == signature {
                Ok(())
            } else {
                Err(SignatureError::BadSignature(signer))
            }
        }
    }

    fn command(author: VaspId) -> Command {
        Command::new(
            author,
            ObjectId::new("p"),
            None,
            ObjectState::new(ObjectStatus::NeedsKycData),
            1,
        )
    }

    #[test]
    fn test_seal_and_open() {
        let a = VaspId::new_from_entropy([1u8; 32]);
        let c = command(a);
        let envelope = SignedEnvelope::seal(&DigestSigner(a), 3, &c).unwrap();
        assert_eq!(envelope.open(&DigestVerifier).unwrap(), (3, c));
    }

    #[test]
    fn test_tampering_is_detected() {
        let a = VaspId::new_from_entropy([1u8; 32]);
        let b = VaspId::new_from_entropy([2u8; 32]);

        let mut moved = SignedEnvelope::seal(&DigestSigner(a), 3, &command(a)).unwrap();
        moved.offset = 4;
        assert_matches!(moved.open(&DigestVerifier), Err(SignatureError::Mismatch(_)));

        let mut flipped = SignedEnvelope::seal(&DigestSigner(a), 3, &command(a)).unwrap();
        flipped.payload[0] ^= 1;
        assert_matches!(flipped.open(&DigestVerifier), Err(SignatureError::BadSignature(_)));

        // b signs a's command
        let forged = SignedEnvelope::seal(&DigestSigner(b), 0, &command(a)).unwrap();
        assert_matches!(forged.open(&DigestVerifier), Err(SignatureError::Mismatch(_)));
    }
}
