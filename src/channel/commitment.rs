use super::{PartIdx, PARTICIPANTS};
use crate::{
    sig,
    types::{Address, Hash, Signature},
};

#[derive(Debug, thiserror::Error)]
pub enum SignError {
    #[error("participant {0} already signed")]
    AlreadySigned(PartIdx),
    #[error("no participant with index {0}")]
    InvalidPartIdx(PartIdx),
    #[error(transparent)]
    Signer(#[from] sig::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("signature of participant {part_idx} could not be recovered: {source}")]
    RecoveryFailed {
        part_idx: PartIdx,
        source: sig::Error,
    },
    #[error("signature of participant {part_idx} recovers to {recovered}, expected {expected}")]
    InvalidSignature {
        part_idx: PartIdx,
        expected: Address,
        recovered: Address,
    },
}

/// Signatures of the participants over an update's commitment hash.
///
/// Slot `i` holds the signature of participant `i`. With one signature the
/// update is proposed, with both it is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MultisigCommitment {
    signatures: [Option<Signature>; PARTICIPANTS],
}

impl MultisigCommitment {
    pub fn from_signatures(signatures: [Option<Signature>; PARTICIPANTS]) -> Self {
        MultisigCommitment { signatures }
    }

    pub fn signatures(&self) -> &[Option<Signature>; PARTICIPANTS] {
        &self.signatures
    }

    pub fn signature(&self, part_idx: PartIdx) -> Option<Signature> {
        self.signatures.get(part_idx).copied().flatten()
    }

    pub fn num_signatures(&self) -> usize {
        self.signatures.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_proposed(&self) -> bool {
        self.num_signatures() == 1
    }

    pub fn is_final(&self) -> bool {
        self.num_signatures() == PARTICIPANTS
    }

    pub fn add_signature(&mut self, part_idx: PartIdx, sig: Signature) -> Result<(), SignError> {
        match self.signatures.get_mut(part_idx) {
            None => Err(SignError::InvalidPartIdx(part_idx)),
            Some(Some(_)) => Err(SignError::AlreadySigned(part_idx)),
            Some(slot) => {
                *slot = Some(sig);
                Ok(())
            }
        }
    }

    /// Checks that every present signature was produced by the participant
    /// owning its slot. Missing signatures are not an error.
    pub fn verify(
        &self,
        hash: Hash,
        participants: &[Address; PARTICIPANTS],
    ) -> Result<(), VerifyError> {
        for (part_idx, sig) in self.signatures.iter().enumerate() {
            let Some(sig) = sig else { continue };
            let recovered = sig::recover_signer(hash, *sig)
                .map_err(|source| VerifyError::RecoveryFailed { part_idx, source })?;
            if recovered != participants[part_idx] {
                return Err(VerifyError::InvalidSignature {
                    part_idx,
                    expected: participants[part_idx],
                    recovered,
                });
            }
        }
        Ok(())
    }
}
