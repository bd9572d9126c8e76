//! Signer using the k256 Rust crate (implementation of ecdsa in Rust).

use crate::types::{Address, Hash, Signature};
use k256::{
    ecdsa::{
        recoverable,
        signature::{hazmat::PrehashSigner, Signature as k256Signature},
        SigningKey, VerifyingKey,
    },
    elliptic_curve::sec1::ToEncodedPoint,
};

use super::hash_to_eth_signed_msg_hash;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid private key")]
    InvalidKey,
    #[error("signing failed: {0}")]
    Signing(k256::ecdsa::Error),
    #[error("signature recovery failed: {0}")]
    Recovery(k256::ecdsa::Error),
}

impl From<VerifyingKey> for Address {
    fn from(key: VerifyingKey) -> Self {
        // The uncompressed EncodedPoint is always 65 bytes (tag + x + y), the
        // fallback only exists to avoid a panic path.
        let encoded = key.to_encoded_point(false);
        let pk_bytes: [u8; 65] = encoded.as_bytes().try_into().unwrap_or([0u8; 65]);
        Address::from_uncompressed_key(&pk_bytes)
    }
}

pub struct Signer {
    key: SigningKey,
    addr: Address,
}

// Never print the private key.
impl core::fmt::Debug for Signer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Signer").field("addr", &self.addr).finish()
    }
}

impl Signer {
    pub fn new<R: rand::Rng + rand::CryptoRng>(rng: &mut R) -> Self {
        let key = SigningKey::random(rng);
        let addr = key.verifying_key().into();
        Self { key, addr }
    }

    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Result<Self, Error> {
        let key = SigningKey::from_bytes(bytes).map_err(|_| Error::InvalidKey)?;
        let addr = key.verifying_key().into();
        Ok(Self { key, addr })
    }

    pub fn address(&self) -> Address {
        self.addr
    }

    pub fn sign_eth(&self, msg: Hash) -> Result<Signature, Error> {
        // "\x19Ethereum Signed Message:\n32" format
        let hash = hash_to_eth_signed_msg_hash(msg);

        let sig: recoverable::Signature =
            self.key.sign_prehash(&hash.0).map_err(Error::Signing)?;

        // The recoverable signature already has the layout we need: 65 bytes
        // containing r, s and v in this order. v still has to be offset by 27
        // for the signature to be valid in the EVM.
        let mut sig_bytes = [0u8; 65];
        sig_bytes.copy_from_slice(sig.as_bytes());
        debug_assert!(sig_bytes[32] & 0x80 == 0);
        sig_bytes[64] += 27;

        Ok(Signature(sig_bytes))
    }

    pub fn recover_signer(&self, msg: Hash, eth_sig: Signature) -> Result<Address, Error> {
        recover_signer(msg, eth_sig)
    }
}

/// Recover the address that produced `eth_sig` over `msg`.
///
/// `msg` is the hash given to [Signer::sign_eth()], without the `Ethereum
/// Signed Message` prefix.
pub fn recover_signer(msg: Hash, eth_sig: Signature) -> Result<Address, Error> {
    let hash = hash_to_eth_signed_msg_hash(msg);

    // Undo adding the 27, to go back to the format expected below
    let mut sig_bytes: [u8; 65] = eth_sig.0;
    sig_bytes[64] = sig_bytes[64].wrapping_sub(27);

    let sig = recoverable::Signature::from_bytes(&sig_bytes).map_err(Error::Recovery)?;

    let verifying_key = sig
        .recover_verifying_key_from_digest_bytes(&hash.0.into())
        .map_err(Error::Recovery)?;
    Ok(verifying_key.into())
}
