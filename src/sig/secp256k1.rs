//! Signer using the secp256k1 crate (bindings to libsecp256k1).

use crate::types::{Address, Hash, Signature};
use secp256k1::{
    self,
    ecdsa::{RecoverableSignature, RecoveryId},
    All, Message, Secp256k1, SecretKey,
};

use super::hash_to_eth_signed_msg_hash;

pub use secp256k1::Error;

pub struct Signer {
    secp: Secp256k1<All>,
    sk: SecretKey,
    addr: Address,
}

impl core::fmt::Debug for Signer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Signer").field("addr", &self.addr).finish()
    }
}

impl Signer {
    pub fn new<R: rand::Rng + rand::CryptoRng>(rng: &mut R) -> Self {
        let secp = Secp256k1::new();
        let sk = SecretKey::new(rng);
        let addr = sk.public_key(&secp).into();
        Self { secp, sk, addr }
    }

    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Result<Self, Error> {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(bytes)?;
        let addr = sk.public_key(&secp).into();
        Ok(Self { secp, sk, addr })
    }

    pub fn address(&self) -> Address {
        self.addr
    }

    /// Sign a hash using a Ethereum 65-byte recoverable signature.
    pub fn sign_eth(&self, msg: Hash) -> Result<Signature, Error> {
        // "\x19Ethereum Signed Message:\n32" format
        let hash = hash_to_eth_signed_msg_hash(msg);

        // We have to use sign_ecdsa_recoverable because the counterparty must
        // be able to recover the address. This gives us the additional
        // information needed for v.
        let sig = self
            .secp
            .sign_ecdsa_recoverable(&Message::from(hash), &self.sk);
        let (v, rs) = sig.serialize_compact();

        // EIP-2: only canonical (low s) signatures are valid.
        debug_assert!(rs[32] & 0x80 == 0);

        // yParity is offset by 27 for Ethereum compatibility.
        let v: u8 = 27 + v.to_i32() as u8;

        Ok(Signature::new(&rs, v))
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
    let secp = Secp256k1::verification_only();
    let hash = hash_to_eth_signed_msg_hash(msg);

    let rs = &eth_sig.0[..64];
    let v = eth_sig.0[64].wrapping_sub(27);

    let recid = RecoveryId::from_i32(v.into())?;
    let sig = RecoverableSignature::from_compact(rs, recid)?;

    let pk = secp.recover_ecdsa(&Message::from(hash), &sig)?;

    Ok(pk.into())
}
