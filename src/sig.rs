//! Handles the creation and verification of (Ethereum) Signatures.
//!
//! Commitments are signed as Ethereum personal messages over the commitment
//! hash, so a participant's public identifier is simply its address.

use crate::types::Hash;
use sha3::{Digest, Keccak256};

#[cfg(feature = "k256")]
mod k256;
#[cfg(feature = "k256")]
pub use self::k256::{recover_signer, Error, Signer};

// Compiled next to k256 when both are selected, so the two backends can be
// checked against each other.
#[cfg(feature = "secp256k1")]
#[cfg_attr(feature = "k256", allow(dead_code))]
mod secp256k1;
#[cfg(all(feature = "secp256k1", not(feature = "k256")))]
pub use self::secp256k1::{recover_signer, Error, Signer};

#[cfg(not(any(feature = "k256", feature = "secp256k1")))]
compile_error!("Select a signature backend with the feature flag 'k256' or 'secp256k1'");


/// Add the `\x19Ethereum Signed Message\n<length>` prefix to hash.
///
/// This is the format expected by the Solidity contracts.
fn hash_to_eth_signed_msg_hash(hash: Hash) -> Hash {
    // Packed encoding => We can't use the serializer
    let mut hasher = Keccak256::new();
    hasher.update(b"\x19Ethereum Signed Message:\n32");
    hasher.update(hash.0);
    Hash(hasher.finalize().into())
}
