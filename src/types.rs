use core::fmt::{Debug, Display};

use rand::{distributions::Standard, prelude::Distribution};
use sha3::{Digest, Keccak256};
use uint::construct_uint;

#[cfg(feature = "secp256k1")]
use secp256k1::{PublicKey, ThirtyTwoByteHash};

macro_rules! impl_hex_debug {
    ($T:ident) => {
        impl Debug for $T {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str("0x")?;
                for b in self.0 {
                    f.write_fmt(format_args!("{:02x}", b))?;
                }
                Ok(())
            }
        }

        impl Display for $T {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                Debug::fmt(self, f)
            }
        }
    };
}

macro_rules! bytesN {
    ( $T:ident, $N:literal ) => {
        #[derive(PartialEq, Eq, Hash, Copy, Clone)]
        pub struct $T(pub [u8; $N]);

        impl $T {
            pub const LEN: usize = $N;

            /// Parses the exact-length byte representation, as found on the
            /// wire.
            pub fn from_slice(bytes: &[u8]) -> Option<Self> {
                Some(Self(bytes.try_into().ok()?))
            }
        }

        impl Distribution<$T> for Standard {
            fn sample<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> $T {
                let mut bytes = [0u8; $N];
                rng.fill(&mut bytes[..]);
                $T(bytes)
            }
        }

        impl Default for $T {
            fn default() -> Self {
                Self([0; $N])
            }
        }

        impl_hex_debug!($T);
    };
}

bytesN!(Hash, 32);
bytesN!(Signature, 65);
bytesN!(Address, 20);

#[cfg(feature = "secp256k1")]
impl ThirtyTwoByteHash for Hash {
    fn into_32(self) -> [u8; 32] {
        self.0
    }
}

impl Signature {
    pub fn new(rs: &[u8; 64], v: u8) -> Self {
        let mut sig: Signature = Signature([0; 65]);
        sig.0[..64].copy_from_slice(rs);
        sig.0[64] = v;
        sig
    }
}

impl Hash {
    pub fn keccak256(data: &[u8]) -> Self {
        Hash(Keccak256::digest(data).into())
    }
}

impl Address {
    /// Ethereum address of an uncompressed SEC1 public key (65 bytes, leading
    /// `0x04` tag included).
    pub fn from_uncompressed_key(pk_bytes: &[u8; 65]) -> Self {
        // Throw away the first byte, which is not part of the public key.
        let hash = Hash::keccak256(&pk_bytes[1..]);

        let mut addr = Address([0; 20]);
        addr.0.copy_from_slice(&hash.0[32 - 20..]);
        addr
    }
}

#[cfg(feature = "secp256k1")]
impl From<PublicKey> for Address {
    fn from(pk: PublicKey) -> Self {
        Address::from_uncompressed_key(&pk.serialize_uncompressed())
    }
}

// Balances are plain 256 bit unsigned integers, big-endian on the wire.
construct_uint! {
    pub struct U256(4);
}

impl U256 {
    pub fn to_be_bytes(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        self.to_big_endian(&mut bytes);
        bytes
    }

    /// Parses at most 32 big-endian bytes.
    pub fn from_be_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() > 32 {
            return None;
        }
        Some(U256::from_big_endian(bytes))
    }
}

impl Distribution<U256> for Standard {
    fn sample<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> U256 {
        let buf: [u8; 32] = rng.gen();
        U256::from_big_endian(&buf)
    }
}
