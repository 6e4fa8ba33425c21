use sha2::{Digest, Sha256};
use std::{fmt, str::FromStr};

use super::CryptoError;

pub const HASH_SIZE: usize = 32;

/// SHA-256 digest. Blockhashes and anchor discriminators are both built from it.
#[derive(Eq, PartialEq, PartialOrd, Ord, Clone, Copy, Debug, Hash, Default)]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    pub const fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    pub const fn zero() -> Self {
        Self([0; HASH_SIZE])
    }

    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; HASH_SIZE] {
        self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

pub fn hashv(values: &[&[u8]]) -> Hash {
    let digest = values
        .iter()
        .fold(Sha256::new(), |hasher, value| hasher.chain_update(value))
        .finalize();
    Hash(digest.into())
}

#[inline(always)]
pub fn hash(value: &[u8]) -> Hash {
    hashv(&[value])
}

// Blockhashes travel as base58 over RPC
impl FromStr for Hash {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decoded = bs58::decode(s)
            .into_vec()
            .map_err(|_| CryptoError::InvalidBase58(s.to_owned()))?;
        let len = decoded.len();
        <[u8; HASH_SIZE]>::try_from(decoded)
            .map(Self)
            .map_err(|_| CryptoError::InvalidPubkeyLength {
                len,
                expected: HASH_SIZE,
            })
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}
