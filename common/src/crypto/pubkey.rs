use borsh::{BorshDeserialize, BorshSerialize};
use serde::de::Error as SerdeError;
use serde::{Deserialize, Serialize};
use std::{
    convert::TryInto,
    fmt::{Debug, Display, Error, Formatter},
    str::FromStr,
};

use super::CryptoError;

pub const PUBKEY_SIZE: usize = 32; // 32 bytes / 256 bits

// Longest base58 text of a 32 bytes value
const MAX_BASE58_LEN: usize = 44;

// Address of an account, a program or a signer on the ledger
#[derive(
    Eq, PartialEq, PartialOrd, Ord, Clone, Copy, Hash, Default, BorshSerialize, BorshDeserialize,
)]
pub struct Pubkey([u8; PUBKEY_SIZE]);

impl Pubkey {
    pub const fn new(bytes: [u8; PUBKEY_SIZE]) -> Self {
        Pubkey(bytes)
    }

    pub const fn zero() -> Self {
        Pubkey::new([0; PUBKEY_SIZE])
    }

    pub fn as_bytes(&self) -> &[u8; PUBKEY_SIZE] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; PUBKEY_SIZE] {
        self.0
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; PUBKEY_SIZE] =
            bytes
                .try_into()
                .map_err(|_| CryptoError::InvalidPubkeyLength {
                    len: bytes.len(),
                    expected: PUBKEY_SIZE,
                })?;
        Ok(Pubkey(bytes))
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }
}

impl FromStr for Pubkey {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() > MAX_BASE58_LEN {
            return Err(CryptoError::InvalidBase58(s.to_owned()));
        }

        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|_| CryptoError::InvalidBase58(s.to_owned()))?;
        Pubkey::from_slice(&bytes)
    }
}

impl AsRef<[u8]> for Pubkey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; PUBKEY_SIZE]> for Pubkey {
    fn from(bytes: [u8; PUBKEY_SIZE]) -> Self {
        Pubkey(bytes)
    }
}

impl Display for Pubkey {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "{}", &self.to_base58())
    }
}

impl Debug for Pubkey {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "Pubkey({})", &self.to_base58())
    }
}

impl Serialize for Pubkey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_base58())
    }
}

impl<'a> Deserialize<'a> for Pubkey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'a>,
    {
        let value = <String as Deserialize>::deserialize(deserializer)?;
        Pubkey::from_str(&value).map_err(SerdeError::custom)
    }
}
