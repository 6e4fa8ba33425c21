use ed25519_dalek::{Signer as _, SigningKey};
use rand::rngs::OsRng;
use std::fmt;
use tasklane_common::crypto::{CryptoError, Pubkey, Signature};

// Anything able to sign transactions for one address
pub trait Signer: Send + Sync {
    fn pubkey(&self) -> Pubkey;

    fn sign_message(&self, message: &[u8]) -> Signature;
}

// In-memory ed25519 key pair
pub struct Keypair {
    key: SigningKey,
}

impl Keypair {
    pub fn new() -> Self {
        Self {
            key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_secret(secret: &[u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(secret),
        }
    }

    /// Secret followed by public key, the 64 bytes layout of CLI key files.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes: &[u8; 64] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKeypair(format!("expected 64 bytes, got {}", bytes.len())))?;
        let key = SigningKey::from_keypair_bytes(bytes)
            .map_err(|e| CryptoError::InvalidKeypair(e.to_string()))?;
        Ok(Self { key })
    }

    pub fn from_base58(value: &str) -> Result<Self, CryptoError> {
        let bytes = bs58::decode(value)
            .into_vec()
            .map_err(|_| CryptoError::InvalidBase58(value.to_owned()))?;
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> [u8; 64] {
        self.key.to_keypair_bytes()
    }
}

impl Default for Keypair {
    fn default() -> Self {
        Self::new()
    }
}

impl Signer for Keypair {
    fn pubkey(&self) -> Pubkey {
        Pubkey::new(self.key.verifying_key().to_bytes())
    }

    fn sign_message(&self, message: &[u8]) -> Signature {
        Signature::new(self.key.sign(message).to_bytes())
    }
}

// Never print the secret
impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair({})", self.pubkey())
    }
}

// Verify `signature` of `message` by `pubkey`
pub fn verify(pubkey: &Pubkey, message: &[u8], signature: &Signature) -> bool {
    let Ok(key) = ed25519_dalek::VerifyingKey::from_bytes(pubkey.as_bytes()) else {
        return false;
    };
    let signature = ed25519_dalek::Signature::from_bytes(signature.as_bytes());
    key.verify_strict(message, &signature).is_ok()
}
