use thiserror::Error;

/// Errors that can occur while parsing or deriving addresses
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Text is not valid base58
    #[error("Invalid base58 string: {0}")]
    InvalidBase58(String),

    /// Decoded public key has the wrong length
    #[error("Invalid public key length: {len} bytes, expected: {expected} bytes")]
    InvalidPubkeyLength { len: usize, expected: usize },

    /// Decoded signature has the wrong length
    #[error("Invalid signature length: {len} bytes, expected: {expected} bytes")]
    InvalidSignatureLength { len: usize, expected: usize },

    /// Too many seeds were given for a derived address
    #[error("Too many seeds: {count}, maximum: {max}")]
    TooManySeeds { count: usize, max: usize },

    /// One seed exceeds the maximum seed length
    #[error("Seed #{index} is {len} bytes long, maximum: {max} bytes")]
    SeedTooLong {
        index: usize,
        len: usize,
        max: usize,
    },

    /// The derived address lies on the ed25519 curve
    #[error("Derived address is on the curve")]
    OnCurve,

    /// No bump seed produced a valid derived address
    #[error("Unable to find a viable bump seed")]
    NoViableBump,

    /// Secret key bytes could not be used
    #[error("Invalid keypair: {0}")]
    InvalidKeypair(String),
}
