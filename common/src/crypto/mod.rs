mod hash;
mod pubkey;
mod signature;

pub mod error;
pub mod pda;

pub use error::CryptoError;
pub use hash::*;
pub use pda::{create_program_address, find_program_address};
pub use pubkey::*;
pub use signature::*;
