// Instruction builders for the programs this client talks to

pub mod cron;
pub mod delegation;
pub mod queue;

use thiserror::Error;

use crate::{account::LayoutError, crypto::CryptoError, transaction::CompileError};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("Description is {len} bytes long, maximum is {max}")]
    DescriptionTooLong { len: usize, max: usize },
}

// Split an instruction into its 8 bytes method discriminator and arguments
pub fn split_discriminator(data: &[u8]) -> Option<(&[u8], &[u8])> {
    if data.len() < crate::account::DISCRIMINATOR_SIZE {
        return None;
    }
    Some(data.split_at(crate::account::DISCRIMINATOR_SIZE))
}

// Whether `data` is a call to `method`
pub fn is_method(data: &[u8], method: &str) -> bool {
    split_discriminator(data)
        .map(|(discriminator, _)| discriminator == crate::account::instruction_discriminator(method))
        .unwrap_or(false)
}
