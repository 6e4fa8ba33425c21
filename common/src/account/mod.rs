pub mod bitmap;
mod cron;
mod error;
mod task_queue;

pub use bitmap::*;
pub use cron::*;
pub use error::LayoutError;
pub use task_queue::*;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::crypto::{hash, Pubkey};

pub const DISCRIMINATOR_SIZE: usize = 8;

// Raw account as returned by the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub lamports: u64,
    pub owner: Pubkey,
    pub data: Vec<u8>,
    #[serde(default)]
    pub executable: bool,
}

impl Account {
    pub fn new(lamports: u64, owner: Pubkey, data: Vec<u8>) -> Self {
        Self {
            lamports,
            owner,
            data,
            executable: false,
        }
    }

    pub fn is_owned_by(&self, program_id: &Pubkey) -> bool {
        self.owner == *program_id
    }
}

// Discriminator of an account type: first 8 bytes of sha256("account:<Name>")
pub fn account_discriminator(name: &str) -> [u8; DISCRIMINATOR_SIZE] {
    prefix_discriminator("account", name)
}

// Discriminator of an instruction: first 8 bytes of sha256("global:<name>")
pub fn instruction_discriminator(name: &str) -> [u8; DISCRIMINATOR_SIZE] {
    prefix_discriminator("global", name)
}

fn prefix_discriminator(namespace: &str, name: &str) -> [u8; DISCRIMINATOR_SIZE] {
    let preimage = format!("{}:{}", namespace, name);
    let digest = hash(preimage.as_bytes());
    let mut discriminator = [0u8; DISCRIMINATOR_SIZE];
    discriminator.copy_from_slice(&digest.as_bytes()[..DISCRIMINATOR_SIZE]);
    discriminator
}

// Account type stored with an 8 bytes discriminator followed by its borsh encoding
pub trait AnchorAccount: BorshSerialize + BorshDeserialize {
    const NAME: &'static str;

    fn discriminator() -> [u8; DISCRIMINATOR_SIZE] {
        account_discriminator(Self::NAME)
    }

    // Trailing bytes are ignored, accounts are often allocated bigger than needed
    fn decode(data: &[u8]) -> Result<Self, LayoutError> {
        if data.len() < DISCRIMINATOR_SIZE {
            return Err(LayoutError::TooShort {
                len: data.len(),
                min: DISCRIMINATOR_SIZE,
            });
        }

        if data[..DISCRIMINATOR_SIZE] != Self::discriminator() {
            return Err(LayoutError::InvalidDiscriminator { name: Self::NAME });
        }

        let mut body = &data[DISCRIMINATOR_SIZE..];
        Self::deserialize(&mut body).map_err(|source| LayoutError::Decode {
            name: Self::NAME,
            source,
        })
    }

    fn encode(&self) -> Result<Vec<u8>, LayoutError> {
        let mut data = Self::discriminator().to_vec();
        self.serialize(&mut data)
            .map_err(|source| LayoutError::Encode {
                name: Self::NAME,
                source,
            })?;
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discriminators_differ_by_namespace() {
        assert_ne!(
            account_discriminator("TaskQueueV0"),
            instruction_discriminator("TaskQueueV0")
        );
    }

    #[test]
    fn test_decode_rejects_short_data() {
        assert!(matches!(
            TaskQueueV0::decode(&[1, 2, 3]),
            Err(LayoutError::TooShort { len: 3, .. })
        ));
    }

    #[test]
    fn test_decode_rejects_other_account_type() {
        let mapping = CronJobNameMappingV0 {
            cron_job: Pubkey::new([1u8; 32]),
            name: "job".to_string(),
            bump_seed: 255,
        };
        let data = mapping.encode().unwrap();
        assert!(matches!(
            TaskQueueV0::decode(&data),
            Err(LayoutError::InvalidDiscriminator { .. })
        ));
    }
}
