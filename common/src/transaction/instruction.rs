use borsh::BorshSerialize;
use serde::{Deserialize, Serialize};

use crate::{
    account::{instruction_discriminator, LayoutError},
    config::SYSTEM_PROGRAM_ID,
    crypto::Pubkey,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountMeta {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    pub fn new(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: true,
        }
    }

    pub fn new_readonly(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: false,
        }
    }
}

// One call into a program, with every account it touches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub program_id: Pubkey,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

impl Instruction {
    pub fn new(program_id: Pubkey, accounts: Vec<AccountMeta>, data: Vec<u8>) -> Self {
        Self {
            program_id,
            accounts,
            data,
        }
    }

    // Build a call to a named method: discriminator followed by borsh encoded arguments
    pub fn anchor<A: BorshSerialize>(
        program_id: Pubkey,
        method: &'static str,
        args: &A,
        accounts: Vec<AccountMeta>,
    ) -> Result<Self, LayoutError> {
        let mut data = instruction_discriminator(method).to_vec();
        args.serialize(&mut data)
            .map_err(|source| LayoutError::Encode {
                name: method,
                source,
            })?;
        Ok(Self::new(program_id, accounts, data))
    }

    // Every account the instruction declares, the program included
    pub fn touches(&self, key: &Pubkey) -> bool {
        self.program_id == *key || self.accounts.iter().any(|meta| meta.pubkey == *key)
    }

    pub fn is_writable(&self, key: &Pubkey) -> bool {
        self.accounts
            .iter()
            .any(|meta| meta.pubkey == *key && meta.is_writable)
    }
}

// System program transfer of `lamports` from `from` to `to`
pub fn system_transfer(from: &Pubkey, to: &Pubkey, lamports: u64) -> Instruction {
    // instruction index 2 of the system program, u32 little endian
    let mut data = Vec::with_capacity(12);
    data.extend_from_slice(&2u32.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());

    Instruction::new(
        SYSTEM_PROGRAM_ID,
        vec![AccountMeta::new(*from, true), AccountMeta::new(*to, false)],
        data,
    )
}

// Decode the lamports of a system transfer built by `system_transfer`
pub fn decode_system_transfer(instruction: &Instruction) -> Option<u64> {
    if instruction.program_id != SYSTEM_PROGRAM_ID || instruction.data.len() != 12 {
        return None;
    }

    let (index, lamports) = instruction.data.split_at(4);
    if index != 2u32.to_le_bytes() {
        return None;
    }

    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(lamports);
    Some(u64::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_transfer_layout() {
        let from = Pubkey::new([1u8; 32]);
        let to = Pubkey::new([2u8; 32]);
        let ix = system_transfer(&from, &to, 20_000_000);
        assert_eq!(ix.data[..4], [2, 0, 0, 0]);
        assert_eq!(decode_system_transfer(&ix), Some(20_000_000));
        assert!(ix.accounts[0].is_signer && ix.accounts[0].is_writable);
        assert!(!ix.accounts[1].is_signer && ix.accounts[1].is_writable);
    }

    #[test]
    fn test_anchor_data_starts_with_discriminator() {
        let ix = Instruction::anchor(Pubkey::new([9u8; 32]), "update", &42u64, vec![]).unwrap();
        assert_eq!(ix.data[..8], instruction_discriminator("update"));
        assert_eq!(ix.data[8..], 42u64.to_le_bytes());
    }
}
