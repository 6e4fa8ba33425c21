// Delegation program on the base ledger and Magic program on the rollup
//
// The delegation program takes ownership of an account on the base ledger while
// the rollup holds it. The Magic program schedules commits of rollup state back
// to the base ledger, optionally handing the account back to its owner.

use borsh::{BorshDeserialize, BorshSerialize};

use super::BuildError;
use crate::{
    config::{DELEGATION_PROGRAM_ID, MAGIC_CONTEXT_ID, MAGIC_PROGRAM_ID, SYSTEM_PROGRAM_ID},
    crypto::Pubkey,
    derive::{delegate_buffer_key, delegation_metadata_key, delegation_record_key},
    transaction::{AccountMeta, Instruction},
};

// u64 little endian instruction tags of the delegation program
pub const DELEGATE_TAG: u64 = 0;

// u32 little endian instruction tags of the Magic program
pub const SCHEDULE_COMMIT_TAG: u32 = 1;
pub const SCHEDULE_COMMIT_AND_UNDELEGATE_TAG: u32 = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct DelegateArgs {
    pub commit_frequency_ms: u32,
    pub seeds: Vec<Vec<u8>>,
    pub validator: Option<Pubkey>,
}

/// Hand `delegated` over to the delegation program.
///
/// Issued by `owner_program` on behalf of the account, which signs with its
/// own seeds.
pub fn delegate(
    payer: &Pubkey,
    delegated: &Pubkey,
    owner_program: &Pubkey,
    args: &DelegateArgs,
) -> Result<Instruction, BuildError> {
    let mut data = DELEGATE_TAG.to_le_bytes().to_vec();
    args.serialize(&mut data)
        .map_err(|source| crate::account::LayoutError::Encode {
            name: "DelegateArgs",
            source,
        })?;

    let accounts = vec![
        AccountMeta::new(*payer, true),
        AccountMeta::new(*delegated, true),
        AccountMeta::new_readonly(*owner_program, false),
        AccountMeta::new(delegate_buffer_key(owner_program, delegated)?, false),
        AccountMeta::new(delegation_record_key(delegated)?, false),
        AccountMeta::new(delegation_metadata_key(delegated)?, false),
        AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
    ];

    Ok(Instruction::new(*DELEGATION_PROGRAM_ID, accounts, data))
}

pub fn decode_delegate(instruction: &Instruction) -> Option<DelegateArgs> {
    if instruction.program_id != *DELEGATION_PROGRAM_ID || instruction.data.len() < 8 {
        return None;
    }
    let (tag, mut body) = instruction.data.split_at(8);
    if tag != DELEGATE_TAG.to_le_bytes() {
        return None;
    }
    DelegateArgs::deserialize(&mut body).ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MagicInstruction {
    ScheduleCommit,
    ScheduleCommitAndUndelegate,
}

impl MagicInstruction {
    fn tag(&self) -> u32 {
        match self {
            Self::ScheduleCommit => SCHEDULE_COMMIT_TAG,
            Self::ScheduleCommitAndUndelegate => SCHEDULE_COMMIT_AND_UNDELEGATE_TAG,
        }
    }

    pub fn decode(instruction: &Instruction) -> Option<Self> {
        if instruction.program_id != *MAGIC_PROGRAM_ID || instruction.data.len() < 4 {
            return None;
        }
        let mut tag = [0u8; 4];
        tag.copy_from_slice(&instruction.data[..4]);
        match u32::from_le_bytes(tag) {
            SCHEDULE_COMMIT_TAG => Some(Self::ScheduleCommit),
            SCHEDULE_COMMIT_AND_UNDELEGATE_TAG => Some(Self::ScheduleCommitAndUndelegate),
            _ => None,
        }
    }

    pub fn undelegates(&self) -> bool {
        matches!(self, Self::ScheduleCommitAndUndelegate)
    }
}

fn magic(kind: MagicInstruction, payer: &Pubkey, committees: &[Pubkey]) -> Instruction {
    let mut accounts = vec![
        AccountMeta::new(*payer, true),
        AccountMeta::new(*MAGIC_CONTEXT_ID, false),
    ];
    accounts.extend(committees.iter().map(|key| AccountMeta::new(*key, false)));

    Instruction::new(*MAGIC_PROGRAM_ID, accounts, kind.tag().to_le_bytes().to_vec())
}

// Commit the rollup state of `committees` to the base ledger
pub fn schedule_commit(payer: &Pubkey, committees: &[Pubkey]) -> Instruction {
    magic(MagicInstruction::ScheduleCommit, payer, committees)
}

// Commit, then return ownership of `committees` to their program on the base ledger
pub fn schedule_commit_and_undelegate(payer: &Pubkey, committees: &[Pubkey]) -> Instruction {
    magic(MagicInstruction::ScheduleCommitAndUndelegate, payer, committees)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_instructions() {
        let payer = Pubkey::new([1u8; 32]);
        let account = Pubkey::new([2u8; 32]);
        let commit = schedule_commit(&payer, &[account]);
        let undelegate = schedule_commit_and_undelegate(&payer, &[account]);

        assert_eq!(MagicInstruction::decode(&commit), Some(MagicInstruction::ScheduleCommit));
        assert_eq!(
            MagicInstruction::decode(&undelegate),
            Some(MagicInstruction::ScheduleCommitAndUndelegate)
        );
        assert_eq!(commit.accounts[1].pubkey, *MAGIC_CONTEXT_ID);
        assert_eq!(commit.accounts[2].pubkey, account);
    }

    #[test]
    fn test_delegate_args_decode() {
        let args = DelegateArgs {
            commit_frequency_ms: 30_000,
            seeds: vec![b"user".to_vec()],
            validator: Some(Pubkey::new([7u8; 32])),
        };
        let ix = delegate(
            &Pubkey::new([1u8; 32]),
            &Pubkey::new([2u8; 32]),
            &Pubkey::new([3u8; 32]),
            &args,
        )
        .unwrap();
        assert_eq!(decode_delegate(&ix), Some(args));
        assert!(ix.accounts[1].is_signer);
    }
}
