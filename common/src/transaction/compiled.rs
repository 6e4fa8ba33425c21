// Compact transaction stored inside a queued task
//
// Accounts are deduplicated and ordered writable signers, readonly signers,
// writable, readonly. Instructions reference them by index. The same accounts,
// stripped of their signer flag, are passed as remaining accounts with the
// queue call so the queue program can check them.

use borsh::{BorshDeserialize, BorshSerialize};
use indexmap::IndexMap;

use super::{AccountMeta, CompileError, Instruction};
use crate::crypto::Pubkey;

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct CompiledInstructionV0 {
    pub program_id_index: u8,
    pub accounts: Vec<u8>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct CompiledTransactionV0 {
    pub num_rw_signers: u8,
    pub num_ro_signers: u8,
    pub num_rw: u8,
    pub accounts: Vec<Pubkey>,
    pub instructions: Vec<CompiledInstructionV0>,
    pub signer_seeds: Vec<Vec<Vec<u8>>>,
}

impl CompiledTransactionV0 {
    // Every account referenced by the compiled transaction
    pub fn references(&self, key: &Pubkey) -> bool {
        self.accounts.contains(key)
    }
}

#[derive(Clone, Copy, Default)]
struct KeyFlags {
    is_signer: bool,
    is_writable: bool,
}

impl KeyFlags {
    // ordering class: 0 writable signer, 1 readonly signer, 2 writable, 3 readonly
    fn class(&self) -> u8 {
        match (self.is_signer, self.is_writable) {
            (true, true) => 0,
            (true, false) => 1,
            (false, true) => 2,
            (false, false) => 3,
        }
    }
}

/// Compile `instructions` into the queue's compact format.
///
/// `signer_seeds` are the seeds of derived signers the queue program signs for
/// when it executes the task.
pub fn compile_transaction(
    instructions: Vec<Instruction>,
    signer_seeds: Vec<Vec<Vec<u8>>>,
) -> Result<(CompiledTransactionV0, Vec<AccountMeta>), CompileError> {
    if instructions.is_empty() {
        return Err(CompileError::Empty);
    }

    // insertion order is kept for keys of the same class
    let mut keys: IndexMap<Pubkey, KeyFlags> = IndexMap::new();
    for ix in instructions.iter() {
        for meta in ix.accounts.iter() {
            let flags = keys.entry(meta.pubkey).or_default();
            flags.is_signer |= meta.is_signer;
            flags.is_writable |= meta.is_writable;
        }
        keys.entry(ix.program_id).or_default();
    }

    let mut ordered: Vec<(Pubkey, KeyFlags)> = keys.into_iter().collect();
    // stable sort keeps the first appearance order inside a class
    ordered.sort_by_key(|(_, flags)| flags.class());

    if ordered.len() > u8::MAX as usize {
        return Err(CompileError::TooManyAccounts(ordered.len()));
    }

    let count = |class: u8| ordered.iter().filter(|(_, f)| f.class() == class).count() as u8;
    let num_rw_signers = count(0);
    let num_ro_signers = count(1);
    let num_rw = count(2);

    let index_of = |key: &Pubkey| -> Result<u8, CompileError> {
        ordered
            .iter()
            .position(|(k, _)| k == key)
            .map(|i| i as u8)
            .ok_or(CompileError::UnknownAccount(*key))
    };

    let mut compiled = Vec::with_capacity(instructions.len());
    for ix in instructions {
        let accounts = ix
            .accounts
            .iter()
            .map(|meta| index_of(&meta.pubkey))
            .collect::<Result<Vec<u8>, CompileError>>()?;

        compiled.push(CompiledInstructionV0 {
            program_id_index: index_of(&ix.program_id)?,
            accounts,
            data: ix.data,
        });
    }

    let remaining_accounts = ordered
        .iter()
        .map(|(key, flags)| AccountMeta {
            pubkey: *key,
            is_signer: false,
            is_writable: flags.is_writable,
        })
        .collect();

    let transaction = CompiledTransactionV0 {
        num_rw_signers,
        num_ro_signers,
        num_rw,
        accounts: ordered.into_iter().map(|(key, _)| key).collect(),
        instructions: compiled,
        signer_seeds,
    };

    Ok((transaction, remaining_accounts))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> Pubkey {
        Pubkey::new([byte; 32])
    }

    #[test]
    fn test_accounts_are_ordered_by_class() {
        let program = key(9);
        let ix = Instruction::new(
            program,
            vec![
                AccountMeta::new_readonly(key(1), false),
                AccountMeta::new(key(2), false),
                AccountMeta::new_readonly(key(3), true),
                AccountMeta::new(key(4), true),
            ],
            vec![7],
        );

        let (compiled, remaining) = compile_transaction(vec![ix], vec![]).unwrap();
        assert_eq!(compiled.accounts, vec![key(4), key(3), key(2), key(1), program]);
        assert_eq!(compiled.num_rw_signers, 1);
        assert_eq!(compiled.num_ro_signers, 1);
        assert_eq!(compiled.num_rw, 1);
        assert_eq!(compiled.instructions[0].program_id_index, 4);
        assert_eq!(compiled.instructions[0].accounts, vec![3, 2, 1, 0]);
        assert!(remaining.iter().all(|meta| !meta.is_signer));
        assert_eq!(remaining.len(), 5);
    }

    #[test]
    fn test_duplicate_accounts_merge_flags() {
        let program = key(9);
        let first = Instruction::new(program, vec![AccountMeta::new_readonly(key(1), false)], vec![]);
        let second = Instruction::new(program, vec![AccountMeta::new(key(1), false)], vec![]);

        let (compiled, _) = compile_transaction(vec![first, second], vec![]).unwrap();
        assert_eq!(compiled.accounts, vec![key(1), program]);
        assert_eq!(compiled.num_rw, 1);
        assert_eq!(compiled.instructions[0].accounts, compiled.instructions[1].accounts);
    }

    #[test]
    fn test_empty_is_rejected() {
        assert!(matches!(
            compile_transaction(vec![], vec![]),
            Err(CompileError::Empty)
        ));
    }
}
