use super::BuildError;
use crate::{
    config::{MAX_TASK_DESCRIPTION_LEN, SYSTEM_PROGRAM_ID, TUKTUK_PROGRAM_ID},
    crypto::Pubkey,
    derive::{task_key, task_queue_authority_key},
    transaction::{AccountMeta, Instruction, QueueTaskArgsV0, UpdateTaskQueueArgsV0},
};

pub const QUEUE_TASK: &str = "queue_task_v0";
pub const ADD_QUEUE_AUTHORITY: &str = "add_queue_authority_v0";
pub const UPDATE_TASK_QUEUE: &str = "update_task_queue_v0";

/// Queue a task in slot `args.id` of `task_queue`.
///
/// `queue_authority` must sign, either as the transaction signer or as a
/// derived address of the calling program. `remaining_accounts` are the
/// accounts of the compiled payload.
pub fn queue_task_v0(
    payer: &Pubkey,
    queue_authority: &Pubkey,
    task_queue: &Pubkey,
    args: &QueueTaskArgsV0,
    remaining_accounts: Vec<AccountMeta>,
) -> Result<Instruction, BuildError> {
    if args.description.len() > MAX_TASK_DESCRIPTION_LEN {
        return Err(BuildError::DescriptionTooLong {
            len: args.description.len(),
            max: MAX_TASK_DESCRIPTION_LEN,
        });
    }

    let mut accounts = vec![
        AccountMeta::new(*payer, true),
        AccountMeta::new_readonly(*queue_authority, true),
        AccountMeta::new(*task_queue, false),
        AccountMeta::new_readonly(task_queue_authority_key(task_queue, queue_authority)?, false),
        AccountMeta::new(task_key(task_queue, args.id)?, false),
        AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
    ];
    accounts.extend(remaining_accounts);

    Ok(Instruction::anchor(*TUKTUK_PROGRAM_ID, QUEUE_TASK, args, accounts)?)
}

// Register `queue_authority` on `task_queue`, paid by `payer`
pub fn add_queue_authority_v0(
    payer: &Pubkey,
    queue_authority: &Pubkey,
    task_queue: &Pubkey,
) -> Result<Instruction, BuildError> {
    let accounts = vec![
        AccountMeta::new(*payer, true),
        AccountMeta::new_readonly(*queue_authority, false),
        AccountMeta::new(task_queue_authority_key(task_queue, queue_authority)?, false),
        AccountMeta::new(*task_queue, false),
        AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
    ];

    Ok(Instruction::anchor(*TUKTUK_PROGRAM_ID, ADD_QUEUE_AUTHORITY, &(), accounts)?)
}

pub fn update_task_queue_v0(
    payer: &Pubkey,
    update_authority: &Pubkey,
    task_queue: &Pubkey,
    args: &UpdateTaskQueueArgsV0,
) -> Result<Instruction, BuildError> {
    let accounts = vec![
        AccountMeta::new(*payer, true),
        AccountMeta::new_readonly(*update_authority, true),
        AccountMeta::new(*task_queue, false),
        AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
    ];

    Ok(Instruction::anchor(*TUKTUK_PROGRAM_ID, UPDATE_TASK_QUEUE, args, accounts)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        program::is_method,
        transaction::{TransactionSourceV0, TriggerV0},
    };

    fn args(id: u16, description: &str) -> QueueTaskArgsV0 {
        QueueTaskArgsV0 {
            id,
            trigger: TriggerV0::Now,
            transaction: TransactionSourceV0::RemoteV0 {
                url: "https://example.org".to_string(),
                signer: Pubkey::new([8u8; 32]),
            },
            crank_reward: None,
            free_tasks: 0,
            description: description.to_string(),
        }
    }

    #[test]
    fn test_queue_task_accounts() {
        let payer = Pubkey::new([1u8; 32]);
        let queue = Pubkey::new([2u8; 32]);
        let extra = AccountMeta::new(Pubkey::new([3u8; 32]), false);
        let ix = queue_task_v0(&payer, &payer, &queue, &args(3, "t"), vec![extra.clone()]).unwrap();

        assert!(is_method(&ix.data, QUEUE_TASK));
        assert_eq!(ix.accounts.len(), 7);
        assert_eq!(ix.accounts[4].pubkey, task_key(&queue, 3).unwrap());
        assert_eq!(ix.accounts[6], extra);
    }

    #[test]
    fn test_description_limit() {
        let payer = Pubkey::new([1u8; 32]);
        let long = "d".repeat(MAX_TASK_DESCRIPTION_LEN + 1);
        assert!(matches!(
            queue_task_v0(&payer, &payer, &payer, &args(0, &long), vec![]),
            Err(BuildError::DescriptionTooLong { .. })
        ));
    }
}
