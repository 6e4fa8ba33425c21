use super::BuildError;
use crate::{
    config::{CRON_PROGRAM_ID, SYSTEM_PROGRAM_ID},
    crypto::Pubkey,
    derive::{cron_job_key, cron_job_name_mapping_key, cron_job_transaction_key, user_cron_jobs_key},
    transaction::{AccountMeta, AddCronTransactionArgsV0, InitializeCronJobArgsV0, Instruction},
};

pub const INITIALIZE_CRON_JOB: &str = "initialize_cron_job_v0";
pub const ADD_CRON_TRANSACTION: &str = "add_cron_transaction_v0";

/// Create cron job `cron_job_id` of `authority`, registered under `args.name`.
///
/// The id must be the `next_cron_job_id` of the authority's counter at the
/// time the instruction executes. Returns the instruction and the job address.
pub fn initialize_cron_job_v0(
    payer: &Pubkey,
    authority: &Pubkey,
    cron_job_id: u32,
    task_queue: &Pubkey,
    args: &InitializeCronJobArgsV0,
) -> Result<(Instruction, Pubkey), BuildError> {
    let cron_job = cron_job_key(authority, cron_job_id)?;
    let accounts = vec![
        AccountMeta::new(*payer, true),
        AccountMeta::new_readonly(*authority, true),
        AccountMeta::new(user_cron_jobs_key(authority)?, false),
        AccountMeta::new(cron_job, false),
        AccountMeta::new(cron_job_name_mapping_key(authority, &args.name)?, false),
        AccountMeta::new_readonly(*task_queue, false),
        AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
    ];

    let ix = Instruction::anchor(*CRON_PROGRAM_ID, INITIALIZE_CRON_JOB, args, accounts)?;
    Ok((ix, cron_job))
}

pub fn add_cron_transaction_v0(
    payer: &Pubkey,
    authority: &Pubkey,
    cron_job: &Pubkey,
    args: &AddCronTransactionArgsV0,
    remaining_accounts: Vec<AccountMeta>,
) -> Result<Instruction, BuildError> {
    let mut accounts = vec![
        AccountMeta::new(*payer, true),
        AccountMeta::new_readonly(*authority, true),
        AccountMeta::new(*cron_job, false),
        AccountMeta::new(cron_job_transaction_key(cron_job, args.index)?, false),
        AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
    ];
    accounts.extend(remaining_accounts);

    Ok(Instruction::anchor(*CRON_PROGRAM_ID, ADD_CRON_TRANSACTION, args, accounts)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::is_method;

    #[test]
    fn test_initialize_derives_job_from_id() {
        let authority = Pubkey::new([1u8; 32]);
        let args = InitializeCronJobArgsV0 {
            schedule: "0 * * * * *".to_string(),
            name: "refund".to_string(),
            free_tasks_per_transaction: 0,
            num_tasks_per_queue_call: 1,
        };
        let (ix, job) =
            initialize_cron_job_v0(&authority, &authority, 2, &Pubkey::new([2u8; 32]), &args).unwrap();
        assert_eq!(job, cron_job_key(&authority, 2).unwrap());
        assert_eq!(ix.accounts[3].pubkey, job);
        assert!(is_method(&ix.data, INITIALIZE_CRON_JOB));
        assert!(!is_method(&ix.data, ADD_CRON_TRANSACTION));
    }
}
