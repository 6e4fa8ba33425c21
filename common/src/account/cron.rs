use borsh::{BorshDeserialize, BorshSerialize};

use super::AnchorAccount;
use crate::{crypto::Pubkey, transaction::TransactionSourceV0};

// Per authority counter handing out cron job ids
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct UserCronJobsV0 {
    pub authority: Pubkey,
    pub min_cron_job_id: u32,
    pub next_cron_job_id: u32,
    pub bump_seed: u8,
}

impl AnchorAccount for UserCronJobsV0 {
    const NAME: &'static str = "UserCronJobsV0";
}

// Name lookup record, points at the job created under that name
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct CronJobNameMappingV0 {
    pub cron_job: Pubkey,
    pub name: String,
    pub bump_seed: u8,
}

impl AnchorAccount for CronJobNameMappingV0 {
    const NAME: &'static str = "CronJobNameMappingV0";
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct CronJobV0 {
    pub id: u32,
    pub user_cron_jobs: Pubkey,
    pub task_queue: Pubkey,
    pub authority: Pubkey,
    pub free_tasks_per_transaction: u8,
    pub num_tasks_per_queue_call: u8,
    pub schedule: String,
    pub name: String,
    pub current_exec_ts: i64,
    pub current_transaction_id: u32,
    pub num_transactions: u32,
    pub next_transaction_id: u32,
    pub removed_from_queue: bool,
    pub bump_seed: u8,
}

impl AnchorAccount for CronJobV0 {
    const NAME: &'static str = "CronJobV0";
}

impl CronJobV0 {
    // A job posts nothing until transaction 0 exists
    pub fn is_usable(&self) -> bool {
        self.num_transactions > 0
    }
}

// Call posted to the task queue every time the job fires
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct CronJobTransactionV0 {
    pub id: u32,
    pub cron_job: Pubkey,
    pub transaction: TransactionSourceV0,
    pub bump_seed: u8,
}

impl AnchorAccount for CronJobTransactionV0 {
    const NAME: &'static str = "CronJobTransactionV0";
}
