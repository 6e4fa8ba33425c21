// Arguments of the queue and cron program instructions

use borsh::{BorshDeserialize, BorshSerialize};

use super::CompiledTransactionV0;
use crate::{crypto::Pubkey, time::UnixTimestamp};

// Condition evaluated by the queue program when a cranker tries the task
#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum TriggerV0 {
    // runnable as soon as it is queued
    Now,
    // runnable once the ledger clock reaches the timestamp
    Timestamp(UnixTimestamp),
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum TransactionSourceV0 {
    CompiledV0(CompiledTransactionV0),
    // fetched from `url` at execution time and checked against `signer`
    RemoteV0 { url: String, signer: Pubkey },
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct QueueTaskArgsV0 {
    pub id: u16,
    pub trigger: TriggerV0,
    pub transaction: TransactionSourceV0,
    pub crank_reward: Option<u64>,
    pub free_tasks: u8,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct UpdateTaskQueueArgsV0 {
    pub min_crank_reward: Option<u64>,
    pub capacity: Option<u16>,
    pub lookup_tables: Option<Vec<Pubkey>>,
    pub update_authority: Option<Pubkey>,
    pub stale_task_age: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct InitializeCronJobArgsV0 {
    pub schedule: String,
    pub name: String,
    pub free_tasks_per_transaction: u8,
    pub num_tasks_per_queue_call: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct AddCronTransactionArgsV0 {
    pub index: u32,
    pub transaction_source: TransactionSourceV0,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_encoding() {
        assert_eq!(borsh::to_vec(&TriggerV0::Now).unwrap(), vec![0]);
        let encoded = borsh::to_vec(&TriggerV0::Timestamp(20)).unwrap();
        assert_eq!(encoded[0], 1);
        assert_eq!(encoded[1..], 20i64.to_le_bytes());
    }

    #[test]
    fn test_resize_args_only_set_capacity() {
        let args = UpdateTaskQueueArgsV0 {
            capacity: Some(18),
            ..Default::default()
        };
        // None, Some(18u16), None, None, None
        assert_eq!(borsh::to_vec(&args).unwrap(), vec![0, 1, 18, 0, 0, 0, 0]);
    }
}
