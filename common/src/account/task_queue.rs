use borsh::{BorshDeserialize, BorshSerialize};

use super::{bitmap, AnchorAccount};
use crate::{
    crypto::Pubkey,
    time::UnixTimestamp,
    transaction::{TransactionSourceV0, TriggerV0},
};

// On-ledger layout of a task queue
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct TaskQueueV0 {
    pub tuktuk_config: Pubkey,
    pub id: u32,
    pub update_authority: Pubkey,
    pub reserved: Pubkey,
    pub min_crank_reward: u64,
    pub uncollected_protocol_fees: u64,
    pub capacity: u16,
    pub created_at: i64,
    pub updated_at: i64,
    pub bump_seed: u8,
    pub task_bitmap: Vec<u8>,
    pub name: String,
    pub lookup_tables: Vec<Pubkey>,
    pub num_queue_authorities: u16,
    pub stale_task_age: u32,
}

impl AnchorAccount for TaskQueueV0 {
    const NAME: &'static str = "TaskQueueV0";
}

impl TaskQueueV0 {
    pub fn first_free_slot(&self) -> Option<u16> {
        bitmap::first_free_slot(&self.task_bitmap, self.capacity)
    }

    pub fn occupied(&self) -> u32 {
        bitmap::occupied_count(&self.task_bitmap, self.capacity)
    }

    pub fn is_full(&self) -> bool {
        self.occupied() >= self.capacity as u32
    }
}

// Record proving a submitter may queue tasks on a queue, only its existence matters
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct TaskQueueAuthorityV0 {
    pub task_queue: Pubkey,
    pub queue_authority: Pubkey,
    pub bump_seed: u8,
}

impl AnchorAccount for TaskQueueAuthorityV0 {
    const NAME: &'static str = "TaskQueueAuthorityV0";
}

// A queued task, closed once a cranker runs it
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct TaskV0 {
    pub task_queue: Pubkey,
    pub rent_amount: u64,
    pub crank_reward: u64,
    pub id: u16,
    pub trigger: TriggerV0,
    pub rent_refund: Pubkey,
    pub transaction: TransactionSourceV0,
    pub queued_at: i64,
    pub bump_seed: u8,
    pub free_tasks: u8,
    pub description: String,
}

impl AnchorAccount for TaskV0 {
    const NAME: &'static str = "TaskV0";
}

impl TaskV0 {
    pub fn is_runnable(&self, now: UnixTimestamp) -> bool {
        match self.trigger {
            TriggerV0::Now => true,
            TriggerV0::Timestamp(at) => now >= at,
        }
    }
}
